//! Core library for the nfsync tools: concurrent one-way directory
//! mirroring tuned for high-latency network filesystems.
//!
//! A single walker task indexes the source tree and feeds a bounded queue;
//! a pool of workers drains it under a concurrency gate, skipping files the
//! destination already holds (judged by size plus a truncated MD5) and
//! retrying interrupted copies once.

pub mod checksum;
pub mod eventlog;
pub mod gate;
pub mod registry;
pub mod sync;
pub mod testutils;
pub mod transfer;
pub mod walk;

pub use sync::{Settings, Summary, SyncContext, DEFAULT_MAX_CONCURRENT};

/// Sets up tracing and a tokio runtime, then drives `func` to completion.
///
/// Verbosity maps to the tracing filter level: 0=ERROR, 1=INFO, 2=DEBUG,
/// 3+=TRACE. `RUST_LOG` overrides the mapping when set. Diagnostics go to
/// stderr so they never interleave with the run log on stdout.
pub fn run<F, Fut, T>(verbose: u8, func: F) -> anyhow::Result<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let default_level = match verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(func())
}
