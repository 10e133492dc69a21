use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use common::eventlog::EventLog;
use common::sync::{self, Settings, SyncContext};

const USAGE: &str = "Usage: nfsync [optional: --threads <number_of_threads>] <src_dir> <dst_dir>";

/// Directory for per-run log files, relative to the working directory.
const LOG_DIR: &str = "log";

#[derive(Parser, Debug, Clone)]
#[command(name = "nfsync", version)]
/// Mirror a directory tree into a destination, copying new or changed
/// files in parallel
struct Args {
    /// Number of copies allowed in flight at once
    #[arg(long, default_value_t = common::DEFAULT_MAX_CONCURRENT)]
    threads: usize,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Source directory followed by destination directory
    paths: Vec<String>,
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let src_root = PathBuf::from(&args.paths[0]);
    let dst_root = PathBuf::from(&args.paths[1]);
    match tokio::fs::metadata(&src_root).await {
        Ok(metadata) if metadata.is_dir() => {}
        _ => {
            println!("Source directory does not exist");
            return Ok(());
        }
    }
    if let Err(error) = tokio::fs::create_dir_all(&dst_root).await {
        println!(
            "Could not create destination directory {}: {}",
            dst_root.display(),
            error
        );
        return Ok(());
    }
    let log = match EventLog::create(Path::new(LOG_DIR), "nfsync").await {
        Ok(log) => log,
        Err(error) => {
            println!("Could not create the run log: {error:#}");
            return Ok(());
        }
    };
    let settings = Settings {
        max_concurrent: args.threads,
    };
    let ctx = Arc::new(SyncContext::new(settings, log));
    let summary = sync::run(&ctx, &src_root, &dst_root).await?;
    ctx.log.banner("Transfer processing is complete").await;
    tracing::info!("run summary:\n{}", &summary);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.paths.len() != 2 || args.threads == 0 {
        println!("{USAGE}");
        return Ok(());
    }
    let verbose = args.verbose;
    common::run(verbose, || async_main(args))
}
