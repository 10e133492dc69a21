use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::instrument;

use crate::eventlog::{Category, EventLog};
use crate::gate::Gate;
use crate::registry::SourceRegistry;
use crate::transfer::{self, Outcome};
use crate::walk;

/// Default worker-pool width, sized for high-latency network filesystems
/// where individual copies spend most of their time waiting.
pub const DEFAULT_MAX_CONCURRENT: usize = 64;

/// One unit of work: mirror `src` to `dst`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileTask {
    pub src: PathBuf,
    pub dst: PathBuf,
}

#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// Upper bound on copies in flight at once.
    pub max_concurrent: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Shared state for one run. Built once in `main`, handed to the walker and
/// every worker behind an `Arc`.
pub struct SyncContext {
    pub settings: Settings,
    pub gate: Gate,
    pub registry: SourceRegistry,
    pub log: EventLog,
}

impl SyncContext {
    pub fn new(settings: Settings, log: EventLog) -> Self {
        SyncContext {
            gate: Gate::new(settings.max_concurrent),
            registry: SourceRegistry::new(),
            settings,
            log,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_copied: usize,
    pub files_unchanged: usize,
    pub files_duplicate: usize,
    pub files_failed: usize,
    pub bytes_copied: u64,
    /// Set when the walker stopped early, meaning the run saw only part of
    /// the source tree.
    pub walk_aborted: bool,
}

impl Summary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Copied { bytes } => {
                self.files_copied += 1;
                self.bytes_copied += bytes;
            }
            Outcome::Unchanged => self.files_unchanged += 1,
            Outcome::Duplicate => self.files_duplicate += 1,
            Outcome::Failed => self.files_failed += 1,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "files copied: {}", self.files_copied)?;
        writeln!(
            f,
            "bytes copied: {}",
            bytesize::ByteSize(self.bytes_copied)
        )?;
        writeln!(f, "files unchanged: {}", self.files_unchanged)?;
        writeln!(f, "duplicate tasks skipped: {}", self.files_duplicate)?;
        writeln!(f, "files failed: {}", self.files_failed)?;
        if self.walk_aborted {
            writeln!(f, "WARNING: source indexing stopped early")?;
        }
        Ok(())
    }
}

/// Mirrors `src_root` into `dst_root` and returns the per-run totals.
///
/// The walker runs as its own task and owns the only sender, so the channel
/// closes exactly once, when indexing is done. Workers drain the queue under
/// the concurrency gate and every spawned task is joined before this
/// function returns.
#[instrument(skip(ctx))]
pub async fn run(
    ctx: &Arc<SyncContext>,
    src_root: &Path,
    dst_root: &Path,
) -> anyhow::Result<Summary> {
    ctx.log
        .info(
            Category::Proc,
            &format!(
                "Allocating number of threads: {}",
                ctx.settings.max_concurrent
            ),
        )
        .await;
    ctx.log
        .info(
            Category::File,
            &format!("Indexing files on {}", src_root.display()),
        )
        .await;
    // queue depth equals the gate capacity; once that many tasks sit
    // unclaimed the walker's send suspends, stalling further traversal and
    // capping in-flight memory independent of tree size
    let (tx, rx) = async_channel::bounded::<FileTask>(ctx.gate.capacity());
    let walker = {
        let ctx = ctx.clone();
        let src_root = src_root.to_path_buf();
        let dst_root = dst_root.to_path_buf();
        tokio::spawn(async move { walk::walk(&ctx, &src_root, &dst_root, tx).await })
    };
    let mut join_set = tokio::task::JoinSet::new();
    let mut summary = Summary::default();
    while let Ok(task) = rx.recv().await {
        // acquire before spawning so at most max_concurrent tasks exist
        let permit = ctx.gate.acquire().await;
        let ctx = ctx.clone();
        join_set.spawn(async move {
            let _permit = permit;
            transfer::process(&ctx, &task).await
        });
        // opportunistically fold in whatever has already finished
        while let Some(joined) = join_set.try_join_next() {
            summary.record(&joined.context("worker task panicked")?);
        }
    }
    while let Some(joined) = join_set.join_next().await {
        summary.record(&joined.context("worker task panicked")?);
    }
    summary.walk_aborted = walker
        .await
        .context("walker task panicked")?
        .is_err();
    Ok(summary)
}
