use anyhow::{Context, Result};
use async_recursion::async_recursion;

use crate::eventlog::Category;
use crate::sync::{FileTask, SyncContext};

/// Walks the source tree and emits one [`FileTask`] per regular file.
///
/// Directories are traversed but not emitted; symlinks and other non-file
/// entries are not mirrored. Sends suspend when the bounded task queue is
/// full, which is what throttles traversal against slow workers.
///
/// Any error while listing an entry aborts the whole traversal: nothing
/// further is emitted, including for unrelated subtrees. Tasks already on
/// the queue still run to completion.
pub async fn walk(
    ctx: &SyncContext,
    src_root: &std::path::Path,
    dst_root: &std::path::Path,
    tx: async_channel::Sender<FileTask>,
) -> Result<()> {
    if let Err(error) = walk_dir(src_root, dst_root, &tx).await {
        ctx.log
            .error(
                Category::Dir,
                &format!("Error walking the source directory: {error:#}"),
            )
            .await;
        return Err(error);
    }
    Ok(())
}

#[async_recursion]
async fn walk_dir(
    src_dir: &std::path::Path,
    dst_dir: &std::path::Path,
    tx: &async_channel::Sender<FileTask>,
) -> Result<()> {
    let mut entries = tokio::fs::read_dir(src_dir)
        .await
        .with_context(|| format!("Could not access path {:?}", src_dir))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Could not access path {:?}", src_dir))?
    {
        let src_path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("Could not access path {:?}", src_path))?;
        let dst_path = dst_dir.join(entry.file_name());
        if file_type.is_dir() {
            walk_dir(&src_path, &dst_path, tx).await?;
        } else if file_type.is_file() {
            tx.send(FileTask {
                src: src_path,
                dst: dst_path,
            })
            .await
            .map_err(|_| anyhow::anyhow!("task queue closed before traversal finished"))?;
        }
        // symlinks and other non-regular entries are not mirrored
    }
    Ok(())
}
