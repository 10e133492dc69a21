#![cfg(test)]

use std::sync::Arc;

use crate::eventlog::EventLog;
use crate::sync::{Settings, SyncContext};

pub async fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("nfsync_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

pub async fn setup_test_dir() -> anyhow::Result<std::path::PathBuf> {
    // create a temporary directory
    let tmp_dir = create_temp_dir().await?;
    // foo
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    //    |- 3.txt
    // |- baz
    //    |- 4.txt
    //    |- 5.txt -> ../bar/2.txt
    //    |- 6.txt -> (absolute path) .../foo/bar/3.txt
    let foo_path = tmp_dir.join("foo");
    tokio::fs::create_dir(&foo_path).await?;
    tokio::fs::write(foo_path.join("0.txt"), "0").await?;
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await?;
    tokio::fs::write(bar_path.join("1.txt"), "1").await?;
    tokio::fs::write(bar_path.join("2.txt"), "2").await?;
    tokio::fs::write(bar_path.join("3.txt"), "3").await?;
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await?;
    tokio::fs::write(baz_path.join("4.txt"), "4").await?;
    tokio::fs::symlink("../bar/2.txt", baz_path.join("5.txt")).await?;
    tokio::fs::symlink(bar_path.join("3.txt"), baz_path.join("6.txt")).await?;
    Ok(tmp_dir)
}

/// Builds a small-concurrency context logging into `tmp_dir/log`.
pub async fn test_context(tmp_dir: &std::path::Path) -> anyhow::Result<Arc<SyncContext>> {
    let log = EventLog::create(&tmp_dir.join("log"), "test").await?;
    Ok(Arc::new(SyncContext::new(
        Settings { max_concurrent: 4 },
        log,
    )))
}

/// Asserts every regular file under `src` has an identical copy under `dst`.
/// Symlinks are ignored on both sides, matching what a sync run produces.
#[async_recursion::async_recursion]
pub async fn check_mirrored(src: &std::path::Path, dst: &std::path::Path) -> anyhow::Result<()> {
    use anyhow::Context;
    let mut src_entries = tokio::fs::read_dir(src).await?;
    while let Some(src_entry) = src_entries.next_entry().await? {
        let src_entry_path = src_entry.path();
        let file_type = src_entry.file_type().await?;
        let dst_entry_path = dst.join(src_entry.file_name());
        if file_type.is_dir() {
            check_mirrored(&src_entry_path, &dst_entry_path).await?;
        } else if file_type.is_file() {
            let src_contents = tokio::fs::read(&src_entry_path).await?;
            let dst_contents = tokio::fs::read(&dst_entry_path)
                .await
                .context(format!("Destination file {:?} is missing!", &dst_entry_path))?;
            assert_eq!(src_contents, dst_contents);
        }
    }
    Ok(())
}
