use crate::checksum;
use crate::eventlog::Category;
use crate::sync::{FileTask, SyncContext};

/// Delay before the single copy retry.
pub const RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

/// What happened to one task. Per-task failures never escape the worker;
/// they are logged here and folded into the run summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Copied { bytes: u64 },
    /// Destination already matched the source (size + truncated checksum).
    Unchanged,
    /// Another worker already claimed this source path in this run.
    Duplicate,
    Failed,
}

/// Task-scoped failure taxonomy. Only `Copy` is retried; everything else
/// terminates the task on first occurrence.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Could not create directory {}: {source}", .path.display())]
    CreateDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Could not get size for {}: {source}", .path.display())]
    Stat {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Could not calculate checksum for {}: {:#}", .path.display(), .source)]
    Checksum {
        path: std::path::PathBuf,
        source: anyhow::Error,
    },
    #[error("Could not open {}: {source}", .path.display())]
    Open {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Could not create {}: {source}", .path.display())]
    Create {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Could not copy {} to {}: {source}", .src.display(), .dst.display())]
    Copy {
        src: std::path::PathBuf,
        dst: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Could not copy {} to {} upon retry: {source}", .src.display(), .dst.display())]
    RetryExhausted {
        src: std::path::PathBuf,
        dst: std::path::PathBuf,
        #[source]
        source: Box<TaskError>,
    },
}

impl TaskError {
    fn category(&self) -> Category {
        match self {
            TaskError::CreateDir { .. } => Category::Dir,
            TaskError::RetryExhausted { .. } => Category::Retry,
            _ => Category::File,
        }
    }
}

/// Runs the decision state machine for one task and reports the outcome.
///
/// This is the task boundary: every [`TaskError`] is logged and converted to
/// [`Outcome::Failed`] here, so a bad file can never take down the run.
pub async fn process(ctx: &SyncContext, task: &FileTask) -> Outcome {
    match run_task(ctx, task).await {
        Ok(outcome) => outcome,
        Err(error) => {
            ctx.log.error(error.category(), &error.to_string()).await;
            tracing::debug!("{:?} -> {:?} failed: {:#}", task.src, task.dst, error);
            Outcome::Failed
        }
    }
}

async fn run_task(ctx: &SyncContext, task: &FileTask) -> Result<Outcome, TaskError> {
    if let Some(parent) = task.dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| TaskError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    if let Ok(dst_metadata) = tokio::fs::metadata(&task.dst).await {
        tracing::debug!("{:?} exists, check if it's identical", task.dst);
        let src_metadata =
            tokio::fs::metadata(&task.src)
                .await
                .map_err(|source| TaskError::Stat {
                    path: task.src.clone(),
                    source,
                })?;
        // sizes from metadata first; the checksum read is only worth it when
        // they agree
        if src_metadata.len() == dst_metadata.len() {
            let src_checksum = checksum::truncated_md5(&task.src).await.map_err(|source| {
                TaskError::Checksum {
                    path: task.src.clone(),
                    source,
                }
            })?;
            let dst_checksum = checksum::truncated_md5(&task.dst).await.map_err(|source| {
                TaskError::Checksum {
                    path: task.dst.clone(),
                    source,
                }
            })?;
            if src_checksum == dst_checksum {
                ctx.log
                    .info(
                        Category::File,
                        &format!(
                            "Skipping: {} already exists and matches the source file",
                            task.dst.display()
                        ),
                    )
                    .await;
                return Ok(Outcome::Unchanged);
            }
        }
    }
    if !ctx.registry.claim(&task.src) {
        ctx.log
            .info(
                Category::File,
                &format!("Skipping: {} already processed", task.src.display()),
            )
            .await;
        return Ok(Outcome::Duplicate);
    }
    let bytes = copy_with_retry(ctx, || copy_once(&task.src, &task.dst)).await?;
    ctx.log
        .info(
            Category::Copy,
            &format!("{} copied to {}", task.src.display(), task.dst.display()),
        )
        .await;
    Ok(Outcome::Copied { bytes })
}

async fn copy_once(
    src: &std::path::Path,
    dst: &std::path::Path,
) -> Result<u64, TaskError> {
    let mut reader = tokio::fs::File::open(src)
        .await
        .map_err(|source| TaskError::Open {
            path: src.to_path_buf(),
            source,
        })?;
    let mut writer = tokio::fs::File::create(dst)
        .await
        .map_err(|source| TaskError::Create {
            path: dst.to_path_buf(),
            source,
        })?;
    tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|source| TaskError::Copy {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source,
        })
}

/// Runs `attempt` and, if it fails in the byte stream itself, runs it once
/// more after [`RETRY_DELAY`]. Open/create failures on the first attempt are
/// terminal - only an interrupted stream suggests a transient condition.
///
/// On a second failure the partially written destination file is left in
/// place, uncorrected.
async fn copy_with_retry<F, Fut>(ctx: &SyncContext, mut attempt: F) -> Result<u64, TaskError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<u64, TaskError>>,
{
    match attempt().await {
        Ok(bytes) => Ok(bytes),
        Err(error @ TaskError::Copy { .. }) => {
            ctx.log
                .error(Category::Copy, &format!("Attempt 1: {error}"))
                .await;
            tokio::time::sleep(RETRY_DELAY).await;
            match attempt().await {
                Ok(bytes) => Ok(bytes),
                Err(retry_error) => {
                    ctx.log
                        .error(Category::Copy, &format!("Attempt 2: {retry_error}"))
                        .await;
                    let (src, dst) = match &error {
                        TaskError::Copy { src, dst, .. } => (src.clone(), dst.clone()),
                        _ => unreachable!("first error is always TaskError::Copy here"),
                    };
                    Err(TaskError::RetryExhausted {
                        src,
                        dst,
                        source: Box::new(retry_error),
                    })
                }
            }
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod transfer_tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::checksum::MAX_HASH_BYTES;
    use crate::testutils;

    use super::*;

    #[tokio::test]
    async fn copies_new_file_creating_parents() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let src = tmp_dir.join("src.txt");
        tokio::fs::write(&src, b"payload").await?;
        let dst = tmp_dir.join("mirror").join("deep").join("src.txt");
        let task = FileTask {
            src: src.clone(),
            dst: dst.clone(),
        };
        assert_eq!(
            process(&ctx, &task).await,
            Outcome::Copied { bytes: 7 }
        );
        assert_eq!(tokio::fs::read(&dst).await?, b"payload");
        assert_eq!(ctx.registry.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn identical_destination_is_skipped_without_claim() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let src = tmp_dir.join("a.txt");
        let dst = tmp_dir.join("b.txt");
        tokio::fs::write(&src, b"same bytes").await?;
        tokio::fs::write(&dst, b"same bytes").await?;
        let task = FileTask {
            src: src.clone(),
            dst: dst.clone(),
        };
        assert_eq!(process(&ctx, &task).await, Outcome::Unchanged);
        // skip happens before the claim so a later genuine copy still can
        assert!(ctx.registry.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn size_mismatch_forces_recopy() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let src = tmp_dir.join("a.txt");
        let dst = tmp_dir.join("b.txt");
        tokio::fs::write(&src, b"12345").await?;
        tokio::fs::write(&dst, b"123").await?;
        let task = FileTask {
            src: src.clone(),
            dst: dst.clone(),
        };
        assert_eq!(
            process(&ctx, &task).await,
            Outcome::Copied { bytes: 5 }
        );
        assert_eq!(tokio::fs::read(&dst).await?, b"12345");
        Ok(())
    }

    #[tokio::test]
    async fn same_size_different_content_is_recopied() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let src = tmp_dir.join("a.txt");
        let dst = tmp_dir.join("b.txt");
        tokio::fs::write(&src, b"aaaaa").await?;
        tokio::fs::write(&dst, b"bbbbb").await?;
        let task = FileTask {
            src: src.clone(),
            dst: dst.clone(),
        };
        assert_eq!(
            process(&ctx, &task).await,
            Outcome::Copied { bytes: 5 }
        );
        assert_eq!(tokio::fs::read(&dst).await?, b"aaaaa");
        Ok(())
    }

    #[tokio::test]
    async fn files_identical_in_first_mib_are_judged_identical() -> Result<(), anyhow::Error> {
        // required behavior of the truncated checksum heuristic, not a bug
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let mut src_bytes = vec![0x42u8; MAX_HASH_BYTES as usize + 32];
        let mut dst_bytes = src_bytes.clone();
        src_bytes[MAX_HASH_BYTES as usize + 1] = 0x01;
        dst_bytes[MAX_HASH_BYTES as usize + 1] = 0x02;
        let src = tmp_dir.join("a.bin");
        let dst = tmp_dir.join("b.bin");
        tokio::fs::write(&src, &src_bytes).await?;
        tokio::fs::write(&dst, &dst_bytes).await?;
        let task = FileTask {
            src: src.clone(),
            dst: dst.clone(),
        };
        assert_eq!(process(&ctx, &task).await, Outcome::Unchanged);
        // destination was not touched, the tails still differ
        assert_eq!(tokio::fs::read(&dst).await?, dst_bytes);
        Ok(())
    }

    #[tokio::test]
    async fn second_claim_is_a_duplicate_skip() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let src = tmp_dir.join("a.txt");
        tokio::fs::write(&src, b"once").await?;
        let task = FileTask {
            src: src.clone(),
            dst: tmp_dir.join("mirror").join("a.txt"),
        };
        assert_eq!(
            process(&ctx, &task).await,
            Outcome::Copied { bytes: 4 }
        );
        // remove the copy so a second transfer would be observable
        tokio::fs::remove_file(&task.dst).await?;
        assert_eq!(process(&ctx, &task).await, Outcome::Duplicate);
        assert!(tokio::fs::metadata(&task.dst).await.is_err());
        Ok(())
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn missing_source_fails_without_retry() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let task = FileTask {
            src: tmp_dir.join("gone.txt"),
            dst: tmp_dir.join("mirror").join("gone.txt"),
        };
        let start = std::time::Instant::now();
        assert_eq!(process(&ctx, &task).await, Outcome::Failed);
        // an open error must not trigger the 1s retry backoff
        assert!(start.elapsed() < RETRY_DELAY);
        let log = tokio::fs::read_to_string(ctx.log.path()).await?;
        assert!(log.contains("| FILE | ERROR | Could not open"));
        assert!(logs_contain("failed"));
        Ok(())
    }

    #[tokio::test]
    async fn blocked_destination_directory_fails_the_task() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let src = tmp_dir.join("a.txt");
        tokio::fs::write(&src, b"data").await?;
        // a regular file where the destination directory should go
        tokio::fs::write(tmp_dir.join("blocked"), b"").await?;
        let task = FileTask {
            src: src.clone(),
            dst: tmp_dir.join("blocked").join("a.txt"),
        };
        assert_eq!(process(&ctx, &task).await, Outcome::Failed);
        let log = tokio::fs::read_to_string(ctx.log.path()).await?;
        assert!(log.contains("| DIR | ERROR | Could not create directory"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stream_failure_is_retried_exactly_once() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let attempts = AtomicU32::new(0);
        let result = copy_with_retry(&ctx, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt == 1 {
                    Err(TaskError::Copy {
                        src: "a".into(),
                        dst: "b".into(),
                        source: std::io::Error::other("transient"),
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let log = tokio::fs::read_to_string(ctx.log.path()).await?;
        assert!(log.contains("| COPY | ERROR | Attempt 1: Could not copy a to b: transient"));
        assert!(!log.contains("Attempt 2"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn second_stream_failure_is_terminal() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let attempts = AtomicU32::new(0);
        let result = copy_with_retry(&ctx, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err(TaskError::Copy {
                    src: "a".into(),
                    dst: "b".into(),
                    source: std::io::Error::other("still broken"),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(TaskError::RetryExhausted { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let log = tokio::fs::read_to_string(ctx.log.path()).await?;
        assert!(log.contains("Attempt 1: Could not copy a to b"));
        assert!(log.contains("Attempt 2: Could not copy a to b"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn open_error_is_not_retried() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let ctx = testutils::test_context(&tmp_dir).await?;
        let attempts = AtomicU32::new(0);
        let result = copy_with_retry(&ctx, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<u64, _>(TaskError::Open {
                    path: "a".into(),
                    source: std::io::Error::other("denied"),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(TaskError::Open { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
