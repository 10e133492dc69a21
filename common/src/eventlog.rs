use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

/// Tag identifying which part of the pipeline produced a log line.
#[derive(Copy, Clone, Debug)]
pub enum Category {
    Proc,
    File,
    Dir,
    Copy,
    Retry,
}

impl Category {
    fn as_str(self) -> &'static str {
        match self {
            Category::Proc => "PROC",
            Category::File => "FILE",
            Category::Dir => "DIR",
            Category::Copy => "COPY",
            Category::Retry => "RETRY",
        }
    }
}

/// Append-only run log, duplicated to stdout.
///
/// One file is created per run, named `<program>-<YYYYMMDDThhmmss>.log`
/// inside `log_dir`. Lines look like:
///
/// ```text
/// 2024/05/01 12:00:00 | FILE | ERROR | Could not open "a.txt": ...
/// ```
///
/// Whole lines are written under a single mutex so concurrent workers never
/// interleave within a line. Write failures after startup are reported via
/// `tracing` and otherwise swallowed - a sick log sink must not fail tasks.
#[derive(Debug, Clone)]
pub struct EventLog {
    sink: std::sync::Arc<tokio::sync::Mutex<tokio::fs::File>>,
    path: std::path::PathBuf,
}

impl EventLog {
    pub async fn create(log_dir: &std::path::Path, program: &str) -> Result<Self> {
        tokio::fs::create_dir_all(log_dir)
            .await
            .with_context(|| format!("failed creating log directory {:?}", log_dir))?;
        let timestamp = chrono::Local::now().format("%Y%m%dT%H%M%S");
        let path = log_dir.join(format!("{program}-{timestamp}.log"));
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed creating log file {:?}", path))?;
        Ok(Self {
            sink: std::sync::Arc::new(tokio::sync::Mutex::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub async fn info(&self, category: Category, message: &str) {
        self.line(&format!("| {} | INFO | {}", category.as_str(), message))
            .await;
    }

    pub async fn error(&self, category: Category, message: &str) {
        self.line(&format!("| {} | ERROR | {}", category.as_str(), message))
            .await;
    }

    /// Closing banner, set off from the per-file lines by a blank line.
    pub async fn banner(&self, message: &str) {
        self.line(&format!("\n========== {message} ==========")).await;
    }

    async fn line(&self, message: &str) {
        let stamped = format!(
            "{} {}\n",
            chrono::Local::now().format("%Y/%m/%d %H:%M:%S"),
            message
        );
        {
            // stdout may be a closed pipe; losing the echo must not panic
            use std::io::Write;
            let _ = std::io::stdout().lock().write_all(stamped.as_bytes());
        }
        let mut sink = self.sink.lock().await;
        if let Err(error) = sink.write_all(stamped.as_bytes()).await {
            tracing::warn!("failed writing to log file {:?}: {}", self.path, error);
        }
    }
}
