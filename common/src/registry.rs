use std::collections::HashSet;

/// Run-scoped set of source paths already claimed for a copy attempt.
///
/// A claim is an atomic check-and-set: for any given path exactly one caller
/// observes `true` per run, so the same source is never transferred twice.
/// The registry is discarded with the run; nothing persists across runs.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    claimed: std::sync::Mutex<HashSet<std::path::PathBuf>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path` for copying. Returns false if it was already claimed
    /// earlier in this run.
    pub fn claim(&self, path: &std::path::Path) -> bool {
        let mut claimed = self.claimed.lock().unwrap();
        claimed.insert(path.to_path_buf())
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
