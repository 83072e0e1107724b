use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// The single file the pipeline currently owns, shared with the retention sweeper.
///
/// Set when a file is handed to the parse worker, cleared once it is completed or has
/// failed. Every read and write goes through the same mutex.
#[derive(Debug, Clone, Default)]
pub struct ClaimedFile {
    inner: Arc<Mutex<Option<PathBuf>>>,
}

impl ClaimedFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `path` with its parent directory resolved, so a symlinked or relative
    /// spelling of the same location compares equal to what the sweeper walks.
    pub fn set(&self, path: impl Into<PathBuf>) {
        let path = resolve_parent(path.into());
        *self.lock() = Some(path);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn current(&self) -> Option<PathBuf> {
        self.lock().clone()
    }

    /// True when the claimed file is `path` itself or lives somewhere beneath it.
    pub fn is_within(&self, path: &Path) -> bool {
        self.lock()
            .as_deref()
            .is_some_and(|claimed| claimed.starts_with(path))
    }

    fn lock(&self) -> MutexGuard<'_, Option<PathBuf>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The final component is kept as named; a claimed symlink is the link, not its target.
fn resolve_parent(path: PathBuf) -> PathBuf {
    let resolved = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            fs::canonicalize(parent).ok().map(|dir| dir.join(name))
        }
        _ => None,
    };
    resolved.unwrap_or(path)
}
