use std::path::PathBuf;
use std::time::SystemTime;

/// Debounced file-system event, as delivered by the external watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    /// A rename detected upstream. Modeled as the delete half; the
    /// create under the new path arrives as its own event.
    Moved,
}

#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub timestamp: SystemTime,
}

impl FileEvent {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, FileEventKind::Modified)
    }

    #[must_use]
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path, FileEventKind::Deleted)
    }
}
