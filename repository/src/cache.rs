use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, warn};
use parking_lot::RwLock;

use crate::repository::RepositoryError;
use crate::structure::FileStructure;

pub(crate) const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(1);

/// What a rescan compares to decide whether a file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    pub(crate) fn of(path: &Path) -> Option<FileStamp> {
        let meta = fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        Some(FileStamp {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }
}

/// Parse `path`, treating an unreadable or corrupt file as absent.
pub(crate) fn load_file(path: &Path) -> Option<Arc<FileStructure>> {
    match FileStructure::read_file(path) {
        Ok(file) => {
            debug!("loaded {}", path.display());
            Some(Arc::new(file))
        }
        Err(err) => {
            warn!("ignoring {}: {err}", path.display());
            None
        }
    }
}

pub(crate) fn is_due(checked: Option<Instant>, interval: Duration) -> bool {
    checked.is_none_or(|at| at.elapsed() >= interval)
}

#[derive(Debug, Default)]
struct Snapshot {
    checked: Option<Instant>,
    stamp: Option<FileStamp>,
    file: Option<Arc<FileStructure>>,
}

/// One module file, reparsed only when its stamp changes.
#[derive(Debug)]
pub(crate) struct CachedFile {
    path: PathBuf,
    rescan_interval: Duration,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl CachedFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            snapshot: RwLock::new(Arc::default()),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn set_rescan_interval(&mut self, interval: Duration) {
        self.rescan_interval = interval;
    }

    /// The parsed file, or `None` while it is missing or corrupt.
    pub(crate) fn current(&self) -> Option<Arc<FileStructure>> {
        let snapshot = self.snapshot.read().clone();
        if !is_due(snapshot.checked, self.rescan_interval) {
            return snapshot.file.clone();
        }

        let stamp = FileStamp::of(&self.path);
        let file = if snapshot.checked.is_some() && stamp == snapshot.stamp {
            snapshot.file.clone()
        } else {
            debug!("rescanning {}", self.path.display());
            stamp.and_then(|_| load_file(&self.path))
        };
        *self.snapshot.write() = Arc::new(Snapshot {
            checked: Some(Instant::now()),
            stamp,
            file: file.clone(),
        });
        file
    }

    /// Write `file` out and make it the cached content.
    pub(crate) fn store(&self, mut file: FileStructure) -> Result<(), RepositoryError> {
        file.write_file(&self.path)?;
        *self.snapshot.write() = Arc::new(Snapshot {
            checked: Some(Instant::now()),
            stamp: FileStamp::of(&self.path),
            file: Some(Arc::new(file)),
        });
        Ok(())
    }
}
