use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::RwLock;
use version::{Version, VersionTree};

use crate::cache::{DEFAULT_RESCAN_INTERVAL, FileStamp, is_due, load_file};
use crate::repository::{ModuleRepository, RepositoryError};
use crate::structure::{FileStructure, ModuleStructure};

#[derive(Debug, Clone)]
struct ScannedFile {
    stamp: FileStamp,
    file: Option<Arc<FileStructure>>,
}

/// Where each copy of one module name lives.
#[derive(Debug, Clone, Default)]
struct ModuleFiles {
    versionless: Option<PathBuf>,
    versions: VersionTree<PathBuf>,
}

#[derive(Debug, Default)]
struct Snapshot {
    checked: Option<Instant>,
    files: BTreeMap<PathBuf, ScannedFile>,
    index: BTreeMap<String, ModuleFiles>,
}

impl Snapshot {
    fn module(&self, path: &Path, name: &str, version: Option<&Version>) -> Option<ModuleStructure> {
        let file = self.files.get(path)?.file.as_ref()?;
        file.primary_modules().find(|m| m.is(name, version)).cloned()
    }
}

/// Every `.xtc` file in one directory, flattened into a single namespace.
///
/// Files are scanned in path order. When two files hold the same module at
/// the same version (or both hold it without one), the file with the
/// greater path wins.
#[derive(Debug)]
pub struct DirRepository {
    dir: PathBuf,
    read_only: bool,
    rescan_interval: Duration,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl DirRepository {
    pub fn new(dir: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            dir: dir.into(),
            read_only,
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            snapshot: RwLock::new(Arc::default()),
        }
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file a stored module is written to.
    pub fn file_for(&self, module: &ModuleStructure) -> PathBuf {
        let file_name = match module.version() {
            Some(ver) => format!("{}-{ver}.xtc", module.name()),
            None => format!("{}.xtc", module.name()),
        };
        self.dir.join(file_name)
    }

    fn current(&self) -> Arc<Snapshot> {
        let snapshot = self.snapshot.read().clone();
        if !is_due(snapshot.checked, self.rescan_interval) {
            return snapshot;
        }
        self.rescan(&snapshot)
    }

    fn rescan(&self, previous: &Snapshot) -> Arc<Snapshot> {
        let fresh = Arc::new(self.scan(previous));
        *self.snapshot.write() = fresh.clone();
        fresh
    }

    fn scan(&self, previous: &Snapshot) -> Snapshot {
        let mut paths: Vec<PathBuf> = match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension() == Some(OsStr::new("xtc")))
                .collect(),
            Err(err) => {
                warn!("cannot list {}: {err}", self.dir.display());
                Vec::new()
            }
        };
        paths.sort();

        let mut files = BTreeMap::new();
        for path in paths {
            let Some(stamp) = FileStamp::of(&path) else {
                continue;
            };
            let file = match previous.files.get(&path) {
                Some(seen) if seen.stamp == stamp => seen.file.clone(),
                _ => load_file(&path),
            };
            files.insert(path, ScannedFile { stamp, file });
        }

        let mut index: BTreeMap<String, ModuleFiles> = BTreeMap::new();
        for (path, scanned) in &files {
            let Some(file) = &scanned.file else {
                continue;
            };
            for module in file.primary_modules() {
                let entry = index.entry(module.name().to_string()).or_default();
                let shadowed = match module.version() {
                    Some(ver) => entry.versions.insert(ver.clone(), path.clone()),
                    None => entry.versionless.replace(path.clone()),
                };
                if let Some(shadowed) = shadowed {
                    debug!(
                        "{} in {} shadows {}",
                        module.name(),
                        path.display(),
                        shadowed.display()
                    );
                }
            }
        }

        debug!("scanned {}: {} modules in {} files", self.dir.display(), index.len(), files.len());
        Snapshot {
            checked: Some(Instant::now()),
            files,
            index,
        }
    }
}

impl ModuleRepository for DirRepository {
    fn module_names(&self) -> BTreeSet<String> {
        self.current().index.keys().cloned().collect()
    }

    fn available_versions(&self, name: &str) -> Option<VersionTree<bool>> {
        let snapshot = self.current();
        let entry = snapshot.index.get(name)?;
        Some(entry.versions.iter().map(|(ver, _)| (ver.clone(), true)).collect())
    }

    /// The highest stored version, or the versionless copy if there is no
    /// versioned one.
    fn load_module(&self, name: &str) -> Option<ModuleStructure> {
        let snapshot = self.current();
        let entry = snapshot.index.get(name)?;
        match entry.versions.find_highest_version() {
            Some(ver) => {
                let path = entry.versions.get(ver)?;
                snapshot.module(path, name, Some(ver))
            }
            None => snapshot.module(entry.versionless.as_ref()?, name, None),
        }
    }

    fn load_module_at(&self, name: &str, version: &Version) -> Option<ModuleStructure> {
        let snapshot = self.current();
        let path = snapshot.index.get(name)?.versions.get(version)?;
        snapshot.module(path, name, Some(version))
    }

    fn store_module(&self, module: &ModuleStructure) -> Result<(), RepositoryError> {
        if self.read_only {
            return Err(RepositoryError::ReadOnly(self.dir.display().to_string()));
        }
        if module.is_fingerprint() {
            return Err(RepositoryError::NotStorable(module.name().to_string()));
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(module);
        FileStructure::new(module.clone()).write_file(&path)?;
        debug!("stored {} in {}", module.name(), path.display());

        let previous = self.snapshot.read().clone();
        self.rescan(&previous);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
