use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use version::{Version, VersionTree};

use crate::cache::CachedFile;
use crate::repository::{ModuleRepository, RepositoryError, normalize_path, version_tree};
use crate::structure::{FileStructure, ModuleStructure};

/// A repository holding the single primary module of one file.
#[derive(Debug)]
pub struct FileRepository {
    file: CachedFile,
    read_only: bool,
}

impl FileRepository {
    pub fn new(path: impl AsRef<Path>, read_only: bool) -> Self {
        Self {
            file: CachedFile::new(normalize_path(path)),
            read_only,
        }
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.file.set_rescan_interval(interval);
        self
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn main_module(&self, name: &str) -> Option<ModuleStructure> {
        let file = self.file.current()?;
        file.main_module().filter(|m| m.name() == name).cloned()
    }
}

impl ModuleRepository for FileRepository {
    fn module_names(&self) -> BTreeSet<String> {
        self.file
            .current()
            .and_then(|file| file.main_module().map(|m| m.name().to_string()))
            .into_iter()
            .collect()
    }

    fn available_versions(&self, name: &str) -> Option<VersionTree<bool>> {
        let module = self.main_module(name)?;
        Some(version_tree(module.version().cloned()))
    }

    fn load_module(&self, name: &str) -> Option<ModuleStructure> {
        self.main_module(name)
    }

    fn load_module_at(&self, name: &str, version: &Version) -> Option<ModuleStructure> {
        self.main_module(name).filter(|m| m.version() == Some(version))
    }

    fn store_module(&self, module: &ModuleStructure) -> Result<(), RepositoryError> {
        if self.read_only {
            return Err(RepositoryError::ReadOnly(self.path().display().to_string()));
        }
        if module.is_fingerprint() {
            return Err(RepositoryError::NotStorable(module.name().to_string()));
        }
        self.file.store(FileStructure::new(module.clone()))
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// A read-only repository serving every primary module of one file.
#[derive(Debug)]
pub struct BundleRepository {
    file: CachedFile,
}

impl BundleRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: CachedFile::new(path.into()),
        }
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.file.set_rescan_interval(interval);
        self
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn find(&self, pick: impl Fn(&ModuleStructure) -> bool) -> Option<ModuleStructure> {
        let file = self.file.current()?;
        file.primary_modules().find(|m| pick(m)).cloned()
    }
}

impl ModuleRepository for BundleRepository {
    fn module_names(&self) -> BTreeSet<String> {
        self.file
            .current()
            .map(|file| file.module_names().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn available_versions(&self, name: &str) -> Option<VersionTree<bool>> {
        let file = self.file.current()?;
        let mut modules = file.primary_modules().filter(|m| m.name() == name).peekable();
        modules.peek()?;
        Some(version_tree(modules.filter_map(|m| m.version().cloned())))
    }

    /// The highest version in the bundle, or the versionless copy if there
    /// is no versioned one.
    fn load_module(&self, name: &str) -> Option<ModuleStructure> {
        let highest = self
            .available_versions(name)?
            .find_highest_version()
            .cloned();
        match highest {
            Some(ver) => self.load_module_at(name, &ver),
            None => self.find(|m| m.is(name, None)),
        }
    }

    fn load_module_at(&self, name: &str, version: &Version) -> Option<ModuleStructure> {
        self.find(|m| m.is(name, Some(version)))
    }

    fn store_module(&self, _module: &ModuleStructure) -> Result<(), RepositoryError> {
        Err(RepositoryError::ReadOnly(self.path().display().to_string()))
    }

    fn is_read_only(&self) -> bool {
        true
    }
}
