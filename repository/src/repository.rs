use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use version::{Version, VersionTree};

use crate::structure::{CodecError, ModuleStructure};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} is read-only")]
    ReadOnly(String),
    #[error("{0} is not a module that can be stored")]
    NotStorable(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A set of named, versioned modules.
///
/// Implementations are shared between threads. Reads see a consistent
/// snapshot of the backing storage; concurrent stores into the same
/// repository must be serialized by the caller.
pub trait ModuleRepository: Send + Sync {
    fn module_names(&self) -> BTreeSet<String>;

    /// Every stored version of `name`, or `None` if there is no such module.
    /// A module stored without a version has an empty tree.
    fn available_versions(&self, name: &str) -> Option<VersionTree<bool>>;

    /// The newest stored copy of `name`.
    fn load_module(&self, name: &str) -> Option<ModuleStructure>;

    /// The copy of `name` stored at exactly `version`.
    fn load_module_at(&self, name: &str, version: &Version) -> Option<ModuleStructure>;

    fn store_module(&self, module: &ModuleStructure) -> Result<(), RepositoryError>;

    fn is_read_only(&self) -> bool {
        false
    }

    /// The module to use when `version` of `name` is asked for.
    ///
    /// A stored `version` wins. Otherwise the lowest stored version that can
    /// substitute for it is picked; it is returned when the two substitute
    /// for each other, and otherwise only when `exact` is false.
    fn load_module_version(&self, name: &str, version: &Version, exact: bool) -> Option<ModuleStructure> {
        let versions = self.available_versions(name)?;
        if versions.contains(version) {
            return self.load_module_at(name, version);
        }

        let found = versions.find_lowest_substitutable(version)?;
        if (found.is_substitutable_for(version) && version.is_substitutable_for(found)) || !exact {
            self.load_module_at(name, found)
        } else {
            None
        }
    }
}

/// The compiled-module path for `path`: a source `.x` file maps to its
/// `.xtc` sibling and a bare name gains the `.xtc` extension.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("xtc") => path.to_path_buf(),
        Some("x") | None => path.with_extension("xtc"),
        Some(_) => path.to_path_buf(),
    }
}

pub(crate) fn version_tree(versions: impl IntoIterator<Item = Version>) -> VersionTree<bool> {
    versions.into_iter().map(|ver| (ver, true)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("lib/core.x"), PathBuf::from("lib/core.xtc"));
        assert_eq!(normalize_path("lib/core"), PathBuf::from("lib/core.xtc"));
        assert_eq!(normalize_path("lib/core.xtc"), PathBuf::from("lib/core.xtc"));
        assert_eq!(normalize_path("lib/core.bundle"), PathBuf::from("lib/core.bundle"));
    }
}
