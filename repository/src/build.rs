use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use version::{Version, VersionTree};

use crate::repository::{ModuleRepository, RepositoryError, version_tree};
use crate::structure::ModuleStructure;

#[derive(Debug, Clone, Default)]
struct Stored {
    versionless: Option<ModuleStructure>,
    versions: VersionTree<ModuleStructure>,
}

/// Modules held in memory, typically the output of the current build.
#[derive(Debug, Default)]
pub struct BuildRepository {
    modules: RwLock<BTreeMap<String, Stored>>,
}

impl BuildRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.modules
            .read()
            .values()
            .map(|s| s.versions.len() + usize::from(s.versionless.is_some()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}

impl ModuleRepository for BuildRepository {
    fn module_names(&self) -> BTreeSet<String> {
        self.modules.read().keys().cloned().collect()
    }

    fn available_versions(&self, name: &str) -> Option<VersionTree<bool>> {
        let modules = self.modules.read();
        let stored = modules.get(name)?;
        Some(version_tree(stored.versions.versions().cloned()))
    }

    fn load_module(&self, name: &str) -> Option<ModuleStructure> {
        let modules = self.modules.read();
        let stored = modules.get(name)?;
        match stored.versions.find_highest_version() {
            Some(ver) => stored.versions.get(ver).cloned(),
            None => stored.versionless.clone(),
        }
    }

    fn load_module_at(&self, name: &str, version: &Version) -> Option<ModuleStructure> {
        self.modules.read().get(name)?.versions.get(version).cloned()
    }

    fn store_module(&self, module: &ModuleStructure) -> Result<(), RepositoryError> {
        if module.is_fingerprint() {
            return Err(RepositoryError::NotStorable(module.name().to_string()));
        }
        let mut modules = self.modules.write();
        let stored = modules.entry(module.name().to_string()).or_default();
        match module.version() {
            Some(ver) => {
                stored.versions.insert(ver.clone(), module.clone());
            }
            None => stored.versionless = Some(module.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn stores_and_picks_highest() {
        let repo = BuildRepository::new();
        assert!(repo.is_empty());
        repo.store_module(&ModuleStructure::new("core.x").with_version(v("1.0"))).unwrap();
        repo.store_module(&ModuleStructure::new("core.x").with_version(v("1.1"))).unwrap();
        repo.store_module(&ModuleStructure::new("app")).unwrap();
        assert_eq!(repo.len(), 3);

        assert_eq!(repo.module_names().into_iter().collect::<Vec<_>>(), ["app", "core.x"]);
        let latest = repo.load_module("core.x").unwrap();
        assert_eq!(latest.version(), Some(&v("1.1")));
        assert!(repo.available_versions("app").unwrap().is_empty());
        assert!(repo.load_module("app").is_some());
        assert!(repo.available_versions("missing").is_none());
    }

    #[test]
    fn version_selection() {
        let repo = BuildRepository::new();
        repo.store_module(&ModuleStructure::new("m").with_version(v("2.0"))).unwrap();
        repo.store_module(&ModuleStructure::new("m").with_version(v("2.3"))).unwrap();

        let pick = |want: &str, exact: bool| {
            repo.load_module_version("m", &v(want), exact)
                .and_then(|m| m.version().map(Version::to_string))
        };
        assert_eq!(pick("2.0", true).as_deref(), Some("2.0"));
        assert_eq!(pick("2.0.0", true).as_deref(), Some("2.0"));
        assert_eq!(pick("2.1", false).as_deref(), Some("2.3"));
        assert_eq!(pick("2.1", true), None);
        assert_eq!(pick("3.0", false), None);
        assert_eq!(pick("1.0", false), None);
    }

    #[test]
    fn fingerprints_are_refused() {
        let repo = BuildRepository::new();
        let err = repo.store_module(&ModuleStructure::fingerprint("core.x")).unwrap_err();
        assert!(matches!(err, RepositoryError::NotStorable(_)));
    }
}
