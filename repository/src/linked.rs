use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, warn};
use version::{Version, VersionTree};

use crate::repository::{ModuleRepository, RepositoryError};
use crate::structure::ModuleStructure;

/// A chain of repositories searched in order.
///
/// Reads return the first hit. Writes go to the first repository only. With
/// `read_through`, a module found further down the chain is also stored
/// into the first repository.
pub struct LinkedRepository {
    repos: Vec<Arc<dyn ModuleRepository>>,
    read_through: bool,
}

impl LinkedRepository {
    pub fn new(repos: Vec<Arc<dyn ModuleRepository>>, read_through: bool) -> Self {
        assert!(!repos.is_empty(), "a linked repository needs at least one repository");
        Self { repos, read_through }
    }

    pub fn repositories(&self) -> &[Arc<dyn ModuleRepository>] {
        &self.repos
    }

    fn primary(&self) -> &dyn ModuleRepository {
        self.repos[0].as_ref()
    }

    fn first_hit(&self, load: impl Fn(&dyn ModuleRepository) -> Option<ModuleStructure>) -> Option<ModuleStructure> {
        let (index, module) = self
            .repos
            .iter()
            .enumerate()
            .find_map(|(index, repo)| load(repo.as_ref()).map(|m| (index, m)))?;
        if index > 0 && self.read_through {
            self.copy_to_primary(&module);
        }
        Some(module)
    }

    fn copy_to_primary(&self, module: &ModuleStructure) {
        let primary = self.primary();
        if primary.is_read_only() {
            return;
        }
        match primary.store_module(module) {
            Ok(()) => debug!("copied {} into the primary repository", module.name()),
            Err(err) => warn!("cannot copy {} into the primary repository: {err}", module.name()),
        }
    }
}

impl ModuleRepository for LinkedRepository {
    fn module_names(&self) -> BTreeSet<String> {
        self.repos.iter().flat_map(|repo| repo.module_names()).collect()
    }

    fn available_versions(&self, name: &str) -> Option<VersionTree<bool>> {
        self.repos.iter().find_map(|repo| repo.available_versions(name))
    }

    fn load_module(&self, name: &str) -> Option<ModuleStructure> {
        self.first_hit(|repo| repo.load_module(name))
    }

    fn load_module_at(&self, name: &str, version: &Version) -> Option<ModuleStructure> {
        self.first_hit(|repo| repo.load_module_at(name, version))
    }

    fn load_module_version(&self, name: &str, version: &Version, exact: bool) -> Option<ModuleStructure> {
        self.first_hit(|repo| repo.load_module_version(name, version, exact))
    }

    fn store_module(&self, module: &ModuleStructure) -> Result<(), RepositoryError> {
        self.primary().store_module(module)
    }

    fn is_read_only(&self) -> bool {
        self.primary().is_read_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildRepository;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn chain(read_through: bool) -> (Arc<BuildRepository>, Arc<BuildRepository>, LinkedRepository) {
        let first = Arc::new(BuildRepository::new());
        let second = Arc::new(BuildRepository::new());
        second
            .store_module(&ModuleStructure::new("lib").with_version(v("1.0")))
            .unwrap();
        let repos: Vec<Arc<dyn ModuleRepository>> = vec![first.clone(), second.clone()];
        let linked = LinkedRepository::new(repos, read_through);
        (first, second, linked)
    }

    #[test]
    fn first_hit_wins() {
        let (first, _, linked) = chain(false);
        first
            .store_module(&ModuleStructure::new("lib").with_version(v("2.0")))
            .unwrap();
        assert_eq!(linked.load_module("lib").unwrap().version(), Some(&v("2.0")));
        assert_eq!(linked.load_module_at("lib", &v("1.0")).unwrap().version(), Some(&v("1.0")));
        assert_eq!(linked.module_names().len(), 1);
    }

    #[test]
    fn writes_go_to_the_primary() {
        let (first, second, linked) = chain(false);
        linked.store_module(&ModuleStructure::new("app")).unwrap();
        assert!(first.load_module("app").is_some());
        assert!(second.load_module("app").is_none());
        assert!(linked.load_module("lib").is_some());
        assert!(first.load_module("lib").is_none());
    }

    #[test]
    fn read_through_copies_into_the_primary() {
        let (first, _, linked) = chain(true);
        assert!(linked.load_module_version("lib", &v("1.0"), true).is_some());
        assert_eq!(first.load_module("lib").unwrap().version(), Some(&v("1.0")));
    }
}
