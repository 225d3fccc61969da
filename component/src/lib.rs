mod access;
mod bifurcator;
mod resolve;
mod tree;

pub use access::Access;
pub use bifurcator::ComponentBifurcator;
pub use resolve::{ResolutionCollector, ResolutionResult, SimpleCollector};
pub use tree::{Children, Component, ComponentError, ComponentId, ComponentRef, ComponentTree, Import};
