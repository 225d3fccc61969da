mod tree;
mod version;

pub use tree::{Iter, VersionTree};
pub use version::{ParseVersionError, ReleaseCategory, Version};
