//! Named, versioned modules and the places they are stored.
//!
//! A module file holds one primary [`ModuleStructure`] (a bundle may hold
//! several) together with fingerprints of the modules it imports. The
//! [`ModuleRepository`] implementations serve those modules from a single
//! file, a bundle, a directory of files, memory, or a chain of other
//! repositories.

mod build;
mod cache;
mod dir;
mod file;
mod linked;
mod repository;
mod structure;

pub use build::BuildRepository;
pub use dir::DirRepository;
pub use file::{BundleRepository, FileRepository};
pub use linked::LinkedRepository;
pub use repository::{ModuleRepository, RepositoryError, normalize_path};
pub use structure::{
    CodecError, FILE_MAGIC, FORMAT_MAJOR, FORMAT_MINOR, FileStructure, ModuleKind, ModuleStructure,
};
