mod codec;
mod condition;
mod constant;
mod format;
mod locator;
pub mod packed;
mod pool;

pub use condition::{Bifurcation, Influence, LinkerContext, Relation};
pub use constant::{ConstId, Constant};
pub use format::Format;
pub use locator::Locator;
pub use pool::{ConstantPool, PoolError};
