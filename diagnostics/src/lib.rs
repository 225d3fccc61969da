mod info;
mod list;
mod listener;
mod severity;

pub use info::{ErrorInfo, Locus, Position};
pub use list::{BranchedErrors, ErrorList};
pub use listener::{Blackhole, ErrorListener, RuntimeErrors};
pub use severity::Severity;
