use version::Version;

use crate::constant::ConstId;

/// A content key for constants whose identity is a single plain value.
///
/// The pool keeps a `(Format, Locator)` index next to its intern table so
/// that `ensure_*` helpers can find an existing string, number or module
/// without building a whole [`Constant`](crate::Constant) first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Str(String),
    Int(i64),
    Char(char),
    /// Raw IEEE-754 bits, so `-0.0` and `0.0` stay distinct.
    Bits(u64),
    Version(Version),
    /// A constant wrapping exactly one other constant.
    Id(ConstId),
}
