/// Constant formats.
///
/// The ordinal is written as the first byte of every serialized constant and
/// is the primary sort key of the pool's total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Format {
    Int64 = 0x00,
    UInt8,
    Float32,
    Float64,
    Char,
    String,
    Version,
    Array,

    /// Module identity, by qualified module name.
    Module,
    /// Package identity within a module or package.
    Package,
    Class,
    Typedef,
    Property,
    /// The group of all same-named methods of a class.
    MultiMethod,
    Method,

    /// An annotating class plus positional parameter constants.
    Annotation,

    /// A name whose target is not known yet. Never serialized.
    UnresolvedName,

    TerminalType,
    AnnotatedType,

    /// `!cond`
    ConditionNot,
    /// `cond && cond && ...`
    ConditionAll,
    /// `cond || cond || ...`
    ConditionAny,
    /// True when the named option was specified for the build.
    ConditionNamed,
    /// True when a module or one of its structures is present at link time.
    ConditionPresent,
    /// True when the linked module's version is substitutable for a version.
    ConditionVersionMatches,
    /// True when the module being linked is of a specific version.
    ConditionVersioned,
}

impl Format {
    pub const COUNT: usize = Format::ConditionVersioned as usize + 1;

    /// Identity formats name a structure in the component tree.
    pub const fn is_identity(self) -> bool {
        matches!(
            self,
            Format::Module
                | Format::Package
                | Format::Class
                | Format::Typedef
                | Format::Property
                | Format::MultiMethod
                | Format::Method
        )
    }

    pub const fn is_condition(self) -> bool {
        matches!(
            self,
            Format::ConditionNot
                | Format::ConditionAll
                | Format::ConditionAny
                | Format::ConditionNamed
                | Format::ConditionPresent
                | Format::ConditionVersionMatches
                | Format::ConditionVersioned
        )
    }

    /// Conditions that are not built out of other conditions.
    pub const fn is_terminal_condition(self) -> bool {
        matches!(
            self,
            Format::ConditionNamed
                | Format::ConditionPresent
                | Format::ConditionVersionMatches
                | Format::ConditionVersioned
        )
    }
}

impl TryFrom<u8> for Format {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        if byte < Self::COUNT as u8 {
            // SAFETY: Format is repr(u8) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u8, Format>(byte) })
        } else {
            Err(byte)
        }
    }
}
