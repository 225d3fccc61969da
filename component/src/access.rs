use core::fmt;

/// Visibility of a component, from most to least visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Access {
    #[default]
    Public,
    Protected,
    Private,
}

impl Access {
    /// Whether code holding `self` access may see a component declared
    /// with `declared` access.
    pub fn can_see(self, declared: Access) -> bool {
        self >= declared
    }

    pub fn min_of(self, other: Access) -> Access {
        self.min(other)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Public => "public",
            Access::Protected => "protected",
            Access::Private => "private",
        })
    }
}
