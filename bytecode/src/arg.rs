use core::fmt;

use pool::ConstId;

/// The evaluation stack.
pub const A_STACK: i32 = -1;
/// A result that is discarded.
pub const A_IGNORE: i32 = -2;
/// The default value of a parameter.
pub const A_DEFAULT: i32 = -3;
pub const A_THIS: i32 = -4;
pub const A_TARGET: i32 = -5;
pub const A_PUBLIC: i32 = -6;
pub const A_PROTECTED: i32 = -7;
pub const A_PRIVATE: i32 = -8;
pub const A_STRUCT: i32 = -9;
pub const A_CLASS: i32 = -10;
pub const A_SERVICE: i32 = -11;
pub const A_SUPER: i32 = -12;
pub const A_BLOCK: i32 = -13;
pub const A_MULTI: i32 = -14;
pub const A_TUPLE: i32 = -15;
pub const A_LABEL: i32 = -16;

/// Constant `i` of an op stream's constant table encodes as
/// `CONSTANT_OFFSET - i`.
pub const CONSTANT_OFFSET: i32 = -17;

pub fn is_predefined(n: i32) -> bool {
    (A_LABEL..=A_STACK).contains(&n)
}

pub fn encode_constant(index: usize) -> i32 {
    CONSTANT_OFFSET - index as i32
}

/// The constant-table index an encoded argument refers to, if any.
pub fn constant_index(n: i32) -> Option<usize> {
    (n <= CONSTANT_OFFSET).then(|| (CONSTANT_OFFSET - n) as usize)
}

/// Human-readable form of an encoded argument.
pub fn id_string(n: i32) -> String {
    match n {
        A_STACK => "this:stack".into(),
        A_IGNORE => "_".into(),
        A_DEFAULT => "<default>".into(),
        A_THIS => "this".into(),
        A_TARGET => "this:target".into(),
        A_PUBLIC => "this:public".into(),
        A_PROTECTED => "this:protected".into(),
        A_PRIVATE => "this:private".into(),
        A_STRUCT => "this:struct".into(),
        A_CLASS => "this:class".into(),
        A_SERVICE => "this:service".into(),
        A_SUPER => "super".into(),
        A_BLOCK => "this:block".into(),
        A_MULTI => "<multi>".into(),
        A_TUPLE => "<tuple>".into(),
        A_LABEL => "<label>".into(),
        n if n >= 0 => format!("#{n}"),
        n => format!("const[{}]", CONSTANT_OFFSET - n),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterId(pub(crate) u32);

impl RegisterId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A local variable slot of one executable unit.
///
/// The slot index stays unknown until scope simulation allocates one.
#[derive(Debug, Clone)]
pub struct Register {
    ty: ConstId,
    name: Option<String>,
    index: Option<i32>,
    effectively_final: bool,
    read_only: bool,
}

impl Register {
    pub fn new(ty: ConstId, name: Option<&str>) -> Self {
        Self {
            ty,
            name: name.map(str::to_string),
            index: None,
            effectively_final: false,
            read_only: false,
        }
    }

    /// A register standing for one of the predefined `A_*` references.
    pub fn predefined(ty: ConstId, index: i32) -> Self {
        assert!(is_predefined(index), "{index} is not a predefined register");
        Self {
            index: Some(index),
            read_only: true,
            ..Self::new(ty, None)
        }
    }

    pub fn ty(&self) -> ConstId {
        self.ty
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn index(&self) -> Option<i32> {
        self.index
    }

    pub fn is_unknown(&self) -> bool {
        self.index.is_none()
    }

    pub fn is_stack(&self) -> bool {
        self.index == Some(A_STACK)
    }

    /// # Panics
    ///
    /// If a different index was already assigned.
    pub fn assign_index(&mut self, index: i32) -> i32 {
        if let Some(old) = self.index {
            assert!(
                old == index,
                "register index already assigned (old={old}, new={index})"
            );
        }
        assert!(index >= 0 || is_predefined(index), "invalid register index {index}");
        self.index = Some(index);
        index
    }

    /// Forget the allocated slot so simulation can run again.
    pub fn reset_index(&mut self) {
        if self.index.is_some_and(|i| i >= 0) {
            self.index = None;
        }
    }

    pub fn mark_effectively_final(&mut self) {
        self.effectively_final = true;
        self.read_only = true;
    }

    pub fn is_effectively_final(&self) -> bool {
        self.effectively_final
    }

    pub fn is_writable(&self) -> bool {
        !self.read_only
    }
}

/// An op operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Argument {
    Constant(ConstId),
    Register(RegisterId),
    /// A register known only by its slot, as read back from bytes.
    Slot(u32),
    /// One of the `A_*` references.
    Predefined(i32),
}

impl Argument {
    pub const STACK: Argument = Argument::Predefined(A_STACK);

    pub fn is_constant(&self) -> bool {
        matches!(self, Argument::Constant(_))
    }

    pub fn is_stack(&self, registers: &[Register]) -> bool {
        match *self {
            Argument::Predefined(n) => n == A_STACK,
            Argument::Register(id) => registers[id.index()].is_stack(),
            _ => false,
        }
    }

    /// Decode an argument read from an op stream whose constant table is
    /// `constants`.
    pub fn decode(n: i32, constants: &[ConstId]) -> Option<Argument> {
        if n >= 0 {
            Some(Argument::Slot(n as u32))
        } else if is_predefined(n) {
            Some(Argument::Predefined(n))
        } else {
            constant_index(n)
                .and_then(|i| constants.get(i))
                .map(|&id| Argument::Constant(id))
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Constant(id) => write!(f, "const {}", id.index()),
            Argument::Register(id) => write!(f, "r{}", id.index()),
            Argument::Slot(n) => write!(f, "#{n}"),
            Argument::Predefined(n) => f.write_str(&id_string(*n)),
        }
    }
}
