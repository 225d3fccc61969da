use core::fmt;

/// Op codes.
///
/// Every operand is a packed signed integer: an encoded argument (see
/// [`crate::arg`]) or a relative jump offset counted in ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0x00,

    /// Enter a variable scope.
    Enter,

    /// Leave the innermost variable scope.
    Exit,

    /// Enter a scope protected by exception handlers.
    GuardStart,

    /// Leave a scope entered by [`GuardStart`](OpCode::GuardStart).
    GuardEnd,

    /// Enter a scope protected by a `finally` block.
    GuardAll,

    /// Leave a scope entered by [`GuardAll`](OpCode::GuardAll).
    FinallyEnd,

    /// Declare a variable.
    /// Operands: `type`
    Var,

    /// Operands: `from`, `to`
    Move,

    /// Return without a value.
    Return0,

    /// Operands: `value`
    Return1,

    /// Operands: `offset`
    Jump,

    /// Operands: `value`, `offset`
    JumpTrue,
    JumpFalse,
    JumpNull,
    JumpNotNull,
    JumpZero,
    JumpNotZero,

    /// Operands: `type`, `left`, `right`, `offset`
    JumpEq,
    JumpNeq,
    JumpLt,
    JumpLte,
    JumpGt,
    JumpGte,
}

impl OpCode {
    pub const COUNT: usize = OpCode::JumpGte as usize + 1;

    /// Conditional jumps comparing two values of a common type.
    pub const fn is_binary_op(self) -> bool {
        matches!(
            self,
            OpCode::JumpEq
                | OpCode::JumpNeq
                | OpCode::JumpLt
                | OpCode::JumpLte
                | OpCode::JumpGt
                | OpCode::JumpGte
        )
    }

    /// Conditional jumps testing a single value.
    pub const fn is_unary_jump(self) -> bool {
        matches!(
            self,
            OpCode::JumpTrue
                | OpCode::JumpFalse
                | OpCode::JumpNull
                | OpCode::JumpNotNull
                | OpCode::JumpZero
                | OpCode::JumpNotZero
        )
    }

    pub const fn is_jump(self) -> bool {
        matches!(self, OpCode::Jump) || self.is_unary_jump() || self.is_binary_op()
    }

    /// Whether execution can continue with the following op.
    pub const fn advances(self) -> bool {
        !matches!(self, OpCode::Jump | OpCode::Return0 | OpCode::Return1)
    }

    /// Ops that open a scope.
    pub const fn is_enter(self) -> bool {
        matches!(self, OpCode::Enter | OpCode::GuardStart | OpCode::GuardAll)
    }

    /// Ops that close a scope.
    pub const fn is_exit(self) -> bool {
        matches!(self, OpCode::Exit | OpCode::GuardEnd | OpCode::FinallyEnd)
    }

    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Nop => "NOP",
            OpCode::Enter => "ENTER",
            OpCode::Exit => "EXIT",
            OpCode::GuardStart => "GUARD",
            OpCode::GuardEnd => "GUARD_E",
            OpCode::GuardAll => "GUARDALL",
            OpCode::FinallyEnd => "FINALLY_E",
            OpCode::Var => "VAR",
            OpCode::Move => "MOV",
            OpCode::Return0 => "RETURN_0",
            OpCode::Return1 => "RETURN_1",
            OpCode::Jump => "JMP",
            OpCode::JumpTrue => "JMP_TRUE",
            OpCode::JumpFalse => "JMP_FALSE",
            OpCode::JumpNull => "JMP_NULL",
            OpCode::JumpNotNull => "JMP_NNULL",
            OpCode::JumpZero => "JMP_ZERO",
            OpCode::JumpNotZero => "JMP_NZERO",
            OpCode::JumpEq => "JMP_EQ",
            OpCode::JumpNeq => "JMP_NEQ",
            OpCode::JumpLt => "JMP_LT",
            OpCode::JumpLte => "JMP_LTE",
            OpCode::JumpGt => "JMP_GT",
            OpCode::JumpGte => "JMP_GTE",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        if byte < Self::COUNT as u8 {
            // SAFETY: OpCode is repr(u8) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u8, OpCode>(byte) })
        } else {
            Err(byte)
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
