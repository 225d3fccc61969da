use core::fmt;

use crate::arg::{Argument, RegisterId};
use crate::op::OpCode;

/// Where a jump goes.
///
/// While ops are being built only `dest` (an op index) may be known; once
/// the stream is laid out the relative `offset` is derived from it, and
/// for ops read back from bytes it is the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Target {
    pub offset: i32,
    pub dest: Option<usize>,
    /// Scope boundaries the jump leaves.
    pub exits: u32,
}

impl Target {
    pub fn offset(offset: i32) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    pub fn to(dest: usize) -> Self {
        Self {
            dest: Some(dest),
            ..Self::default()
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset != 0 {
            write!(f, "{:+}", self.offset)
        } else if let Some(dest) = self.dest {
            write!(f, "-> {dest}")
        } else {
            f.write_str("???")
        }
    }
}

/// One op with its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Enter,
    Exit,
    GuardStart,
    GuardEnd,
    GuardAll,
    FinallyEnd,
    /// `reg` is `None` for ops read back from bytes, whose variables are
    /// numbered by declaration order.
    Var {
        ty: Argument,
        reg: Option<RegisterId>,
    },
    Move {
        from: Argument,
        to: Argument,
    },
    Return0,
    Return1 {
        value: Argument,
    },
    Jump {
        target: Target,
    },
    /// A conditional jump testing one value.
    JumpIf {
        code: OpCode,
        value: Argument,
        target: Target,
    },
    /// A conditional jump comparing two values of type `ty`.
    JumpCmp {
        code: OpCode,
        ty: Argument,
        left: Argument,
        right: Argument,
        target: Target,
    },
}

impl Instruction {
    pub fn jump_if(code: OpCode, value: Argument, target: Target) -> Self {
        assert!(code.is_unary_jump(), "{code} is not a unary conditional jump");
        Instruction::JumpIf { code, value, target }
    }

    pub fn jump_cmp(code: OpCode, ty: Argument, left: Argument, right: Argument, target: Target) -> Self {
        assert!(code.is_binary_op(), "{code} is not a comparison jump");
        Instruction::JumpCmp {
            code,
            ty,
            left,
            right,
            target,
        }
    }

    pub fn code(&self) -> OpCode {
        match self {
            Instruction::Nop => OpCode::Nop,
            Instruction::Enter => OpCode::Enter,
            Instruction::Exit => OpCode::Exit,
            Instruction::GuardStart => OpCode::GuardStart,
            Instruction::GuardEnd => OpCode::GuardEnd,
            Instruction::GuardAll => OpCode::GuardAll,
            Instruction::FinallyEnd => OpCode::FinallyEnd,
            Instruction::Var { .. } => OpCode::Var,
            Instruction::Move { .. } => OpCode::Move,
            Instruction::Return0 => OpCode::Return0,
            Instruction::Return1 { .. } => OpCode::Return1,
            Instruction::Jump { .. } => OpCode::Jump,
            Instruction::JumpIf { code, .. } | Instruction::JumpCmp { code, .. } => *code,
        }
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            Instruction::Jump { target }
            | Instruction::JumpIf { target, .. }
            | Instruction::JumpCmp { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn target_mut(&mut self) -> Option<&mut Target> {
        match self {
            Instruction::Jump { target }
            | Instruction::JumpIf { target, .. }
            | Instruction::JumpCmp { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Operands in encoding order, excluding the jump offset.
    pub fn arguments(&self) -> Vec<Argument> {
        match *self {
            Instruction::Var { ty, .. } => vec![ty],
            Instruction::Move { from, to } => vec![from, to],
            Instruction::Return1 { value } | Instruction::JumpIf { value, .. } => vec![value],
            Instruction::JumpCmp { ty, left, right, .. } => vec![ty, left, right],
            _ => Vec::new(),
        }
    }

    pub fn arguments_mut(&mut self) -> Vec<&mut Argument> {
        match self {
            Instruction::Var { ty, .. } => vec![ty],
            Instruction::Move { from, to } => vec![from, to],
            Instruction::Return1 { value } | Instruction::JumpIf { value, .. } => vec![value],
            Instruction::JumpCmp { ty, left, right, .. } => vec![ty, left, right],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        let args = self.arguments();
        if args.is_empty() && self.target().is_none() {
            return f.write_str(code.name());
        }
        write!(f, "{code} ")?;
        let mut parts: Vec<String> = args.iter().map(Argument::to_string).collect();
        if let Some(target) = self.target() {
            parts.push(target.to_string());
        }
        f.write_str(&parts.join(", "))
    }
}
