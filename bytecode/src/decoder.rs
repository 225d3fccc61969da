use std::io::{self, Read};

use pool::ConstId;
use pool::packed::{invalid_data, read_magnitude, read_packed, read_u8};

use crate::arg::Argument;
use crate::instruction::{Instruction, Target};
use crate::op::OpCode;

/// Reads ops written by [`Code::write`](crate::Code::write).
///
/// The stream starts with the op count; constant arguments are resolved
/// against `constants`, the op stream's constant table.
pub struct OpDecoder<'a> {
    r: &'a mut dyn Read,
    constants: &'a [ConstId],
    remaining: usize,
}

impl<'a> OpDecoder<'a> {
    pub fn new(r: &'a mut dyn Read, constants: &'a [ConstId]) -> io::Result<Self> {
        let remaining = read_magnitude(r)? as usize;
        Ok(Self {
            r,
            constants,
            remaining,
        })
    }

    /// Ops still to be read.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn read_int(&mut self) -> io::Result<i32> {
        let n = read_packed(self.r)?;
        i32::try_from(n).map_err(|_| invalid_data("operand out of range"))
    }

    fn read_arg(&mut self) -> io::Result<Argument> {
        let n = self.read_int()?;
        Argument::decode(n, self.constants).ok_or_else(|| invalid_data("unknown constant argument"))
    }

    fn read_target(&mut self) -> io::Result<Target> {
        Ok(Target::offset(self.read_int()?))
    }

    fn decode(&mut self) -> io::Result<Instruction> {
        let byte = read_u8(self.r)?;
        let code = OpCode::try_from(byte).map_err(|b| invalid_data(&format!("invalid op code 0x{b:02x}")))?;

        Ok(match code {
            OpCode::Nop => Instruction::Nop,
            OpCode::Enter => Instruction::Enter,
            OpCode::Exit => Instruction::Exit,
            OpCode::GuardStart => Instruction::GuardStart,
            OpCode::GuardEnd => Instruction::GuardEnd,
            OpCode::GuardAll => Instruction::GuardAll,
            OpCode::FinallyEnd => Instruction::FinallyEnd,
            OpCode::Var => Instruction::Var {
                ty: self.read_arg()?,
                reg: None,
            },
            OpCode::Move => {
                let from = self.read_arg()?;
                let to = self.read_arg()?;
                Instruction::Move { from, to }
            }
            OpCode::Return0 => Instruction::Return0,
            OpCode::Return1 => Instruction::Return1 {
                value: self.read_arg()?,
            },
            OpCode::Jump => Instruction::Jump {
                target: self.read_target()?,
            },
            code if code.is_binary_op() => {
                let ty = self.read_arg()?;
                let left = self.read_arg()?;
                let right = self.read_arg()?;
                let target = self.read_target()?;
                Instruction::jump_cmp(code, ty, left, right, target)
            }
            code => {
                let value = self.read_arg()?;
                let target = self.read_target()?;
                Instruction::jump_if(code, value, target)
            }
        })
    }
}

impl Iterator for OpDecoder<'_> {
    type Item = io::Result<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.decode())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
