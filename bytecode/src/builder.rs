use pool::ConstId;

use crate::arg::{Argument, Register, RegisterId};
use crate::code::Code;
use crate::instruction::{Instruction, Target};
use crate::op::OpCode;

/// A forward jump whose destination has not been bound yet.
///
/// Created by [`CodeBuilder::jump`], [`CodeBuilder::jump_if`] and
/// [`CodeBuilder::jump_cmp`]. Resolve it with [`CodeBuilder::bind`].
#[derive(Debug)]
pub struct Label {
    /// Address of the jump op.
    op: usize,
}

/// Builds the op stream of one executable unit.
pub struct CodeBuilder {
    code: Code,
}

impl CodeBuilder {
    pub fn new(params: u32) -> Self {
        Self {
            code: Code::new(params),
        }
    }

    /// Address of the next op to be emitted.
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn finish(self) -> Code {
        self.code
    }

    fn emit(&mut self, op: Instruction) -> usize {
        self.code.push(op)
    }

    pub fn nop(&mut self) {
        self.emit(Instruction::Nop);
    }

    pub fn enter(&mut self) {
        self.emit(Instruction::Enter);
    }

    pub fn exit(&mut self) {
        self.emit(Instruction::Exit);
    }

    pub fn guard_start(&mut self) {
        self.emit(Instruction::GuardStart);
    }

    pub fn guard_end(&mut self) {
        self.emit(Instruction::GuardEnd);
    }

    pub fn guard_all(&mut self) {
        self.emit(Instruction::GuardAll);
    }

    pub fn finally_end(&mut self) {
        self.emit(Instruction::FinallyEnd);
    }

    /// `Var <type>`: declare a variable in the current scope.
    pub fn var(&mut self, ty: ConstId, name: Option<&str>) -> RegisterId {
        let reg = self.code.add_register(Register::new(ty, name));
        self.emit(Instruction::Var {
            ty: Argument::Constant(ty),
            reg: Some(reg),
        });
        reg
    }

    /// A register that gets its slot from the first `Move` into it.
    pub fn new_register(&mut self, ty: ConstId, name: Option<&str>) -> RegisterId {
        self.code.add_register(Register::new(ty, name))
    }

    pub fn mov(&mut self, from: Argument, to: Argument) {
        self.emit(Instruction::Move { from, to });
    }

    pub fn return0(&mut self) {
        self.emit(Instruction::Return0);
    }

    pub fn return1(&mut self, value: Argument) {
        self.emit(Instruction::Return1 { value });
    }

    /// Emit an unconditional forward jump.
    pub fn jump(&mut self) -> Label {
        let op = self.emit(Instruction::Jump {
            target: Target::default(),
        });
        Label { op }
    }

    /// Emit a forward jump taken when `code`'s test holds for `value`.
    pub fn jump_if(&mut self, code: OpCode, value: Argument) -> Label {
        let op = self.emit(Instruction::jump_if(code, value, Target::default()));
        Label { op }
    }

    /// Emit a forward jump taken when `left` and `right`, compared as `ty`,
    /// satisfy `code`.
    pub fn jump_cmp(&mut self, code: OpCode, ty: ConstId, left: Argument, right: Argument) -> Label {
        let op = self.emit(Instruction::jump_cmp(
            code,
            Argument::Constant(ty),
            left,
            right,
            Target::default(),
        ));
        Label { op }
    }

    /// Bind a forward jump to the next op to be emitted.
    pub fn bind(&mut self, label: Label) {
        let dest = self.current_offset();
        if let Some(target) = self.code.op_mut(label.op).target_mut() {
            *target = Target::to(dest);
        }
    }

    /// Emit an unconditional backward jump to `target` (an address obtained
    /// from [`current_offset`](Self::current_offset)).
    pub fn jump_back(&mut self, target: usize) {
        self.emit(Instruction::Jump {
            target: Target::to(target),
        });
    }

    /// Emit a conditional backward jump to `target`.
    pub fn jump_back_if(&mut self, code: OpCode, value: Argument, target: usize) {
        self.emit(Instruction::jump_if(code, value, Target::to(target)));
    }
}
