//! Running ops whose operands may not be available yet.
//!
//! A [`Frame`] hands out operand values. When one is still being computed it
//! answers [`Operand::Deferred`]; the op then parks a [`Continuation`] on
//! the unit's [`ResumeQueue`] and returns [`Step::Suspended`]. Once every
//! pending value arrives the host resumes the continuation, which finishes
//! the op exactly as if the values had been there all along.

use std::cmp::Ordering;

use pool::ConstId;

use crate::arg::Argument;
use crate::code::Code;
use crate::instruction::{Instruction, Target};
use crate::op::OpCode;

/// A value still being computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pending(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Operand<V> {
    Ready(V),
    Deferred(Pending),
}

impl<V> Operand<V> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Operand::Ready(_))
    }

    pub fn into_ready(self) -> Option<V> {
        match self {
            Operand::Ready(v) => Some(v),
            Operand::Deferred(_) => None,
        }
    }
}

/// What the executing host provides to ops.
pub trait Frame {
    type Value: Clone;

    /// The value of an encoded register or predefined argument.
    fn get_argument(&mut self, index: i32) -> Operand<Self::Value>;

    fn get_constant(&mut self, id: ConstId) -> Self::Value;

    fn set_argument(&mut self, index: i32, value: Self::Value);

    fn enter_scope(&mut self) {}

    fn exit_scope(&mut self) {}

    fn is_true(&self, value: &Self::Value) -> bool;

    fn is_null(&self, value: &Self::Value) -> bool;

    fn is_zero(&self, value: &Self::Value) -> bool;

    /// Compare two values as instances of `ty`.
    fn compare(&mut self, ty: Option<ConstId>, left: &Self::Value, right: &Self::Value) -> Ordering;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step<V> {
    Next,
    /// Continue at this op.
    Jump(usize),
    Return(Option<V>),
    /// Waiting on a deferred operand; the continuation is queued.
    Suspended,
}

/// An op parked until its operands are ready.
#[derive(Debug, Clone)]
pub struct Continuation<V> {
    pc: usize,
    slots: Vec<Operand<V>>,
}

impl<V> Continuation<V> {
    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn is_ready(&self) -> bool {
        self.slots.iter().all(Operand::is_ready)
    }

    /// Fill every slot waiting on `pending`.
    pub fn resolve(&mut self, pending: Pending, value: V) -> bool
    where
        V: Clone,
    {
        let mut filled = false;
        for slot in &mut self.slots {
            if matches!(slot, Operand::Deferred(p) if *p == pending) {
                *slot = Operand::Ready(value.clone());
                filled = true;
            }
        }
        filled
    }

    fn into_values(self) -> Option<Vec<V>> {
        self.slots.into_iter().map(Operand::into_ready).collect()
    }
}

/// Continuations of one execution unit, in suspension order.
#[derive(Debug, Clone)]
pub struct ResumeQueue<V> {
    waiting: Vec<Continuation<V>>,
}

impl<V: Clone> ResumeQueue<V> {
    pub fn new() -> Self {
        Self { waiting: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn suspend(&mut self, continuation: Continuation<V>) {
        self.waiting.push(continuation);
    }

    /// Deliver a computed value. Returns whether anything was waiting on it.
    pub fn resolve(&mut self, pending: Pending, value: V) -> bool {
        let mut any = false;
        for continuation in &mut self.waiting {
            any |= continuation.resolve(pending, value.clone());
        }
        any
    }

    /// The oldest continuation whose operands have all arrived.
    pub fn take_ready(&mut self) -> Option<Continuation<V>> {
        let index = self.waiting.iter().position(Continuation::is_ready)?;
        Some(self.waiting.remove(index))
    }
}

impl<V: Clone> Default for ResumeQueue<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl Code {
    /// Run the op at `pc`.
    ///
    /// Unary and binary ops follow the same protocol: fetch the operands, and
    /// if any is deferred, queue a continuation instead of blocking.
    pub fn execute<F: Frame>(&self, pc: usize, frame: &mut F, queue: &mut ResumeQueue<F::Value>) -> Step<F::Value> {
        let slots: Vec<Operand<F::Value>> = self
            .inputs(self.op(pc))
            .into_iter()
            .map(|arg| self.fetch(frame, arg))
            .collect();

        if !slots.iter().all(Operand::is_ready) {
            queue.suspend(Continuation { pc, slots });
            return Step::Suspended;
        }
        let values = slots.into_iter().filter_map(Operand::into_ready).collect();
        self.complete(pc, values, frame)
    }

    /// Finish an op suspended by [`execute`](Self::execute).
    ///
    /// # Panics
    ///
    /// If an operand is still pending.
    pub fn resume<F: Frame>(&self, continuation: Continuation<F::Value>, frame: &mut F) -> Step<F::Value> {
        let pc = continuation.pc;
        let Some(values) = continuation.into_values() else {
            panic!("op {pc} resumed before its operands arrived");
        };
        self.complete(pc, values, frame)
    }

    /// The operands an op reads, in order.
    fn inputs(&self, op: &Instruction) -> Vec<Argument> {
        match *op {
            Instruction::Move { from, .. } => vec![from],
            Instruction::Return1 { value } | Instruction::JumpIf { value, .. } => vec![value],
            Instruction::JumpCmp { left, right, .. } => vec![left, right],
            _ => Vec::new(),
        }
    }

    fn fetch<F: Frame>(&self, frame: &mut F, arg: Argument) -> Operand<F::Value> {
        match arg {
            Argument::Constant(id) => Operand::Ready(frame.get_constant(id)),
            other => frame.get_argument(self.slot(other)),
        }
    }

    fn slot(&self, arg: Argument) -> i32 {
        match arg {
            Argument::Register(id) => self
                .register(id)
                .index()
                .unwrap_or_else(|| panic!("register r{} has no index", id.index())),
            Argument::Slot(n) => n as i32,
            Argument::Predefined(n) => n,
            Argument::Constant(_) => panic!("a constant is not a register"),
        }
    }

    fn complete<F: Frame>(&self, pc: usize, values: Vec<F::Value>, frame: &mut F) -> Step<F::Value> {
        let mut values = values.into_iter();
        match self.op(pc) {
            Instruction::Enter | Instruction::GuardStart | Instruction::GuardAll => {
                frame.enter_scope();
                Step::Next
            }
            Instruction::Exit | Instruction::GuardEnd | Instruction::FinallyEnd => {
                frame.exit_scope();
                Step::Next
            }
            Instruction::Move { to, .. } => {
                if let Some(value) = values.next() {
                    frame.set_argument(self.slot(*to), value);
                }
                Step::Next
            }
            Instruction::Return0 => Step::Return(None),
            Instruction::Return1 { .. } => Step::Return(values.next()),
            Instruction::Jump { target } => self.take(pc, target, frame),
            Instruction::JumpIf { code, target, .. } => {
                let Some(value) = values.next() else {
                    return Step::Next;
                };
                let taken = match code {
                    OpCode::JumpTrue => frame.is_true(&value),
                    OpCode::JumpFalse => !frame.is_true(&value),
                    OpCode::JumpNull => frame.is_null(&value),
                    OpCode::JumpNotNull => !frame.is_null(&value),
                    OpCode::JumpZero => frame.is_zero(&value),
                    _ => !frame.is_zero(&value),
                };
                if taken { self.take(pc, target, frame) } else { Step::Next }
            }
            Instruction::JumpCmp { code, ty, target, .. } => {
                let (Some(left), Some(right)) = (values.next(), values.next()) else {
                    return Step::Next;
                };
                let ty = match ty {
                    Argument::Constant(id) => Some(*id),
                    _ => None,
                };
                let order = frame.compare(ty, &left, &right);
                let taken = match code {
                    OpCode::JumpEq => order == Ordering::Equal,
                    OpCode::JumpNeq => order != Ordering::Equal,
                    OpCode::JumpLt => order == Ordering::Less,
                    OpCode::JumpLte => order != Ordering::Greater,
                    OpCode::JumpGt => order == Ordering::Greater,
                    _ => order != Ordering::Less,
                };
                if taken { self.take(pc, target, frame) } else { Step::Next }
            }
            Instruction::Nop | Instruction::Var { .. } => Step::Next,
        }
    }

    /// Jump, leaving the scopes between here and the destination.
    fn take<F: Frame>(&self, pc: usize, target: &Target, frame: &mut F) -> Step<F::Value> {
        let dest = target
            .dest
            .unwrap_or_else(|| (pc as i64 + target.offset as i64) as usize);
        if self.info(dest).depth < self.info(pc).depth {
            for _ in 0..target.exits {
                frame.exit_scope();
            }
        }
        Step::Jump(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CodeBuilder;
    use pool::ConstantPool;

    /// Registers hold numbers; a register holding `None` is still being
    /// computed and reports itself as pending under its own index.
    struct Numbers {
        regs: Vec<Option<i64>>,
        exits: usize,
    }

    impl Frame for Numbers {
        type Value = i64;

        fn get_argument(&mut self, index: i32) -> Operand<i64> {
            match self.regs[index as usize] {
                Some(v) => Operand::Ready(v),
                None => Operand::Deferred(Pending(index as u32)),
            }
        }

        fn get_constant(&mut self, _id: ConstId) -> i64 {
            10
        }

        fn set_argument(&mut self, index: i32, value: i64) {
            self.regs[index as usize] = Some(value);
        }

        fn exit_scope(&mut self) {
            self.exits += 1;
        }

        fn is_true(&self, value: &i64) -> bool {
            *value != 0
        }

        fn is_null(&self, _value: &i64) -> bool {
            false
        }

        fn is_zero(&self, value: &i64) -> bool {
            *value == 0
        }

        fn compare(&mut self, _ty: Option<ConstId>, left: &i64, right: &i64) -> Ordering {
            left.cmp(right)
        }
    }

    fn compare_code() -> Code {
        let mut pool = ConstantPool::new();
        let int = pool.ensure_string("Int");
        let mut b = CodeBuilder::new(2);
        let less = b.jump_cmp(OpCode::JumpLt, int, Argument::Slot(0), Argument::Slot(1));
        b.return1(Argument::Slot(1));
        b.bind(less);
        b.return1(Argument::Slot(0));
        let mut code = b.finish();
        code.simulate();
        code.resolve_addresses();
        code
    }

    #[test]
    fn ready_operands_complete_at_once() {
        let code = compare_code();
        let mut frame = Numbers { regs: vec![Some(1), Some(2)], exits: 0 };
        let mut queue = ResumeQueue::new();
        assert_eq!(code.execute(0, &mut frame, &mut queue), Step::Jump(2));
        assert_eq!(code.execute(2, &mut frame, &mut queue), Step::Return(Some(1)));
        assert!(queue.is_empty());
    }

    #[test]
    fn deferred_operand_suspends_and_resumes() {
        let code = compare_code();
        let mut frame = Numbers { regs: vec![None, Some(2)], exits: 0 };
        let mut queue = ResumeQueue::new();

        assert_eq!(code.execute(0, &mut frame, &mut queue), Step::Suspended);
        assert_eq!(queue.len(), 1);
        assert!(queue.take_ready().is_none());

        assert!(!queue.resolve(Pending(7), 0));
        assert!(queue.resolve(Pending(0), 5));
        let continuation = queue.take_ready().unwrap();
        assert_eq!(continuation.pc(), 0);
        assert_eq!(code.resume(continuation, &mut frame), Step::Next);
        assert!(queue.is_empty());
    }

    #[test]
    fn unary_jump_uses_the_same_protocol() {
        let mut b = CodeBuilder::new(1);
        b.enter();
        let out = b.jump_if(OpCode::JumpNotZero, Argument::Slot(0));
        b.exit();
        b.bind(out);
        b.return0();
        let mut code = b.finish();
        code.simulate();
        code.resolve_addresses();

        let mut frame = Numbers { regs: vec![None], exits: 0 };
        let mut queue = ResumeQueue::new();
        assert_eq!(code.execute(1, &mut frame, &mut queue), Step::Suspended);
        queue.resolve(Pending(0), 3);
        let continuation = queue.take_ready().unwrap();
        assert_eq!(code.resume(continuation, &mut frame), Step::Jump(3));
        assert_eq!(frame.exits, 1);
    }

    #[test]
    fn move_writes_the_destination() {
        let mut pool = ConstantPool::new();
        let ten = pool.ensure_int(10);
        let mut b = CodeBuilder::new(1);
        b.mov(Argument::Constant(ten), Argument::Slot(0));
        b.return1(Argument::Slot(0));
        let mut code = b.finish();
        code.simulate();

        let mut frame = Numbers { regs: vec![None], exits: 0 };
        let mut queue = ResumeQueue::new();
        assert_eq!(code.execute(0, &mut frame, &mut queue), Step::Next);
        assert_eq!(code.execute(1, &mut frame, &mut queue), Step::Return(Some(10)));
    }
}
