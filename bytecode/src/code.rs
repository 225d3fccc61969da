use std::io::{self, Read, Write};

use log::{debug, trace};
use pool::packed::write_packed;
use pool::{ConstId, ConstantPool};

use crate::arg::{Argument, Register, RegisterId, encode_constant};
use crate::decoder::OpDecoder;
use crate::instruction::{Instruction, Target};
use crate::op::OpCode;
use crate::registry::ConstantRegistry;
use crate::scope::Scope;

/// What the scope pass and the reachability pass learned about one op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpInfo {
    pub address: usize,
    /// Scope depth before the op runs.
    pub depth: u32,
    pub guard_depth: u32,
    pub guard_all_depth: u32,
    pub reachable: bool,
    pub redundant: bool,
}

/// The ops of one executable unit together with its registers.
#[derive(Debug, Clone, Default)]
pub struct Code {
    ops: Vec<Instruction>,
    info: Vec<OpInfo>,
    registers: Vec<Register>,
    params: u32,
    max_vars: u32,
    max_depth: u32,
}

impl Code {
    /// Empty code for a unit taking `params` parameters, which occupy the
    /// first registers.
    pub fn new(params: u32) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Instruction] {
        &self.ops
    }

    pub fn op(&self, pc: usize) -> &Instruction {
        &self.ops[pc]
    }

    pub fn info(&self, pc: usize) -> OpInfo {
        self.info.get(pc).copied().unwrap_or_default()
    }

    pub fn params(&self) -> u32 {
        self.params
    }

    pub fn max_vars(&self) -> u32 {
        self.max_vars
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn register(&self, id: RegisterId) -> &Register {
        &self.registers[id.index()]
    }

    pub fn register_mut(&mut self, id: RegisterId) -> &mut Register {
        &mut self.registers[id.index()]
    }

    pub fn add_register(&mut self, register: Register) -> RegisterId {
        let id = RegisterId(self.registers.len() as u32);
        self.registers.push(register);
        id
    }

    /// Append an op, returning its address.
    pub fn push(&mut self, op: Instruction) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    pub(crate) fn op_mut(&mut self, pc: usize) -> &mut Instruction {
        &mut self.ops[pc]
    }

    /// Walk the ops in order against a fresh [`Scope`], numbering every
    /// declared register and recording each op's depths.
    ///
    /// An `Enter` immediately followed by its `Exit` with no variable in
    /// between is marked redundant.
    pub fn simulate(&mut self) {
        for reg in &mut self.registers {
            reg.reset_index();
        }
        self.info = vec![OpInfo::default(); self.ops.len()];

        let mut scope = Scope::new(self.params);
        let mut opened: Vec<usize> = Vec::new();
        for pc in 0..self.ops.len() {
            self.info[pc] = OpInfo {
                address: pc,
                depth: scope.depth(),
                guard_depth: scope.guard_depth(),
                guard_all_depth: scope.guard_all_depth(),
                ..OpInfo::default()
            };

            match self.ops[pc].clone() {
                Instruction::Enter => {
                    scope.enter();
                    opened.push(pc);
                }
                Instruction::GuardStart => {
                    scope.enter();
                    scope.enter_guard();
                    opened.push(pc);
                }
                Instruction::GuardAll => {
                    scope.enter();
                    scope.enter_guard_all();
                    opened.push(pc);
                }
                op @ (Instruction::Exit | Instruction::GuardEnd | Instruction::FinallyEnd) => {
                    let Some(start) = opened.pop() else {
                        panic!("op {pc} exits a scope that was never entered")
                    };
                    match op {
                        Instruction::GuardEnd => scope.exit_guard(),
                        Instruction::FinallyEnd => scope.exit_guard_all(),
                        _ => {}
                    }
                    let exited = scope.exit();
                    if op == Instruction::Exit
                        && self.ops[start] == Instruction::Enter
                        && start + 1 == pc
                        && exited.allocated == 0
                    {
                        self.info[start].redundant = true;
                        self.info[pc].redundant = true;
                    }
                }
                Instruction::Var { reg, .. } => {
                    let index = scope.alloc_var();
                    if let Some(reg) = reg {
                        self.registers[reg.index()].assign_index(index as i32);
                    }
                }
                Instruction::Move { to, .. } => match to {
                    Argument::Register(reg) if self.registers[reg.index()].is_unknown() => {
                        let index = scope.alloc_var();
                        self.registers[reg.index()].assign_index(index as i32);
                    }
                    Argument::Slot(n) => scope.ensure_var(n),
                    _ => {}
                },
                _ => {}
            }
        }

        self.max_vars = scope.max_vars();
        self.max_depth = scope.max_depth();
        trace!(
            "simulated {} ops: {} vars, depth {}",
            self.ops.len(),
            self.max_vars,
            self.max_depth
        );
    }

    /// Make every jump know both its destination op and its relative offset.
    ///
    /// # Panics
    ///
    /// If a jump lands on itself or outside the code.
    pub fn resolve_addresses(&mut self) {
        for pc in 0..self.ops.len() {
            let Some(target) = self.ops[pc].target().copied() else {
                continue;
            };
            let dest = match target.dest {
                Some(dest) => dest,
                None => self.relative(pc, target.offset),
            };
            self.retarget(pc, dest);
        }
    }

    /// Mark every op reachable from the first one, threading jumps that land
    /// on unconditional jumps through to their final destination.
    pub fn mark_reachable(&mut self) {
        if self.info.len() != self.ops.len() {
            self.simulate();
        }
        for info in &mut self.info {
            info.reachable = false;
        }
        if self.ops.is_empty() {
            return;
        }

        let mut work = vec![0];
        while let Some(mut pc) = work.pop() {
            loop {
                assert!(pc < self.ops.len(), "execution runs past the last op");
                if self.info[pc].reachable {
                    break;
                }
                self.info[pc].reachable = true;

                if self.ops[pc].target().is_some() {
                    let dest = self.find_destination(pc);
                    self.retarget(pc, dest);
                    work.push(dest);
                }
                if !self.ops[pc].code().advances() {
                    break;
                }
                pc += 1;
            }
        }
    }

    /// Remove unreachable ops, jumps to the next op, and empty
    /// `Enter`/`Exit` pairs until nothing changes. Returns how many ops were
    /// removed.
    pub fn eliminate_redundant(&mut self) -> usize {
        let before = self.ops.len();
        self.simulate();
        self.resolve_addresses();
        loop {
            self.eliminate_dead_code();
            if !self.eliminate_redundant_ops() {
                break;
            }
        }
        let removed = before - self.ops.len();
        if removed > 0 {
            debug!("eliminated {removed} of {before} ops");
        }
        removed
    }

    fn eliminate_dead_code(&mut self) -> bool {
        self.mark_reachable();
        let keep: Vec<bool> = self
            .ops
            .iter()
            .zip(&self.info)
            .map(|(op, info)| info.reachable || is_necessary(op.code()))
            .collect();
        self.compact(&keep)
    }

    fn eliminate_redundant_ops(&mut self) -> bool {
        self.simulate();
        self.resolve_addresses();
        for pc in 0..self.ops.len() {
            if self.ops[pc].target().is_some_and(|t| t.offset == 1) {
                self.info[pc].redundant = true;
            }
        }
        let keep: Vec<bool> = self.info.iter().map(|info| !info.redundant).collect();
        self.compact(&keep)
    }

    /// Drop the ops not marked in `keep`. A jump to a dropped op moves on to
    /// the next op that survives.
    fn compact(&mut self, keep: &[bool]) -> bool {
        if keep.iter().all(|&k| k) {
            return false;
        }

        let mut remap = Vec::with_capacity(keep.len());
        let mut kept: usize = 0;
        for &k in keep {
            remap.push(kept);
            if k {
                kept += 1;
            }
        }
        let last = kept.saturating_sub(1);

        let old = std::mem::take(&mut self.ops);
        self.ops = old
            .into_iter()
            .zip(keep)
            .filter_map(|(op, &k)| k.then_some(op))
            .collect();
        for op in &mut self.ops {
            if let Some(target) = op.target_mut() {
                if let Some(dest) = target.dest {
                    target.dest = Some(remap[dest].min(last));
                }
            }
        }

        self.simulate();
        self.resolve_addresses();
        true
    }

    /// Register every constant operand with `registry`.
    pub fn register_constants(&mut self, pool: &ConstantPool, registry: &mut ConstantRegistry) {
        for op in &mut self.ops {
            for arg in op.arguments_mut() {
                if let Argument::Constant(id) = *arg {
                    *arg = Argument::Constant(registry.register(pool, id));
                }
            }
        }
    }

    /// Write the op stream, freezing `registry` first.
    ///
    /// # Panics
    ///
    /// If a register has no index or a jump is unresolved; run
    /// [`simulate`](Self::simulate) and
    /// [`resolve_addresses`](Self::resolve_addresses) first.
    pub fn write(
        &self,
        w: &mut dyn Write,
        pool: &ConstantPool,
        registry: &mut ConstantRegistry,
    ) -> io::Result<()> {
        registry.freeze(pool);
        write_packed(w, self.ops.len() as i64)?;
        for (pc, op) in self.ops.iter().enumerate() {
            w.write_all(&[op.code() as u8])?;
            for arg in op.arguments() {
                write_packed(w, self.encode(pool, registry, arg) as i64)?;
            }
            if let Some(target) = op.target() {
                assert!(target.offset != 0, "jump at op {pc} is unresolved");
                write_packed(w, target.offset as i64)?;
            }
        }
        Ok(())
    }

    /// Optimise, register constants, and write. Returns the op bytes and the
    /// constant table they refer to.
    pub fn assemble(&mut self, pool: &ConstantPool) -> io::Result<(Vec<u8>, Vec<ConstId>)> {
        self.eliminate_redundant();
        let mut registry = ConstantRegistry::new();
        self.register_constants(pool, &mut registry);
        let mut bytes = Vec::new();
        self.write(&mut bytes, pool, &mut registry)?;
        Ok((bytes, registry.constants().to_vec()))
    }

    /// Read an op stream written by [`write`](Self::write).
    pub fn read(r: &mut dyn Read, constants: &[ConstId], params: u32) -> io::Result<Code> {
        let ops = OpDecoder::new(r, constants)?.collect::<io::Result<Vec<_>>>()?;
        let mut code = Code {
            ops,
            params,
            ..Code::default()
        };
        for (pc, op) in code.ops.iter().enumerate() {
            if let Some(target) = op.target() {
                let dest = pc as i64 + target.offset as i64;
                if target.offset == 0 || dest < 0 || dest >= code.ops.len() as i64 {
                    return Err(pool::packed::invalid_data("jump outside the code"));
                }
            }
        }
        code.simulate();
        code.resolve_addresses();
        Ok(code)
    }

    /// The encoded form of `arg`.
    pub fn encode(&self, pool: &ConstantPool, registry: &ConstantRegistry, arg: Argument) -> i32 {
        match arg {
            Argument::Constant(id) => encode_constant(registry.index_of(pool, id)),
            Argument::Register(id) => self.registers[id.index()]
                .index()
                .unwrap_or_else(|| panic!("register r{} has no index", id.index())),
            Argument::Slot(n) => n as i32,
            Argument::Predefined(n) => n,
        }
    }

    fn relative(&self, pc: usize, offset: i32) -> usize {
        let dest = pc as i64 + offset as i64;
        assert!(
            dest >= 0 && (dest as usize) < self.ops.len(),
            "op {pc} jumps outside the code (offset {offset})"
        );
        dest as usize
    }

    /// Follow `pc`'s jump, and any unconditional jumps it lands on.
    fn find_destination(&self, pc: usize) -> usize {
        let Some(target) = self.ops[pc].target() else {
            return pc;
        };
        let mut dest = target.dest.unwrap_or_else(|| self.relative(pc, target.offset));
        for _ in 0..self.ops.len() {
            assert!(dest != pc, "op {pc} jumps to itself");
            match &self.ops[dest] {
                Instruction::Jump { target } => {
                    let next = target.dest.unwrap_or_else(|| self.relative(dest, target.offset));
                    if next == dest {
                        break;
                    }
                    dest = next;
                }
                _ => break,
            }
        }
        dest
    }

    fn retarget(&mut self, pc: usize, dest: usize) {
        assert!(dest != pc, "op {pc} jumps to itself");
        assert!(dest < self.ops.len(), "op {pc} jumps past the last op");
        let exits = self.calc_exits(pc, dest);
        if let Some(target) = self.ops[pc].target_mut() {
            *target = Target {
                offset: dest as i32 - pc as i32,
                dest: Some(dest),
                exits,
            };
        }
    }

    fn calc_exits(&self, pc: usize, dest: usize) -> u32 {
        let (Some(from), Some(to)) = (self.info.get(pc), self.info.get(dest)) else {
            return 0;
        };
        let code = self.ops[pc].code();
        let delta = to.depth as i64 - from.depth as i64 - i64::from(code.is_enter()) + i64::from(code.is_exit());
        delta.unsigned_abs() as u32
    }
}

/// Scope boundaries stay even when unreachable so that scopes still nest.
fn is_necessary(code: OpCode) -> bool {
    code.is_enter() || code.is_exit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CodeBuilder;

    fn int_type(pool: &mut ConstantPool) -> ConstId {
        pool.ensure_string("Int")
    }

    #[test]
    fn registers_follow_scopes() {
        let mut pool = ConstantPool::new();
        let ty = int_type(&mut pool);
        let mut b = CodeBuilder::new(1);
        let a = b.var(ty, Some("a"));
        b.enter();
        let x = b.var(ty, Some("x"));
        let y = b.var(ty, Some("y"));
        b.exit();
        b.enter();
        let z = b.var(ty, Some("z"));
        b.exit();
        b.return0();
        let mut code = b.finish();
        code.simulate();

        let index = |id| code.register(id).index();
        assert_eq!(index(a), Some(1));
        assert_eq!(index(x), Some(2));
        assert_eq!(index(y), Some(3));
        assert_eq!(index(z), Some(2));
        assert_eq!(code.max_vars(), 4);
        assert_eq!(code.max_depth(), 2);
        assert_eq!(code.info(2).depth, 2);
    }

    #[test]
    fn jump_to_next_op_is_removed() {
        let mut pool = ConstantPool::new();
        let ty = int_type(&mut pool);
        let mut b = CodeBuilder::new(0);
        let v = b.var(ty, None);
        let label = b.jump_if(OpCode::JumpTrue, Argument::Register(v));
        b.bind(label);
        b.return0();
        let mut code = b.finish();

        assert_eq!(code.eliminate_redundant(), 1);
        assert_eq!(code.len(), 2);
        assert_eq!(code.op(1), &Instruction::Return0);
    }

    #[test]
    fn empty_scopes_are_removed() {
        let mut b = CodeBuilder::new(0);
        b.enter();
        b.exit();
        b.enter();
        b.nop();
        b.exit();
        b.return0();
        let mut code = b.finish();

        assert_eq!(code.eliminate_redundant(), 2);
        let codes: Vec<OpCode> = code.ops().iter().map(Instruction::code).collect();
        assert_eq!(codes, [OpCode::Enter, OpCode::Nop, OpCode::Exit, OpCode::Return0]);
    }

    #[test]
    fn unreachable_ops_are_removed_and_jumps_threaded() {
        let mut pool = ConstantPool::new();
        let ty = int_type(&mut pool);
        let mut b = CodeBuilder::new(1);
        let first = b.jump();
        b.nop();
        b.bind(first);
        let second = b.jump();
        b.nop();
        b.nop();
        b.bind(second);
        let v = b.var(ty, None);
        b.return1(Argument::Register(v));
        let mut code = b.finish();

        code.eliminate_redundant();
        let codes: Vec<OpCode> = code.ops().iter().map(Instruction::code).collect();
        assert_eq!(codes, [OpCode::Var, OpCode::Return1]);
    }

    #[test]
    fn jumps_count_exited_scopes() {
        let mut pool = ConstantPool::new();
        let ty = int_type(&mut pool);
        let mut b = CodeBuilder::new(1);
        b.enter();
        b.enter();
        let v = b.var(ty, None);
        let out = b.jump_if(OpCode::JumpZero, Argument::Register(v));
        b.exit();
        b.exit();
        b.bind(out);
        b.return0();
        let mut code = b.finish();
        code.simulate();
        code.resolve_addresses();

        let target = code.op(3).target().copied().unwrap();
        assert_eq!(target.offset, 3);
        assert_eq!(target.exits, 2);
        code.mark_reachable();
        assert!(code.info(4).reachable);
    }

    #[test]
    #[should_panic(expected = "jumps to itself")]
    fn jump_to_itself_panics() {
        let mut b = CodeBuilder::new(0);
        let top = b.current_offset();
        b.jump_back(top);
        let mut code = b.finish();
        code.simulate();
        code.resolve_addresses();
    }

    #[test]
    #[should_panic(expected = "never entered")]
    fn unbalanced_exit_panics() {
        let mut b = CodeBuilder::new(0);
        b.exit();
        b.finish().simulate();
    }
}
