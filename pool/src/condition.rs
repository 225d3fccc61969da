use std::collections::{BTreeMap, HashMap};

use log::trace;
use version::Version;

use crate::constant::{ConstId, Constant};
use crate::pool::ConstantPool;

/// Most terminals a condition may mention; the truth table is indexed by a
/// `u64` bit set.
const MAX_TERMINALS: usize = 63;

/// What the linker knows about the environment a module is linked into.
pub trait LinkerContext {
    /// Whether the named option was specified.
    fn is_specified(&self, name: &str) -> bool;

    /// Whether the structure with this qualified name is present.
    fn is_present(&self, qualified_name: &str) -> bool;

    /// Whether the linked version of `module` is substitutable for `version`.
    fn is_version_match(&self, module: &str, version: &Version) -> bool;

    /// Whether the module being linked is of exactly this version.
    fn is_version(&self, version: &Version) -> bool;
}

/// How two terminal conditions constrain each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Any combination of values is possible.
    Indep,
    /// Always equal.
    Equiv,
    /// Always opposite.
    Inverse,
    /// Never both true.
    Mutex,
    /// Never both false.
    Mutin,
    /// The first being true forces the second to be true.
    Implies,
    /// The second being true forces the first to be true.
    Implied,
}

impl Relation {
    /// The relation seen from the other side.
    pub fn reverse(self) -> Relation {
        match self {
            Relation::Implies => Relation::Implied,
            Relation::Implied => Relation::Implies,
            other => other,
        }
    }

    /// The relation between the negations of the two terminals.
    pub fn inverse(self) -> Relation {
        match self {
            Relation::Mutex => Relation::Mutin,
            Relation::Mutin => Relation::Mutex,
            other => other,
        }
    }
}

/// How a terminal affects the value of a compound condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Influence {
    /// No valid assignment exercises the terminal at all.
    None,
    /// The condition is false whatever the terminal is.
    AlwaysF,
    /// The terminal must be true for the condition to be true.
    And,
    /// The condition is exactly the terminal.
    Identity,
    /// The terminal must be false for the condition to be true.
    InvAnd,
    /// The terminal matters, but neither value decides the condition alone.
    Contrib,
    /// The terminal being true makes the condition true.
    Or,
    /// The condition is exactly the negation of the terminal.
    Inverse,
    /// The terminal being false makes the condition true.
    InvOr,
    /// The condition is true whatever the terminal is.
    AlwaysT,
}

impl Influence {
    /// The influence of the same terminal on the negated condition.
    pub fn inverse(self) -> Influence {
        match self {
            Influence::And => Influence::InvOr,
            Influence::InvAnd => Influence::Or,
            Influence::Or => Influence::InvAnd,
            Influence::InvOr => Influence::And,
            Influence::Identity => Influence::Inverse,
            Influence::Inverse => Influence::Identity,
            Influence::AlwaysF => Influence::AlwaysT,
            Influence::AlwaysT => Influence::AlwaysF,
            Influence::None | Influence::Contrib => self,
        }
    }

    /// The influence once the condition is joined into an AND.
    pub fn and(self) -> Influence {
        match self {
            Influence::Or | Influence::InvOr | Influence::AlwaysT => Influence::Contrib,
            Influence::Inverse => Influence::InvAnd,
            Influence::Identity => Influence::And,
            other => other,
        }
    }

    pub fn is_required(self) -> bool {
        matches!(self, Influence::And | Influence::Identity)
    }

    /// Classify a terminal from truth-table counts: how often the terminal
    /// was false or true while the condition came out false or true.
    pub fn translate(false_false: u64, false_true: u64, true_false: u64, true_true: u64) -> Influence {
        let bits = (if false_false == 0 { 0 } else { 0b1000 })
            | (if false_true == 0 { 0 } else { 0b0100 })
            | (if true_false == 0 { 0 } else { 0b0010 })
            | (if true_true == 0 { 0 } else { 0b0001 });
        match bits {
            0b0000 => Influence::None,
            0b0001 | 0b0100 | 0b0101 => Influence::AlwaysT,
            0b0010 | 0b1000 | 0b1010 => Influence::AlwaysF,
            0b0110 => Influence::Inverse,
            0b0111 => Influence::InvOr,
            0b1001 => Influence::Identity,
            0b1011 => Influence::And,
            0b1101 => Influence::Or,
            0b1110 => Influence::InvAnd,
            _ => Influence::Contrib,
        }
    }
}

/// The outcome of fixing a split condition and asking what remains of a
/// target condition on each side.
///
/// A residual of `None` on a possible side means the target is
/// unconditionally true there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bifurcation {
    pub true_possible: bool,
    pub true_condition: Option<ConstId>,
    pub false_possible: bool,
    pub false_condition: Option<ConstId>,
}

impl Bifurcation {
    fn new(
        true_possible: bool,
        true_condition: Option<ConstId>,
        false_possible: bool,
        false_condition: Option<ConstId>,
    ) -> Self {
        Self {
            true_possible,
            true_condition: true_condition.filter(|_| true_possible),
            false_possible,
            false_condition: false_condition.filter(|_| false_possible),
        }
    }
}

/// Which truth-table bit a terminal reads, and whether it reads it negated.
#[derive(Debug, Clone, Copy)]
struct Slot {
    bit: usize,
    inverted: bool,
}

impl ConstantPool {
    pub fn is_condition(&self, id: ConstId) -> bool {
        self.format(id).is_condition()
    }

    pub fn is_terminal(&self, id: ConstId) -> bool {
        self.format(id).is_terminal_condition()
    }

    /// Distinct terminals of a condition, in first-appearance order.
    pub fn terminals(&self, cond: ConstId) -> Vec<ConstId> {
        let mut found = Vec::new();
        self.collect_terminals(cond, &mut found);
        found
    }

    fn collect_terminals(&self, cond: ConstId, found: &mut Vec<ConstId>) {
        let cond = self.resolve(cond);
        match self.get(cond) {
            Constant::ConditionNot(inner) => self.collect_terminals(*inner, found),
            Constant::ConditionAll(ids) | Constant::ConditionAny(ids) => {
                for &id in ids {
                    self.collect_terminals(id, found);
                }
            }
            other => {
                assert!(other.format().is_terminal_condition(), "{other:?} is not a condition");
                if !found.contains(&cond) {
                    found.push(cond);
                }
            }
        }
    }

    /// The relation between two terminal conditions.
    pub fn relation(&self, a: ConstId, b: ConstId) -> Relation {
        let (a, b) = (self.resolve(a), self.resolve(b));
        if a == b {
            return Relation::Equiv;
        }
        match (self.get(a), self.get(b)) {
            (Constant::ConditionVersioned(_), Constant::ConditionVersioned(_)) => Relation::Mutex,
            (
                Constant::ConditionVersionMatches { module: m1, version: v1 },
                Constant::ConditionVersionMatches { module: m2, version: v2 },
            ) if self.resolve(*m1) == self.resolve(*m2) => {
                let (Constant::Version(v1), Constant::Version(v2)) = (self.get(*v1), self.get(*v2)) else {
                    return Relation::Indep;
                };
                match (v1.is_substitutable_for(v2), v2.is_substitutable_for(v1)) {
                    (true, true) => Relation::Equiv,
                    (true, false) => Relation::Implies,
                    (false, true) => Relation::Implied,
                    (false, false) => Relation::Indep,
                }
            }
            (Constant::ConditionVersionMatches { module, .. }, Constant::ConditionPresent(identity))
                if self.resolve(*module) == self.resolve(*identity) =>
            {
                Relation::Implies
            }
            (Constant::ConditionPresent(identity), Constant::ConditionVersionMatches { module, .. })
                if self.resolve(*module) == self.resolve(*identity) =>
            {
                Relation::Implied
            }
            _ => Relation::Indep,
        }
    }

    /// Evaluate a condition against the environment.
    pub fn evaluate(&self, cond: ConstId, ctx: &dyn LinkerContext) -> bool {
        match self.get(cond) {
            Constant::ConditionNot(inner) => !self.evaluate(*inner, ctx),
            Constant::ConditionAll(ids) => ids.iter().all(|&id| self.evaluate(id, ctx)),
            Constant::ConditionAny(ids) => ids.iter().any(|&id| self.evaluate(id, ctx)),
            Constant::ConditionNamed(name) => ctx.is_specified(name),
            Constant::ConditionPresent(identity) => ctx.is_present(&self.qualified_name(*identity)),
            Constant::ConditionVersionMatches { module, version } => match self.get(*version) {
                Constant::Version(ver) => ctx.is_version_match(&self.qualified_name(*module), ver),
                _ => false,
            },
            Constant::ConditionVersioned(version) => match self.get(*version) {
                Constant::Version(ver) => ctx.is_version(ver),
                _ => false,
            },
            other => panic!("{other:?} is not a condition"),
        }
    }

    fn test_evaluate(&self, cond: ConstId, assignment: u64, slots: &HashMap<ConstId, Slot>) -> bool {
        let cond = self.resolve(cond);
        match self.get(cond) {
            Constant::ConditionNot(inner) => !self.test_evaluate(*inner, assignment, slots),
            Constant::ConditionAll(ids) => ids.iter().all(|&id| self.test_evaluate(id, assignment, slots)),
            Constant::ConditionAny(ids) => ids.iter().any(|&id| self.test_evaluate(id, assignment, slots)),
            _ => {
                let slot = slots[&cond];
                (assignment & (1 << slot.bit) != 0) != slot.inverted
            }
        }
    }

    /// How each terminal of `cond` influences its value, found by
    /// evaluating every assignment the terminals' relations allow.
    pub fn terminal_influences(&self, cond: ConstId) -> BTreeMap<ConstId, Influence> {
        let cond = self.resolve(cond);
        if self.is_terminal(cond) {
            return BTreeMap::from([(cond, Influence::Identity)]);
        }

        let terminals = self.terminals(cond);
        let mut reps: Vec<ConstId> = Vec::new();
        let mut slots = HashMap::new();
        let mut skips: Vec<(u64, u64)> = Vec::new();

        'next: for &terminal in &terminals {
            let mut conflicts = Vec::new();
            for (bit, &rep) in reps.iter().enumerate() {
                match self.relation(rep, terminal) {
                    Relation::Indep => {}
                    Relation::Equiv => {
                        slots.insert(terminal, Slot { bit, inverted: false });
                        continue 'next;
                    }
                    Relation::Inverse => {
                        slots.insert(terminal, Slot { bit, inverted: true });
                        continue 'next;
                    }
                    rel => conflicts.push((bit, rel)),
                }
            }

            let this = reps.len();
            assert!(this < MAX_TERMINALS, "condition has more than {MAX_TERMINALS} terminals");
            reps.push(terminal);
            slots.insert(terminal, Slot { bit: this, inverted: false });
            for (that, rel) in conflicts {
                let mask = (1u64 << that) | (1u64 << this);
                let pattern = match rel {
                    Relation::Mutex => mask,
                    Relation::Mutin => 0,
                    Relation::Implies => 1u64 << that,
                    Relation::Implied => 1u64 << this,
                    Relation::Indep | Relation::Equiv | Relation::Inverse => continue,
                };
                skips.push((mask, pattern));
            }
        }

        let count = reps.len();
        let mut ff = vec![0u64; count];
        let mut ft = vec![0u64; count];
        let mut tf = vec![0u64; count];
        let mut tt = vec![0u64; count];
        for assignment in 0..(1u64 << count) {
            if skips.iter().any(|&(mask, pattern)| assignment & mask == pattern) {
                continue;
            }
            let result = self.test_evaluate(cond, assignment, &slots);
            for bit in 0..count {
                let input = assignment & (1 << bit) != 0;
                match (input, result) {
                    (false, false) => ff[bit] += 1,
                    (false, true) => ft[bit] += 1,
                    (true, false) => tf[bit] += 1,
                    (true, true) => tt[bit] += 1,
                }
            }
        }

        terminals
            .into_iter()
            .map(|terminal| {
                let slot = slots[&terminal];
                let b = slot.bit;
                let influence = Influence::translate(ff[b], ft[b], tf[b], tt[b]);
                (terminal, if slot.inverted { influence.inverse() } else { influence })
            })
            .collect()
    }

    /// `AlwaysF` for an unsatisfiable condition, `AlwaysT` for a tautology,
    /// otherwise `Contrib`.
    pub fn satisfiability(&self, cond: ConstId) -> Influence {
        let mut result = Influence::None;
        for influence in self.terminal_influences(cond).into_values() {
            match influence {
                Influence::AlwaysF | Influence::AlwaysT => {
                    debug_assert!(result == Influence::None || result == influence);
                    result = influence;
                }
                _ => return Influence::Contrib,
            }
        }
        result
    }

    pub fn is_satisfiable(&self, cond: ConstId) -> bool {
        self.satisfiability(cond) != Influence::AlwaysF
    }

    fn members(&self, cond: ConstId) -> Option<&[ConstId]> {
        match self.get(cond) {
            Constant::ConditionAll(ids) | Constant::ConditionAny(ids) => Some(ids),
            _ => None,
        }
    }

    fn is_all(&self, cond: ConstId) -> bool {
        matches!(self.get(cond), Constant::ConditionAll(_))
    }

    fn is_any(&self, cond: ConstId) -> bool {
        matches!(self.get(cond), Constant::ConditionAny(_))
    }

    /// `a && b`, flattening nested ALL conditions and dropping duplicates.
    pub fn add_and(&mut self, a: ConstId, b: ConstId) -> ConstId {
        self.combine(a, b, ConstantPool::is_all, Constant::ConditionAll)
    }

    /// `a || b`, flattening nested ANY conditions and dropping duplicates.
    pub fn add_or(&mut self, a: ConstId, b: ConstId) -> ConstId {
        self.combine(a, b, ConstantPool::is_any, Constant::ConditionAny)
    }

    fn combine(
        &mut self,
        a: ConstId,
        b: ConstId,
        same_kind: fn(&ConstantPool, ConstId) -> bool,
        build: fn(Vec<ConstId>) -> Constant,
    ) -> ConstId {
        let (a, b) = (self.resolve(a), self.resolve(b));
        if a == b {
            return a;
        }
        let mut conds: Vec<ConstId> = Vec::new();
        for side in [a, b] {
            let flat = if same_kind(self, side) {
                self.members(side).map(<[ConstId]>::to_vec).unwrap_or_default()
            } else {
                vec![side]
            };
            for cond in flat {
                if !conds.contains(&cond) {
                    conds.push(cond);
                }
            }
        }
        match conds.as_slice() {
            [only] => *only,
            _ => self.register(build(conds)),
        }
    }

    /// `!cond`; negating a NOT unwraps it.
    pub fn negate(&mut self, cond: ConstId) -> ConstId {
        match self.get(cond) {
            Constant::ConditionNot(inner) => self.resolve(*inner),
            _ => self.ensure_not_condition(cond),
        }
    }

    /// An ALL/ANY condition without its member at `index`; a two-member
    /// list collapses to the remaining member.
    pub fn remove_member(&mut self, cond: ConstId, index: usize) -> ConstId {
        let (ids, all) = match self.get(cond) {
            Constant::ConditionAll(ids) => (ids.clone(), true),
            Constant::ConditionAny(ids) => (ids.clone(), false),
            other => panic!("{other:?} has no members"),
        };
        assert!(index < ids.len(), "member {index} of {}", ids.len());
        if ids.len() == 2 {
            return ids[1 - index];
        }
        let mut rest = ids;
        rest.remove(index);
        self.register(if all {
            Constant::ConditionAll(rest)
        } else {
            Constant::ConditionAny(rest)
        })
    }

    /// An ALL/ANY condition without `member`, or `cond` unchanged if
    /// `member` is not one of its members.
    pub fn remove_term(&mut self, cond: ConstId, member: ConstId) -> ConstId {
        let member = self.resolve(member);
        match self.members(cond).and_then(|ids| ids.iter().position(|&id| id == member)) {
            Some(index) => self.remove_member(cond, index),
            None => cond,
        }
    }

    /// Fix `axis` and work out what remains of `target` on each side.
    ///
    /// A side whose combination with `target` is unsatisfiable is never
    /// reported as possible.
    pub fn bifurcate(&mut self, axis: ConstId, target: ConstId) -> Bifurcation {
        let (axis, target) = (self.resolve(axis), self.resolve(target));

        let mut negated = false;
        let mut axis_core = axis;
        if let Constant::ConditionNot(inner) = self.get(axis) {
            negated = !negated;
            axis_core = self.resolve(*inner);
        }
        let mut target_core = target;
        if let Constant::ConditionNot(inner) = self.get(target) {
            negated = !negated;
            target_core = self.resolve(*inner);
        }

        if self.is_terminal(axis_core) && self.is_terminal(target_core) {
            match self.relation(axis_core, target_core) {
                Relation::Equiv => return Bifurcation::new(!negated, None, negated, None),
                Relation::Inverse => return Bifurcation::new(negated, None, !negated, None),
                _ => {}
            }
        }

        let axis_neg = self.negate(axis);
        if target == axis {
            return Bifurcation::new(true, None, false, None);
        }
        if target == axis_neg {
            return Bifurcation::new(false, None, true, None);
        }
        if self.is_all(target) {
            if let Some(split) = self.split_all(axis, axis_neg, target) {
                trace!("bifurcated {} on {}", self.describe(target), self.describe(axis));
                return split;
            }
        }

        let with_true = self.add_and(axis, target);
        let with_false = self.add_and(axis_neg, target);
        let true_possible = self.is_satisfiable(with_true);
        let false_possible = self.is_satisfiable(with_false);
        Bifurcation::new(true_possible, Some(target), false_possible, Some(target))
    }

    /// Fast paths for an ALL target that names the axis (or its negation)
    /// directly, or contains every member of an ALL axis.
    fn split_all(&mut self, axis: ConstId, axis_neg: ConstId, target: ConstId) -> Option<Bifurcation> {
        let members = self.members(target)?.to_vec();
        for (index, &member) in members.iter().enumerate() {
            if member == axis {
                let rest = self.remove_member(target, index);
                let joined = self.add_and(axis, rest);
                let possible = self.is_satisfiable(joined);
                return Some(Bifurcation::new(possible, Some(rest), false, None));
            }
            if member == axis_neg {
                let rest = self.remove_member(target, index);
                let joined = self.add_and(axis_neg, rest);
                let possible = self.is_satisfiable(joined);
                return Some(Bifurcation::new(false, None, possible, Some(rest)));
            }
        }

        let axis_members = match self.get(axis) {
            Constant::ConditionAll(ids) => ids.clone(),
            _ => return None,
        };
        if axis_members.len() >= members.len() {
            return None;
        }
        let mut reduced = target;
        for member in axis_members {
            let before = reduced;
            reduced = self.remove_term(reduced, member);
            if reduced == before {
                return None;
            }
        }
        let joined = self.add_and(axis, reduced);
        let possible = self.is_satisfiable(joined);
        Some(Bifurcation::new(possible, Some(reduced), false, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    struct Env {
        defined: Vec<&'static str>,
    }

    impl LinkerContext for Env {
        fn is_specified(&self, name: &str) -> bool {
            self.defined.contains(&name)
        }

        fn is_present(&self, qualified_name: &str) -> bool {
            qualified_name == "net.example"
        }

        fn is_version_match(&self, _module: &str, version: &Version) -> bool {
            v("2.3").is_substitutable_for(version)
        }

        fn is_version(&self, version: &Version) -> bool {
            *version == v("2.0")
        }
    }

    #[test]
    fn translate_table() {
        assert_eq!(Influence::translate(0, 0, 0, 0), Influence::None);
        assert_eq!(Influence::translate(1, 0, 0, 1), Influence::Identity);
        assert_eq!(Influence::translate(2, 0, 1, 1), Influence::And);
        assert_eq!(Influence::translate(1, 1, 0, 2), Influence::Or);
        assert_eq!(Influence::translate(1, 0, 1, 0), Influence::AlwaysF);
        assert_eq!(Influence::translate(0, 1, 0, 1), Influence::AlwaysT);
        assert_eq!(Influence::translate(1, 1, 1, 1), Influence::Contrib);
        assert_eq!(Influence::And.inverse(), Influence::InvOr);
        assert_eq!(Influence::Inverse.and(), Influence::InvAnd);
        assert!(Influence::Identity.is_required());
        assert!(!Influence::Or.is_required());
        assert_eq!(Relation::Implies.reverse(), Relation::Implied);
        assert_eq!(Relation::Mutex.inverse(), Relation::Mutin);
    }

    #[test]
    fn and_influences() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_named_condition("a");
        let b = pool.ensure_named_condition("b");
        let c = pool.ensure_named_condition("c");
        let ab = pool.add_and(a, b);
        let nc = pool.negate(c);
        let cond = pool.add_and(ab, nc);
        let influences = pool.terminal_influences(cond);
        assert_eq!(influences[&a], Influence::And);
        assert_eq!(influences[&b], Influence::And);
        assert_eq!(influences[&c], Influence::InvAnd);

        let any = pool.add_or(a, b);
        assert_eq!(pool.terminal_influences(any)[&a], Influence::Or);
        assert_eq!(pool.satisfiability(any), Influence::Contrib);
    }

    #[test]
    fn contradictions_and_tautologies() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_named_condition("a");
        let na = pool.negate(a);
        let never = pool.add_and(a, na);
        let always = pool.add_or(a, na);
        assert_eq!(pool.satisfiability(never), Influence::AlwaysF);
        assert_eq!(pool.satisfiability(always), Influence::AlwaysT);
        assert!(!pool.is_satisfiable(never));
    }

    #[test]
    fn versioned_terminals_are_exclusive() {
        let mut pool = ConstantPool::new();
        let one = pool.ensure_versioned_condition(&v("1.0"));
        let two = pool.ensure_versioned_condition(&v("2.0"));
        assert_eq!(pool.relation(one, two), Relation::Mutex);
        let both = pool.add_and(one, two);
        assert!(!pool.is_satisfiable(both));
    }

    #[test]
    fn version_match_relations() {
        let mut pool = ConstantPool::new();
        let m = pool.ensure_module("net.example");
        let newer = pool.ensure_version_matches_condition(m, &v("2.1"));
        let older = pool.ensure_version_matches_condition(m, &v("2.0"));
        let present = pool.ensure_present_condition(m);
        assert_eq!(pool.relation(newer, older), Relation::Implies);
        assert_eq!(pool.relation(older, newer), Relation::Implied);
        assert_eq!(pool.relation(newer, present), Relation::Implies);
        assert_eq!(pool.relation(present, newer), Relation::Implied);

        let not_present = pool.negate(present);
        let impossible = pool.add_and(newer, not_present);
        assert!(!pool.is_satisfiable(impossible));
    }

    #[test]
    fn flattening_and_negation() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_named_condition("a");
        let b = pool.ensure_named_condition("b");
        let c = pool.ensure_named_condition("c");
        let ab = pool.add_and(a, b);
        let bc = pool.add_and(b, c);
        let abc = pool.add_and(ab, bc);
        assert_eq!(pool.members(abc).map(<[ConstId]>::len), Some(3));
        assert_eq!(pool.add_and(a, a), a);
        assert_eq!(pool.add_and(ab, a), ab);

        let na = pool.negate(a);
        assert_eq!(pool.negate(na), a);

        assert_eq!(pool.remove_term(ab, a), b);
        assert_eq!(pool.remove_term(ab, c), ab);
        let without_b = pool.remove_term(abc, b);
        let ac = pool.add_and(a, c);
        assert_eq!(without_b, ac);
    }

    #[test]
    fn bifurcate_terminals() {
        init();
        let mut pool = ConstantPool::new();
        let a = pool.ensure_named_condition("a");
        let b = pool.ensure_named_condition("b");
        let na = pool.negate(a);

        let same = pool.bifurcate(a, a);
        assert_eq!(same, Bifurcation::new(true, None, false, None));

        let opposite = pool.bifurcate(a, na);
        assert!(!opposite.true_possible);
        assert!(opposite.false_possible);

        let split = pool.bifurcate(a, b);
        assert!(split.true_possible && split.false_possible);
        assert_eq!(split.true_condition, Some(b));
    }

    #[test]
    fn bifurcate_all_removes_axis() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_named_condition("a");
        let b = pool.ensure_named_condition("b");
        let c = pool.ensure_named_condition("c");
        let ab = pool.add_and(a, b);
        let target = pool.add_and(ab, c);

        let split = pool.bifurcate(a, target);
        let bc = pool.add_and(b, c);
        assert_eq!(split, Bifurcation::new(true, Some(bc), false, None));

        let na = pool.negate(a);
        let neg_target = pool.add_and(na, b);
        let split = pool.bifurcate(a, neg_target);
        assert_eq!(split, Bifurcation::new(false, None, true, Some(b)));

        let split = pool.bifurcate(ab, target);
        assert_eq!(split, Bifurcation::new(true, Some(c), false, None));
    }

    #[test]
    fn bifurcate_never_returns_impossible_side() {
        let mut pool = ConstantPool::new();
        let one = pool.ensure_versioned_condition(&v("1.0"));
        let two = pool.ensure_versioned_condition(&v("2.0"));
        let split = pool.bifurcate(one, two);
        assert!(!split.true_possible);
        assert_eq!(split.true_condition, None);
        assert!(split.false_possible);
        assert_eq!(split.false_condition, Some(two));
    }

    /// Put the two sides of a split back together: `axis && rest` on the
    /// true side, `!axis && rest` on the false side, nothing for a side that
    /// cannot happen.
    fn rejoin(pool: &mut ConstantPool, axis: ConstId, split: Bifurcation) -> Option<ConstId> {
        let axis_neg = pool.negate(axis);
        let mut sides = Vec::new();
        if split.true_possible {
            sides.push(match split.true_condition {
                Some(rest) => pool.add_and(axis, rest),
                None => axis,
            });
        }
        if split.false_possible {
            sides.push(match split.false_condition {
                Some(rest) => pool.add_and(axis_neg, rest),
                None => axis_neg,
            });
        }
        sides.into_iter().reduce(|a, b| pool.add_or(a, b))
    }

    fn assert_equivalent(pool: &mut ConstantPool, a: ConstId, b: ConstId) {
        let not_a = pool.negate(a);
        let not_b = pool.negate(b);
        let only_a = pool.add_and(a, not_b);
        let only_b = pool.add_and(b, not_a);
        assert!(
            !pool.is_satisfiable(only_a) && !pool.is_satisfiable(only_b),
            "{} is not {}",
            pool.describe(a),
            pool.describe(b)
        );
    }

    #[test]
    fn bifurcation_sides_rejoin_to_the_target() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_named_condition("a");
        let b = pool.ensure_named_condition("b");
        let c = pool.ensure_named_condition("c");
        let na = pool.negate(a);
        let one = pool.ensure_versioned_condition(&v("1.0"));
        let two = pool.ensure_versioned_condition(&v("2.0"));

        let ab = pool.add_and(a, b);
        let abc = pool.add_and(ab, c);
        let na_b = pool.add_and(na, b);
        let a_or_b = pool.add_or(a, b);
        let not_ab = pool.negate(ab);
        let one_or_c = pool.add_or(one, c);
        let bc = pool.add_and(b, c);
        let not_bc = pool.negate(bc);

        let cases = [
            (a, b),
            (a, na),
            (a, abc),
            (a, na_b),
            (a, a_or_b),
            (a, not_ab),
            (na, ab),
            (na, not_bc),
            (ab, abc),
            (ab, a_or_b),
            (ab, not_ab),
            (one, two),
            (one, one_or_c),
            (two, one_or_c),
        ];
        for (axis, target) in cases {
            let split = pool.bifurcate(axis, target);
            match rejoin(&mut pool, axis, split) {
                Some(joined) => assert_equivalent(&mut pool, joined, target),
                None => assert!(!pool.is_satisfiable(target)),
            }
        }
    }

    #[test]
    fn evaluate_against_context() {
        let mut pool = ConstantPool::new();
        let env = Env { defined: vec!["debug"] };
        let m = pool.ensure_module("net.example");
        let debug = pool.ensure_named_condition("debug");
        let test = pool.ensure_named_condition("test");
        let present = pool.ensure_present_condition(m);
        let matches = pool.ensure_version_matches_condition(m, &v("2.1"));
        let exact = pool.ensure_versioned_condition(&v("2.0"));

        assert!(pool.evaluate(debug, &env));
        assert!(!pool.evaluate(test, &env));
        let either = pool.add_or(debug, test);
        assert!(pool.evaluate(either, &env));
        let all = pool.add_and(present, matches);
        let all = pool.add_and(all, exact);
        assert!(pool.evaluate(all, &env));
        let not_debug = pool.negate(debug);
        assert!(!pool.evaluate(not_debug, &env));
    }
}
