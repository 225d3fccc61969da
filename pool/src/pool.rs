use core::cmp::Ordering;
use std::collections::HashMap;
use std::io;

use log::trace;
use version::Version;

use crate::constant::{ConstId, Constant};
use crate::format::Format;
use crate::locator::Locator;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("constant {0} refers to an unresolved name")]
    Unresolved(String),
    #[error("name {name} is already resolved to {existing}")]
    AlreadyResolved { name: String, existing: String },
    #[error("name {0} cannot resolve to itself")]
    SelfReference(String),
    #[error("constant {0} is interned and cannot be modified")]
    Frozen(String),
    #[error("corrupt constant pool: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// The canonical instance, present in the intern table.
    Interned,
    /// Refers (possibly transitively) to an unresolved name; not interned.
    Held,
    /// Superseded by another entry.
    Forward(ConstId),
}

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) constant: Constant,
    pub(crate) position: Option<u32>,
    pub(crate) state: State,
}

/// The deduplicated table of every constant a module refers to.
///
/// The pool owns every [`Constant`]; everything else holds [`ConstId`]s.
/// Registering a constant that is structurally equal to an existing one
/// returns the existing handle. Constants that refer to a name nobody has
/// resolved yet are held aside and interned later by
/// [`resolve_constants`](Self::resolve_constants).
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    pub(crate) entries: Vec<Entry>,
    pub(crate) lookup: HashMap<Constant, ConstId>,
    pub(crate) locators: HashMap<(Format, Locator), ConstId>,
    pub(crate) by_position: Vec<ConstId>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including held and superseded ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Follow forwarding links to the entry that currently stands for `id`.
    pub fn resolve(&self, mut id: ConstId) -> ConstId {
        while let State::Forward(next) = self.entries[id.index()].state {
            id = next;
        }
        id
    }

    pub fn get(&self, id: ConstId) -> &Constant {
        &self.entries[self.resolve(id).index()].constant
    }

    pub fn format(&self, id: ConstId) -> Format {
        self.get(id).format()
    }

    pub fn is_interned(&self, id: ConstId) -> bool {
        self.entries[self.resolve(id).index()].state == State::Interned
    }

    /// Index of `id` in the serialized table, once the pool has been written
    /// or read.
    pub fn position(&self, id: ConstId) -> Option<u32> {
        self.entries[self.resolve(id).index()].position
    }

    /// The constant at a serialized index.
    pub fn get_by_position(&self, position: u32) -> Option<ConstId> {
        self.by_position.get(position as usize).copied()
    }

    pub fn find(&self, format: Format, locator: &Locator) -> Option<ConstId> {
        self.locators.get(&(format, locator.clone())).copied()
    }

    /// Intern `constant`, returning the canonical handle for its value.
    ///
    /// Child handles are resolved first, and the members of ALL/ANY
    /// conditions are put into the pool's total order so that member order
    /// does not affect identity.
    pub fn register(&mut self, constant: Constant) -> ConstId {
        let constant = self.canonicalize(&constant);

        if matches!(constant, Constant::UnresolvedName(_))
            || constant.children().into_iter().any(|c| self.contains_unresolved(c))
        {
            let id = self.push(constant, State::Held);
            trace!("holding unresolved constant {}", self.describe(id));
            return id;
        }

        if let Some(&id) = self.lookup.get(&constant) {
            return id;
        }
        self.intern(constant, None)
    }

    fn push(&mut self, constant: Constant, state: State) -> ConstId {
        let id = ConstId(self.entries.len() as u32);
        self.entries.push(Entry {
            constant,
            position: None,
            state,
        });
        id
    }

    /// Add a constant known to be absent from the intern table, either as a
    /// new entry or by promoting the held entry `existing`.
    fn intern(&mut self, constant: Constant, existing: Option<ConstId>) -> ConstId {
        let id = match existing {
            Some(id) => {
                let entry = &mut self.entries[id.index()];
                entry.constant = constant.clone();
                entry.state = State::Interned;
                id
            }
            None => self.push(constant.clone(), State::Interned),
        };
        if let Some(locator) = constant.locator() {
            let format = constant.format();
            if let Some(prev) = self.locators.insert((format, locator), id) {
                panic!(
                    "locator collision between {} and {}",
                    self.describe(prev),
                    self.describe(id)
                );
            }
        }
        trace!("registered {:?} {}", constant.format(), self.describe(id));
        self.lookup.insert(constant, id);
        id
    }

    fn canonicalize(&self, constant: &Constant) -> Constant {
        let mut canonical = constant.map_children(|c| self.resolve(c));
        if let Constant::ConditionAll(ids) | Constant::ConditionAny(ids) = &mut canonical {
            ids.sort_by(|&a, &b| self.compare(a, b));
            ids.dedup();
        }
        canonical
    }

    /// True if `id` refers, directly or transitively, to a name that has not
    /// been resolved.
    pub fn contains_unresolved(&self, id: ConstId) -> bool {
        let constant = self.get(id);
        matches!(constant, Constant::UnresolvedName(_))
            || constant.children().into_iter().any(|c| self.contains_unresolved(c))
    }

    /// A placeholder for a name whose target will be known later.
    pub fn ensure_unresolved(&mut self, name: &str) -> ConstId {
        self.register(Constant::UnresolvedName(name.to_string()))
    }

    /// Point a placeholder at the constant it names.
    pub fn resolve_placeholder(&mut self, placeholder: ConstId, target: ConstId) -> Result<(), PoolError> {
        let name = match &self.entries[placeholder.index()].constant {
            Constant::UnresolvedName(name) => name.clone(),
            other => panic!("{other:?} is not an unresolved name"),
        };
        let target = self.resolve(target);
        if target == placeholder {
            return Err(PoolError::SelfReference(name));
        }
        if let State::Forward(existing) = self.entries[placeholder.index()].state {
            let existing = self.resolve(existing);
            if existing == target {
                return Ok(());
            }
            return Err(PoolError::AlreadyResolved {
                name,
                existing: self.describe(existing),
            });
        }
        trace!("resolved {name} to {}", self.describe(target));
        self.entries[placeholder.index()].state = State::Forward(target);
        Ok(())
    }

    /// Relocation pass: intern every held constant whose names have all been
    /// resolved, forwarding it to an equal canonical constant if one exists.
    ///
    /// Returns the number of constants still held.
    pub fn resolve_constants(&mut self) -> usize {
        loop {
            let mut progress = false;
            for index in 0..self.entries.len() {
                let id = ConstId(index as u32);
                let entry = &self.entries[index];
                if entry.state != State::Held
                    || matches!(entry.constant, Constant::UnresolvedName(_))
                    || self.contains_unresolved(id)
                {
                    continue;
                }
                let constant = self.canonicalize(&entry.constant);
                match self.lookup.get(&constant).copied() {
                    Some(existing) => self.entries[index].state = State::Forward(existing),
                    None => {
                        self.intern(constant, Some(id));
                    }
                }
                progress = true;
            }
            if !progress {
                break;
            }
        }
        self.entries
            .iter()
            .filter(|e| e.state == State::Held && !matches!(e.constant, Constant::UnresolvedName(_)))
            .count()
    }

    /// Interned constants are shared by every structure that registered an
    /// equal value, so none of them may change in place.
    pub fn mark_modified(&self, id: ConstId) -> Result<(), PoolError> {
        if self.is_interned(id) {
            return Err(PoolError::Frozen(self.describe(id)));
        }
        Ok(())
    }

    /// Copy the constant graph rooted at `id` in `other` into this pool.
    pub fn adopt(&mut self, other: &ConstantPool, id: ConstId) -> ConstId {
        let constant = other.get(id);
        let copied = constant.map_children(|child| self.adopt(other, child));
        self.register(copied)
    }

    /// The total order used to lay out the serialized table: format first,
    /// then format-specific details.
    pub fn compare(&self, a: ConstId, b: ConstId) -> Ordering {
        let (a, b) = (self.resolve(a), self.resolve(b));
        if a == b {
            return Ordering::Equal;
        }
        let (ca, cb) = (self.get(a), self.get(b));
        ca.format()
            .cmp(&cb.format())
            .then_with(|| self.compare_details(ca, cb))
    }

    fn compare_seq(&self, a: &[ConstId], b: &[ConstId]) -> Ordering {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| self.compare(x, y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len()))
    }

    fn compare_details(&self, a: &Constant, b: &Constant) -> Ordering {
        use Constant::*;
        match (a, b) {
            (Int64(x), Int64(y)) => x.cmp(y),
            (UInt8(x), UInt8(y)) => x.cmp(y),
            (Float32(x), Float32(y)) => f32::from_bits(*x).total_cmp(&f32::from_bits(*y)),
            (Float64(x), Float64(y)) => f64::from_bits(*x).total_cmp(&f64::from_bits(*y)),
            (Char(x), Char(y)) => x.cmp(y),
            (String(x), String(y))
            | (Module(x), Module(y))
            | (UnresolvedName(x), UnresolvedName(y))
            | (ConditionNamed(x), ConditionNamed(y)) => x.cmp(y),
            (Version(x), Version(y)) => x.cmp(y),
            (Array(x), Array(y)) | (ConditionAll(x), ConditionAll(y)) | (ConditionAny(x), ConditionAny(y)) => {
                self.compare_seq(x, y)
            }
            (
                Method {
                    parent: p1,
                    name: n1,
                    params: a1,
                    returns: r1,
                },
                Method {
                    parent: p2,
                    name: n2,
                    params: a2,
                    returns: r2,
                },
            ) => self
                .compare(*p1, *p2)
                .then_with(|| n1.cmp(n2))
                .then_with(|| self.compare_seq(a1, a2))
                .then_with(|| self.compare_seq(r1, r2)),
            (Annotation { class: c1, params: a1 }, Annotation { class: c2, params: a2 }) => {
                self.compare(*c1, *c2).then_with(|| self.compare_seq(a1, a2))
            }
            (AnnotatedType { annotation: a1, ty: t1 }, AnnotatedType { annotation: a2, ty: t2 }) => {
                self.compare(*a1, *a2).then_with(|| self.compare(*t1, *t2))
            }
            (
                ConditionVersionMatches { module: m1, version: v1 },
                ConditionVersionMatches { module: m2, version: v2 },
            ) => self.compare(*m1, *m2).then_with(|| self.compare(*v1, *v2)),
            (TerminalType(x), TerminalType(y))
            | (ConditionNot(x), ConditionNot(y))
            | (ConditionPresent(x), ConditionPresent(y))
            | (ConditionVersioned(x), ConditionVersioned(y)) => self.compare(*x, *y),
            _ => match (a.parent(), b.parent()) {
                (Some(p1), Some(p2)) => self.compare(p1, p2).then_with(|| a.name().cmp(&b.name())),
                _ => Ordering::Equal,
            },
        }
    }

    /// Dotted path of an identity constant, e.g. `net.example:collections.List`.
    pub fn qualified_name(&self, id: ConstId) -> String {
        let constant = self.get(id);
        match (constant.parent(), constant.name()) {
            (Some(parent), Some(name)) => {
                let prefix = self.qualified_name(parent);
                let sep = if self.format(parent) == Format::Module { ':' } else { '.' };
                format!("{prefix}{sep}{name}")
            }
            (None, Some(name)) => name.to_string(),
            _ => self.describe(id),
        }
    }

    /// Human-readable rendering for diagnostics.
    pub fn describe(&self, id: ConstId) -> String {
        let join = |ids: &[ConstId], sep: &str| {
            ids.iter()
                .map(|&c| self.describe(c))
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self.get(id) {
            Constant::Int64(v) => v.to_string(),
            Constant::UInt8(v) => v.to_string(),
            Constant::Float32(bits) => f32::from_bits(*bits).to_string(),
            Constant::Float64(bits) => f64::from_bits(*bits).to_string(),
            Constant::Char(ch) => format!("{ch:?}"),
            Constant::String(s) => format!("{s:?}"),
            Constant::Version(ver) => ver.to_string(),
            Constant::Array(ids) => format!("[{}]", join(ids, ", ")),
            Constant::Method {
                params, returns, ..
            } => format!(
                "{}({}) -> ({})",
                self.qualified_name(id),
                join(params, ", "),
                join(returns, ", ")
            ),
            Constant::Module(_)
            | Constant::Package { .. }
            | Constant::Class { .. }
            | Constant::Typedef { .. }
            | Constant::Property { .. }
            | Constant::MultiMethod { .. } => self.qualified_name(id),
            Constant::Annotation { class, params } if params.is_empty() => {
                format!("@{}", self.describe(*class))
            }
            Constant::Annotation { class, params } => {
                format!("@{}({})", self.describe(*class), join(params, ", "))
            }
            Constant::UnresolvedName(name) => format!("{name}?"),
            Constant::TerminalType(id) => self.describe(*id),
            Constant::AnnotatedType { annotation, ty } => {
                format!("{} {}", self.describe(*annotation), self.describe(*ty))
            }
            Constant::ConditionNot(id) => format!("!{}", self.describe(*id)),
            Constant::ConditionAll(ids) => format!("({})", join(ids, " && ")),
            Constant::ConditionAny(ids) => format!("({})", join(ids, " || ")),
            Constant::ConditionNamed(name) => format!("defined({name})"),
            Constant::ConditionPresent(id) => format!("present({})", self.describe(*id)),
            Constant::ConditionVersionMatches { module, version } => format!(
                "{}.version.isSubstitutableFor({})",
                self.describe(*module),
                self.describe(*version)
            ),
            Constant::ConditionVersioned(version) => {
                format!("version({})", self.describe(*version))
            }
        }
    }

    fn ensure_by_locator(&mut self, constant: Constant) -> ConstId {
        let found = constant
            .locator()
            .and_then(|locator| self.find(constant.format(), &locator));
        match found {
            Some(id) => id,
            None => self.register(constant),
        }
    }

    pub fn ensure_int(&mut self, value: i64) -> ConstId {
        self.ensure_by_locator(Constant::Int64(value))
    }

    pub fn ensure_byte(&mut self, value: u8) -> ConstId {
        self.ensure_by_locator(Constant::UInt8(value))
    }

    pub fn ensure_float32(&mut self, value: f32) -> ConstId {
        self.ensure_by_locator(Constant::float32(value))
    }

    pub fn ensure_float64(&mut self, value: f64) -> ConstId {
        self.ensure_by_locator(Constant::float64(value))
    }

    pub fn ensure_char(&mut self, value: char) -> ConstId {
        self.ensure_by_locator(Constant::Char(value))
    }

    pub fn ensure_string(&mut self, value: &str) -> ConstId {
        self.ensure_by_locator(Constant::String(value.to_string()))
    }

    pub fn ensure_version(&mut self, version: &Version) -> ConstId {
        self.ensure_by_locator(Constant::Version(version.clone()))
    }

    pub fn ensure_array(&mut self, values: Vec<ConstId>) -> ConstId {
        self.register(Constant::Array(values))
    }

    pub fn ensure_module(&mut self, name: &str) -> ConstId {
        self.ensure_by_locator(Constant::Module(name.to_string()))
    }

    pub fn ensure_package(&mut self, parent: ConstId, name: &str) -> ConstId {
        self.register(Constant::Package {
            parent,
            name: name.to_string(),
        })
    }

    pub fn ensure_class(&mut self, parent: ConstId, name: &str) -> ConstId {
        self.register(Constant::Class {
            parent,
            name: name.to_string(),
        })
    }

    pub fn ensure_typedef(&mut self, parent: ConstId, name: &str) -> ConstId {
        self.register(Constant::Typedef {
            parent,
            name: name.to_string(),
        })
    }

    pub fn ensure_property(&mut self, parent: ConstId, name: &str) -> ConstId {
        self.register(Constant::Property {
            parent,
            name: name.to_string(),
        })
    }

    pub fn ensure_multi_method(&mut self, parent: ConstId, name: &str) -> ConstId {
        self.register(Constant::MultiMethod {
            parent,
            name: name.to_string(),
        })
    }

    pub fn ensure_method(
        &mut self,
        parent: ConstId,
        name: &str,
        params: Vec<ConstId>,
        returns: Vec<ConstId>,
    ) -> ConstId {
        self.register(Constant::Method {
            parent,
            name: name.to_string(),
            params,
            returns,
        })
    }

    pub fn ensure_annotation(&mut self, class: ConstId, params: Vec<ConstId>) -> ConstId {
        self.register(Constant::Annotation { class, params })
    }

    pub fn ensure_terminal_type(&mut self, identity: ConstId) -> ConstId {
        self.ensure_by_locator(Constant::TerminalType(identity))
    }

    pub fn ensure_annotated_type(&mut self, annotation: ConstId, ty: ConstId) -> ConstId {
        self.register(Constant::AnnotatedType { annotation, ty })
    }

    pub fn ensure_named_condition(&mut self, name: &str) -> ConstId {
        self.ensure_by_locator(Constant::ConditionNamed(name.to_string()))
    }

    pub fn ensure_present_condition(&mut self, identity: ConstId) -> ConstId {
        self.ensure_by_locator(Constant::ConditionPresent(identity))
    }

    pub fn ensure_version_matches_condition(&mut self, module: ConstId, version: &Version) -> ConstId {
        let version = self.ensure_version(version);
        self.register(Constant::ConditionVersionMatches { module, version })
    }

    pub fn ensure_versioned_condition(&mut self, version: &Version) -> ConstId {
        let version = self.ensure_version(version);
        self.ensure_by_locator(Constant::ConditionVersioned(version))
    }

    pub fn ensure_not_condition(&mut self, condition: ConstId) -> ConstId {
        self.ensure_by_locator(Constant::ConditionNot(condition))
    }

    pub fn ensure_all_condition(&mut self, conditions: Vec<ConstId>) -> ConstId {
        assert!(conditions.len() >= 2, "ALL needs at least two conditions");
        self.register(Constant::ConditionAll(conditions))
    }

    pub fn ensure_any_condition(&mut self, conditions: Vec<ConstId>) -> ConstId {
        assert!(conditions.len() >= 2, "ANY needs at least two conditions");
        self.register(Constant::ConditionAny(conditions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn interning_is_idempotent() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_string("hello");
        let b = pool.register(Constant::String("hello".into()));
        assert_eq!(a, b);
        assert_eq!(pool.register(pool.get(a).clone()), a);
        assert_ne!(pool.ensure_string("world"), a);
        assert_eq!(pool.find(Format::String, &Locator::Str("hello".into())), Some(a));
    }

    #[test]
    fn structural_interning() {
        let mut pool = ConstantPool::new();
        let module = pool.ensure_module("net.example");
        let class = pool.ensure_class(module, "Foo");
        let one = pool.ensure_int(1);
        let first = pool.ensure_annotation(class, vec![one]);
        let again = pool.ensure_class(module, "Foo");
        let one_again = pool.ensure_int(1);
        let second = pool.register(Constant::Annotation {
            class: again,
            params: vec![one_again],
        });
        assert_eq!(first, second);
        assert_eq!(pool.describe(first), "@net.example:Foo(1)");
    }

    #[test]
    fn all_condition_ignores_member_order() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_named_condition("a");
        let b = pool.ensure_named_condition("b");
        assert_eq!(pool.ensure_all_condition(vec![a, b]), pool.ensure_all_condition(vec![b, a]));
    }

    #[test]
    fn annotation_order_shorter_first() {
        let mut pool = ConstantPool::new();
        let module = pool.ensure_module("m");
        let foo = pool.ensure_class(module, "Foo");
        let (one, two, three) = (pool.ensure_int(1), pool.ensure_int(2), pool.ensure_int(3));
        let short = pool.ensure_annotation(foo, vec![one, two]);
        let long = pool.ensure_annotation(foo, vec![one, two, three]);
        let other = pool.ensure_annotation(foo, vec![two]);
        assert_eq!(pool.compare(short, long), Ordering::Less);
        assert_eq!(pool.compare(long, short), Ordering::Greater);
        assert_eq!(pool.compare(long, other), Ordering::Less);
        assert_eq!(pool.compare(short, short), Ordering::Equal);
    }

    #[test]
    fn compare_orders_by_format_first() {
        let mut pool = ConstantPool::new();
        let s = pool.ensure_string("a");
        let i = pool.ensure_int(99);
        let ver = pool.ensure_version(&v("1.0"));
        assert_eq!(pool.compare(i, s), Ordering::Less);
        assert_eq!(pool.compare(ver, s), Ordering::Greater);
    }

    #[test]
    fn unresolved_names_are_held() {
        let mut pool = ConstantPool::new();
        let module = pool.ensure_module("m");
        let name = pool.ensure_unresolved("Foo");
        let ty = pool.ensure_terminal_type(name);
        assert!(pool.contains_unresolved(ty));
        assert!(!pool.is_interned(ty));

        let class = pool.ensure_class(module, "Foo");
        let existing = pool.ensure_terminal_type(class);
        pool.resolve_placeholder(name, class).unwrap();
        assert!(!pool.contains_unresolved(ty));
        assert_eq!(pool.resolve_constants(), 0);
        assert_eq!(pool.resolve(ty), existing);
    }

    #[test]
    fn placeholder_rebinding_is_rejected() {
        let mut pool = ConstantPool::new();
        let module = pool.ensure_module("m");
        let name = pool.ensure_unresolved("Foo");
        let foo = pool.ensure_class(module, "Foo");
        let bar = pool.ensure_class(module, "Bar");
        pool.resolve_placeholder(name, foo).unwrap();
        pool.resolve_placeholder(name, foo).unwrap();
        assert!(matches!(
            pool.resolve_placeholder(name, bar),
            Err(PoolError::AlreadyResolved { .. })
        ));
        let other = pool.ensure_unresolved("Baz");
        assert!(matches!(
            pool.resolve_placeholder(other, other),
            Err(PoolError::SelfReference(_))
        ));
    }

    #[test]
    fn held_constant_chain_resolves() {
        let mut pool = ConstantPool::new();
        let module = pool.ensure_module("m");
        let name = pool.ensure_unresolved("List");
        let ty = pool.ensure_terminal_type(name);
        let ann = pool.ensure_annotation(name, vec![ty]);
        assert_eq!(pool.resolve_constants(), 2);

        let list = pool.ensure_class(module, "List");
        pool.resolve_placeholder(name, list).unwrap();
        assert_eq!(pool.resolve_constants(), 0);
        assert!(pool.is_interned(ann));
        let list_ty = pool.ensure_terminal_type(list);
        assert_eq!(pool.ensure_annotation(list, vec![list_ty]), pool.resolve(ann));
    }

    #[test]
    fn interned_constants_are_frozen() {
        let mut pool = ConstantPool::new();
        let module = pool.ensure_module("m");
        let class = pool.ensure_class(module, "C");
        let ann = pool.ensure_annotation(class, vec![]);
        assert!(matches!(pool.mark_modified(ann), Err(PoolError::Frozen(_))));
        let held = pool.ensure_unresolved("X");
        assert!(pool.mark_modified(held).is_ok());
    }

    #[test]
    fn adopt_copies_graph() {
        let mut source = ConstantPool::new();
        let module = source.ensure_module("m");
        let class = source.ensure_class(module, "C");
        let ann = source.ensure_annotation(class, vec![]);

        let mut target = ConstantPool::new();
        target.ensure_string("padding");
        let copied = target.adopt(&source, ann);
        assert_eq!(target.describe(copied), "@m:C");
        assert_eq!(target.adopt(&source, ann), copied);
    }
}
