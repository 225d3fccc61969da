use std::collections::HashMap;

use pool::{ConstId, ConstantPool};

/// Collects the constants an op stream uses and numbers them.
///
/// Registration counts how often each constant is used. The first lookup
/// freezes the table: the most used constants get the lowest indices (and
/// therefore the shortest encodings), ties broken by pool order.
#[derive(Debug, Clone, Default)]
pub struct ConstantRegistry {
    counts: HashMap<ConstId, usize>,
    order: Option<Vec<ConstId>>,
    index: HashMap<ConstId, usize>,
}

impl ConstantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// After the table was frozen, or if `id` still refers to an unresolved
    /// name.
    pub fn register(&mut self, pool: &ConstantPool, id: ConstId) -> ConstId {
        assert!(
            self.order.is_none(),
            "constants are no longer being registered"
        );
        assert!(
            !pool.contains_unresolved(id),
            "unresolved constant: {}",
            pool.describe(id)
        );
        let id = pool.resolve(id);
        *self.counts.entry(id).or_insert(0) += 1;
        id
    }

    pub fn count(&self, id: ConstId) -> usize {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    pub fn is_frozen(&self) -> bool {
        self.order.is_some()
    }

    pub fn freeze(&mut self, pool: &ConstantPool) {
        if self.order.is_some() {
            return;
        }
        let mut order: Vec<ConstId> = self.counts.keys().copied().collect();
        order.sort_by(|&a, &b| {
            self.counts[&b]
                .cmp(&self.counts[&a])
                .then_with(|| pool.compare(a, b))
        });
        self.index = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        self.order = Some(order);
    }

    /// The frozen constant table.
    pub fn constants(&self) -> &[ConstId] {
        self.order.as_deref().unwrap_or(&[])
    }

    /// # Panics
    ///
    /// Before [`freeze`](Self::freeze), or for a constant that was never
    /// registered.
    pub fn index_of(&self, pool: &ConstantPool, id: ConstId) -> usize {
        assert!(self.is_frozen(), "constant registry is not frozen");
        let id = pool.resolve(id);
        match self.index.get(&id) {
            Some(&i) => i,
            None => panic!("missing constant: {}", pool.describe(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_used_first() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_string("a");
        let b = pool.ensure_string("b");
        let one = pool.ensure_int(1);

        let mut reg = ConstantRegistry::new();
        reg.register(&pool, a);
        reg.register(&pool, one);
        reg.register(&pool, one);
        reg.register(&pool, b);
        assert_eq!(reg.count(one), 2);

        reg.freeze(&pool);
        assert_eq!(reg.index_of(&pool, one), 0);
        assert_eq!(reg.constants().len(), 3);
        let (ia, ib) = (reg.index_of(&pool, a), reg.index_of(&pool, b));
        assert_eq!(ia.cmp(&ib), pool.compare(a, b));
    }

    #[test]
    #[should_panic(expected = "no longer being registered")]
    fn register_after_freeze_panics() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_string("a");
        let mut reg = ConstantRegistry::new();
        reg.freeze(&pool);
        reg.register(&pool, a);
    }

    #[test]
    #[should_panic(expected = "unresolved constant")]
    fn unresolved_constants_are_refused() {
        let mut pool = ConstantPool::new();
        let name = pool.ensure_unresolved("Later");
        ConstantRegistry::new().register(&pool, name);
    }

    #[test]
    #[should_panic(expected = "missing constant")]
    fn unknown_constant_lookup_panics() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_string("a");
        let mut reg = ConstantRegistry::new();
        reg.freeze(&pool);
        reg.index_of(&pool, a);
    }
}
