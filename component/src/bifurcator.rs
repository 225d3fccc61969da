use std::collections::HashMap;

use log::debug;
use pool::{ConstId, ConstantPool};

use crate::tree::{ComponentId, ComponentRef, ComponentTree};

/// Splits one component into condition-guarded variants on demand.
///
/// Asking for the variants that exist under a condition splits every
/// variant that could go either way into a copy that requires the condition
/// and a copy that requires its negation. Answers are memoized per
/// condition and kept current as later requests split further.
#[derive(Debug, Clone)]
pub struct ComponentBifurcator {
    variants: Vec<ComponentId>,
    memo: HashMap<ConstId, Vec<ComponentId>>,
}

impl ComponentBifurcator {
    pub fn new(component: ComponentId) -> Self {
        Self {
            variants: vec![component],
            memo: HashMap::new(),
        }
    }

    /// Every variant created so far, the original first.
    pub fn variants(&self) -> &[ComponentId] {
        &self.variants
    }

    /// The variants that exist when `condition` holds; all of them for
    /// `None`.
    ///
    /// # Panics
    ///
    /// If no variant can exist under `condition`.
    pub fn collect_matching(
        &mut self,
        tree: &mut ComponentTree,
        pool: &mut ConstantPool,
        condition: Option<ConstId>,
    ) -> Vec<ComponentId> {
        let Some(condition) = condition else {
            return self.variants.clone();
        };
        let condition = pool.resolve(condition);
        if let Some(found) = self.memo.get(&condition) {
            return found.clone();
        }

        let mut matches = Vec::new();
        for variant in self.variants.clone() {
            let (with, without) = match tree.get(variant).condition() {
                None => (true, true),
                Some(existing) => {
                    let split = pool.bifurcate(condition, existing);
                    (split.true_possible, split.false_possible)
                }
            };
            match (with, without) {
                (true, true) => {
                    self.split(tree, pool, variant, condition);
                    matches.push(variant);
                }
                (true, false) => matches.push(variant),
                (false, true) => {}
                (false, false) => panic!(
                    "variant {} of {} can never exist",
                    variant.index(),
                    tree.path(pool, variant)
                ),
            }
        }

        assert!(
            !matches.is_empty(),
            "no variant of {} exists under {}",
            tree.path(pool, self.variants[0]),
            pool.describe(condition)
        );
        self.memo.insert(condition, matches.clone());
        matches
    }

    /// The component to use under `condition`.
    ///
    /// Without a condition this is the original component until it has been
    /// split, and a composite of every variant afterwards.
    pub fn get_component(
        &mut self,
        tree: &mut ComponentTree,
        pool: &mut ConstantPool,
        condition: Option<ConstId>,
    ) -> ComponentRef {
        ComponentRef::from_variants(self.collect_matching(tree, pool, condition))
    }

    fn split(&mut self, tree: &mut ComponentTree, pool: &mut ConstantPool, variant: ComponentId, condition: ConstId) {
        let twin = tree.clone_sibling(variant);
        let negated = pool.negate(condition);
        tree.add_condition(pool, variant, condition);
        tree.add_condition(pool, twin, negated);
        self.variants.push(twin);
        for found in self.memo.values_mut() {
            if found.contains(&variant) {
                found.push(twin);
            }
        }
        debug!(
            "split {} on {}",
            tree.path(pool, variant),
            pool.describe(condition)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Access;
    use pool::Format;
    use version::Version;

    fn setup() -> (ConstantPool, ComponentTree, ComponentId, ComponentId) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut pool = ConstantPool::new();
        let mut tree = ComponentTree::new();
        let module = tree.add_module(&mut pool, "app");
        let class = tree
            .add_child(&mut pool, module, Format::Class, "C", Access::Public, None)
            .unwrap();
        tree.add_child(&mut pool, class, Format::Property, "p", Access::Public, None)
            .unwrap();
        (pool, tree, module, class)
    }

    #[test]
    fn null_condition_returns_original_until_split() {
        let (mut pool, mut tree, _, class) = setup();
        let mut bif = ComponentBifurcator::new(class);
        assert_eq!(bif.get_component(&mut tree, &mut pool, None), ComponentRef::Single(class));

        let a = pool.ensure_named_condition("a");
        bif.get_component(&mut tree, &mut pool, Some(a));
        let all = bif.get_component(&mut tree, &mut pool, None);
        assert!(all.is_composite());
        assert_eq!(all.variants().len(), 2);
    }

    #[test]
    fn split_and_memoize() {
        let (mut pool, mut tree, module, class) = setup();
        let mut bif = ComponentBifurcator::new(class);
        let a = pool.ensure_named_condition("a");
        let b = pool.ensure_named_condition("b");

        let under_a = bif.collect_matching(&mut tree, &mut pool, Some(a));
        assert_eq!(under_a, [class]);
        assert_eq!(tree.get(class).condition(), Some(a));
        let twin = bif.variants()[1];
        let not_a = pool.negate(a);
        assert_eq!(tree.get(twin).condition(), Some(not_a));
        assert_eq!(bif.collect_matching(&mut tree, &mut pool, Some(a)), [class]);
        assert_eq!(bif.collect_matching(&mut tree, &mut pool, Some(not_a)), [twin]);

        let under_b = bif.collect_matching(&mut tree, &mut pool, Some(b));
        assert_eq!(under_b.len(), 2);
        assert_eq!(bif.variants().len(), 4);
        assert_eq!(bif.collect_matching(&mut tree, &mut pool, Some(a)).len(), 2);

        let siblings = tree.child_by_name(&pool, module, "C", None).unwrap();
        assert_eq!(siblings.variants().len(), 4);
        for &variant in bif.variants() {
            assert!(tree.child_by_name(&pool, variant, "p", None).is_some());
            let cond = tree.get(variant).condition().unwrap();
            assert!(pool.is_satisfiable(cond));
        }
    }

    #[test]
    fn implied_conditions_do_not_split() {
        let (mut pool, mut tree, _, class) = setup();
        let a = pool.ensure_named_condition("a");
        let b = pool.ensure_named_condition("b");
        let ab = pool.add_and(a, b);
        tree.add_condition(&mut pool, class, ab);

        let mut bif = ComponentBifurcator::new(class);
        assert_eq!(bif.collect_matching(&mut tree, &mut pool, Some(a)), [class]);
        assert_eq!(bif.variants(), [class]);
    }

    #[test]
    #[should_panic(expected = "no variant")]
    fn excluded_condition_panics() {
        let (mut pool, mut tree, _, class) = setup();
        let one = pool.ensure_versioned_condition(&"1".parse::<Version>().unwrap());
        let two = pool.ensure_versioned_condition(&"2".parse::<Version>().unwrap());
        tree.add_condition(&mut pool, class, one);

        let mut bif = ComponentBifurcator::new(class);
        bif.collect_matching(&mut tree, &mut pool, Some(two));
    }
}
