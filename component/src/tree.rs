use std::collections::BTreeMap;
use std::slice;

use log::trace;
use pool::{ConstId, Constant, ConstantPool, Format, LinkerContext};

use crate::access::Access;

/// Index of a component in its [`ComponentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u32);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("{parent} already has a child named {name}")]
    DuplicateName { parent: String, name: String },
    #[error("a {child:?} cannot be declared inside a {parent:?}")]
    IllegalChild { parent: Format, child: Format },
}

/// Everything a parent holds under one name.
///
/// A `Composite` lists mutually exclusive variants; each variant carries its
/// own condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Children {
    Plain(ComponentId),
    Composite(Vec<ComponentId>),
}

impl Children {
    fn from_variants(mut variants: Vec<ComponentId>) -> Self {
        if variants.len() == 1 {
            Children::Plain(variants.remove(0))
        } else {
            Children::Composite(variants)
        }
    }

    pub fn variants(&self) -> &[ComponentId] {
        match self {
            Children::Plain(id) => slice::from_ref(id),
            Children::Composite(ids) => ids,
        }
    }
}

/// What a name denotes: one component, or the variants of a conditional one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentRef {
    Single(ComponentId),
    Composite(Vec<ComponentId>),
}

impl ComponentRef {
    pub fn from_variants(mut variants: Vec<ComponentId>) -> Self {
        assert!(!variants.is_empty(), "a component reference needs at least one variant");
        if variants.len() == 1 {
            ComponentRef::Single(variants.remove(0))
        } else {
            ComponentRef::Composite(variants)
        }
    }

    pub fn variants(&self) -> &[ComponentId] {
        match self {
            ComponentRef::Single(id) => slice::from_ref(id),
            ComponentRef::Composite(ids) => ids,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, ComponentRef::Composite(_))
    }
}

/// State of a package that stands in for an imported module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Import {
    /// The imported module has not been linked yet.
    Pending,
    Linked(ComponentId),
}

#[derive(Debug, Clone)]
pub struct Component {
    identity: ConstId,
    format: Format,
    name: String,
    access: Access,
    parent: Option<ComponentId>,
    condition: Option<ConstId>,
    children: BTreeMap<String, Children>,
    import: Option<Import>,
}

impl Component {
    pub fn identity(&self) -> ConstId {
        self.identity
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    /// The conjunction of every condition added to this component.
    pub fn condition(&self) -> Option<ConstId> {
        self.condition
    }

    pub fn import(&self) -> Option<Import> {
        self.import
    }

    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }
}

fn allows_child(parent: Format, child: Format) -> bool {
    use Format::*;
    match parent {
        Module | Package => matches!(child, Package | Class | Typedef | Property | MultiMethod),
        Class => matches!(child, Class | Typedef | Property | MultiMethod),
        Property => matches!(child, Class | Property | MultiMethod),
        MultiMethod => child == Method,
        Method => matches!(child, Class | Property | MultiMethod),
        _ => false,
    }
}

/// The namespace of one or more modules.
///
/// Components live in an arena and refer to each other by [`ComponentId`];
/// a component's parent link never owns anything.
#[derive(Debug, Clone, Default)]
pub struct ComponentTree {
    nodes: Vec<Component>,
    roots: Vec<ComponentId>,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[ComponentId] {
        &self.roots
    }

    pub fn get(&self, id: ComponentId) -> &Component {
        &self.nodes[id.index()]
    }

    fn push(&mut self, component: Component) -> ComponentId {
        let id = ComponentId(self.nodes.len() as u32);
        self.nodes.push(component);
        id
    }

    pub fn add_module(&mut self, pool: &mut ConstantPool, name: &str) -> ComponentId {
        let identity = pool.ensure_module(name);
        let id = self.push(Component {
            identity,
            format: Format::Module,
            name: name.to_string(),
            access: Access::Public,
            parent: None,
            condition: None,
            children: BTreeMap::new(),
            import: None,
        });
        self.roots.push(id);
        id
    }

    /// Declare a named child.
    ///
    /// A second child with the same name is only accepted when both it and
    /// every existing child of that name are conditional; the name then
    /// denotes a composite.
    pub fn add_child(
        &mut self,
        pool: &mut ConstantPool,
        parent: ComponentId,
        format: Format,
        name: &str,
        access: Access,
        condition: Option<ConstId>,
    ) -> Result<ComponentId, ComponentError> {
        let parent_format = self.get(parent).format;
        if format == Format::Method || !allows_child(parent_format, format) {
            return Err(ComponentError::IllegalChild {
                parent: parent_format,
                child: format,
            });
        }

        let scope = self.get(parent).identity;
        let identity = match format {
            Format::Package => pool.ensure_package(scope, name),
            Format::Class => pool.ensure_class(scope, name),
            Format::Typedef => pool.ensure_typedef(scope, name),
            Format::Property => pool.ensure_property(scope, name),
            _ => pool.ensure_multi_method(scope, name),
        };
        self.insert(pool, parent, identity, format, name, access, condition)
    }

    /// Declare a package that will stand in for an imported module.
    pub fn add_import(
        &mut self,
        pool: &mut ConstantPool,
        parent: ComponentId,
        name: &str,
        access: Access,
    ) -> Result<ComponentId, ComponentError> {
        let id = self.add_child(pool, parent, Format::Package, name, access, None)?;
        self.nodes[id.index()].import = Some(Import::Pending);
        Ok(id)
    }

    /// Point an import package at the root of the module it imports. From
    /// then on, names are resolved in the module instead of the package.
    pub fn link_module(&mut self, package: ComponentId, module: ComponentId) {
        assert_eq!(self.get(package).format, Format::Package, "only a package can import a module");
        assert_eq!(self.get(module).format, Format::Module, "only a module can be imported");
        self.nodes[package.index()].import = Some(Import::Linked(module));
    }

    /// Declare a method, creating the multi-method that groups every method
    /// of that name if needed. Methods are keyed by signature.
    pub fn add_method(
        &mut self,
        pool: &mut ConstantPool,
        parent: ComponentId,
        name: &str,
        params: Vec<ConstId>,
        returns: Vec<ConstId>,
        access: Access,
    ) -> Result<ComponentId, ComponentError> {
        let multi = match self.get(parent).children.get(name).map(Children::variants) {
            Some(&[only]) if self.get(only).format == Format::MultiMethod => only,
            _ => self.add_child(pool, parent, Format::MultiMethod, name, Access::Public, None)?,
        };
        let scope = self.get(multi).identity;
        let identity = pool.ensure_method(scope, name, params, returns);
        let signature = pool.describe(identity);
        self.insert(pool, multi, identity, Format::Method, &signature, access, None)
    }

    #[allow(clippy::too_many_arguments)]
    fn insert(
        &mut self,
        pool: &mut ConstantPool,
        parent: ComponentId,
        identity: ConstId,
        format: Format,
        name: &str,
        access: Access,
        condition: Option<ConstId>,
    ) -> Result<ComponentId, ComponentError> {
        if let Some(existing) = self.get(parent).children.get(name) {
            let clash = condition.is_none()
                || existing
                    .variants()
                    .iter()
                    .any(|&v| self.get(v).condition.is_none());
            if clash {
                return Err(ComponentError::DuplicateName {
                    parent: self.path(pool, parent),
                    name: name.to_string(),
                });
            }
        }

        let id = self.push(Component {
            identity,
            format,
            name: name.to_string(),
            access,
            parent: Some(parent),
            condition: None,
            children: BTreeMap::new(),
            import: None,
        });
        if let Some(condition) = condition {
            self.add_condition(pool, id, condition);
        }
        self.link(parent, name, id);
        trace!("declared {:?} {}", format, pool.describe(identity));
        Ok(id)
    }

    fn link(&mut self, parent: ComponentId, name: &str, child: ComponentId) {
        let children = &mut self.nodes[parent.index()].children;
        match children.remove(name) {
            None => {
                children.insert(name.to_string(), Children::Plain(child));
            }
            Some(existing) => {
                let mut variants = existing.variants().to_vec();
                variants.push(child);
                children.insert(name.to_string(), Children::from_variants(variants));
            }
        }
    }

    /// Require `condition` in addition to whatever the component already
    /// requires.
    ///
    /// # Panics
    ///
    /// If the combined condition can never hold.
    pub fn add_condition(&mut self, pool: &mut ConstantPool, id: ComponentId, condition: ConstId) {
        let combined = match self.get(id).condition {
            None => pool.resolve(condition),
            Some(existing) => pool.add_and(existing, condition),
        };
        assert!(
            pool.is_satisfiable(combined),
            "{} can never exist under {}",
            self.path(pool, id),
            pool.describe(combined)
        );
        self.nodes[id.index()].condition = Some(combined);
    }

    /// The component's and-condition as a list of required conditions.
    pub fn conditions(&self, pool: &ConstantPool, id: ComponentId) -> Vec<ConstId> {
        match self.get(id).condition {
            None => Vec::new(),
            Some(cond) => match pool.get(cond) {
                Constant::ConditionAll(ids) => ids.clone(),
                _ => vec![cond],
            },
        }
    }

    /// Whether the component and all of its ancestors exist in `ctx`.
    pub fn is_present(&self, pool: &ConstantPool, id: ComponentId, ctx: &dyn LinkerContext) -> bool {
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.get(id);
            if let Some(cond) = node.condition {
                if !pool.evaluate(cond, ctx) {
                    return false;
                }
            }
            current = node.parent;
        }
        true
    }

    /// The variants of a named child that exist in `ctx`, or all of them
    /// when no context is given.
    ///
    /// Children are keyed by name alone; visibility is applied by
    /// [`resolve_name`](Self::resolve_name), which filters the variants by
    /// the requesting [`Access`].
    pub fn child_by_name(
        &self,
        pool: &ConstantPool,
        id: ComponentId,
        name: &str,
        ctx: Option<&dyn LinkerContext>,
    ) -> Option<ComponentRef> {
        let entry = self.get(id).children.get(name)?;
        let matches: Vec<ComponentId> = entry
            .variants()
            .iter()
            .copied()
            .filter(|&v| match ctx {
                Some(ctx) => self.is_present(pool, v, ctx),
                None => true,
            })
            .collect();
        if matches.is_empty() {
            None
        } else {
            Some(ComponentRef::from_variants(matches))
        }
    }

    pub fn children(&self, id: ComponentId) -> impl Iterator<Item = (&str, &Children)> {
        self.get(id)
            .children
            .iter()
            .map(|(name, kids)| (name.as_str(), kids))
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.get(id).parent
    }

    pub fn identity(&self, id: ComponentId) -> ConstId {
        self.get(id).identity
    }

    pub fn path(&self, pool: &ConstantPool, id: ComponentId) -> String {
        pool.qualified_name(self.get(id).identity)
    }

    /// Copy a component and everything under it, and register the copy as
    /// another variant of the same name.
    pub(crate) fn clone_sibling(&mut self, id: ComponentId) -> ComponentId {
        let parent = self.get(id).parent;
        let copy = self.deep_copy(id, parent);
        match parent {
            Some(parent) => {
                let name = self.get(id).name.clone();
                self.link(parent, &name, copy);
            }
            None => self.roots.push(copy),
        }
        copy
    }

    fn deep_copy(&mut self, id: ComponentId, parent: Option<ComponentId>) -> ComponentId {
        let mut node = self.get(id).clone();
        node.parent = parent;
        let kids = std::mem::take(&mut node.children);
        let copy = self.push(node);

        let mut children = BTreeMap::new();
        for (name, entry) in kids {
            let variants = entry
                .variants()
                .iter()
                .map(|&v| self.deep_copy(v, Some(copy)))
                .collect();
            children.insert(name, Children::from_variants(variants));
        }
        self.nodes[copy.index()].children = children;
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Defined(&'static [&'static str]);

    impl LinkerContext for Defined {
        fn is_specified(&self, name: &str) -> bool {
            self.0.contains(&name)
        }

        fn is_present(&self, _qualified_name: &str) -> bool {
            false
        }

        fn is_version_match(&self, _module: &str, _version: &version::Version) -> bool {
            false
        }

        fn is_version(&self, _version: &version::Version) -> bool {
            false
        }
    }

    fn setup() -> (ConstantPool, ComponentTree, ComponentId) {
        let mut pool = ConstantPool::new();
        let mut tree = ComponentTree::new();
        let module = tree.add_module(&mut pool, "net.example");
        (pool, tree, module)
    }

    #[test]
    fn nested_declarations() {
        let (mut pool, mut tree, module) = setup();
        let pkg = tree
            .add_child(&mut pool, module, Format::Package, "collections", Access::Public, None)
            .unwrap();
        let list = tree
            .add_child(&mut pool, pkg, Format::Class, "List", Access::Public, None)
            .unwrap();
        assert_eq!(tree.path(&pool, list), "net.example:collections.List");
        assert_eq!(tree.parent(list), Some(pkg));
        assert_eq!(tree.child_by_name(&pool, pkg, "List", None), Some(ComponentRef::Single(list)));
        assert_eq!(tree.child_by_name(&pool, pkg, "Map", None), None);
        assert_eq!(tree.get(pkg).child_names().collect::<Vec<_>>(), ["List"]);
    }

    #[test]
    fn duplicates_need_conditions() {
        let (mut pool, mut tree, module) = setup();
        tree.add_child(&mut pool, module, Format::Class, "C", Access::Public, None)
            .unwrap();
        let again = tree.add_child(&mut pool, module, Format::Class, "C", Access::Public, None);
        assert!(matches!(again, Err(ComponentError::DuplicateName { .. })));

        let debug = pool.ensure_named_condition("debug");
        let release = pool.negate(debug);
        let a = tree
            .add_child(&mut pool, module, Format::Class, "D", Access::Public, Some(debug))
            .unwrap();
        let b = tree
            .add_child(&mut pool, module, Format::Class, "D", Access::Public, Some(release))
            .unwrap();
        let (_, kids) = tree.children(module).find(|(name, _)| *name == "D").unwrap();
        assert_eq!(kids, &Children::Composite(vec![a, b]));

        let ctx = Defined(&["debug"]);
        assert_eq!(
            tree.child_by_name(&pool, module, "D", Some(&ctx)),
            Some(ComponentRef::Single(a))
        );
        assert_eq!(
            tree.child_by_name(&pool, module, "D", None),
            Some(ComponentRef::Composite(vec![a, b]))
        );
    }

    #[test]
    fn illegal_children() {
        let (mut pool, mut tree, module) = setup();
        let class = tree
            .add_child(&mut pool, module, Format::Class, "C", Access::Public, None)
            .unwrap();
        assert!(matches!(
            tree.add_child(&mut pool, class, Format::Package, "p", Access::Public, None),
            Err(ComponentError::IllegalChild { .. })
        ));
        assert!(matches!(
            tree.add_child(&mut pool, class, Format::Method, "m", Access::Public, None),
            Err(ComponentError::IllegalChild { .. })
        ));
    }

    #[test]
    fn methods_group_by_name() {
        let (mut pool, mut tree, module) = setup();
        let class = tree
            .add_child(&mut pool, module, Format::Class, "C", Access::Public, None)
            .unwrap();
        let scope = tree.identity(module);
        let int = pool.ensure_class(scope, "Int");
        let first = tree
            .add_method(&mut pool, class, "run", vec![], vec![], Access::Public)
            .unwrap();
        let second = tree
            .add_method(&mut pool, class, "run", vec![int], vec![], Access::Public)
            .unwrap();
        assert_eq!(tree.parent(first), tree.parent(second));
        let multi = tree.parent(first).unwrap();
        assert_eq!(tree.get(multi).format(), Format::MultiMethod);
        assert_eq!(tree.children(multi).count(), 2);
        assert!(tree
            .add_method(&mut pool, class, "run", vec![], vec![], Access::Public)
            .is_err());
    }

    #[test]
    fn and_conditions_accumulate() {
        let (mut pool, mut tree, module) = setup();
        let class = tree
            .add_child(&mut pool, module, Format::Class, "C", Access::Public, None)
            .unwrap();
        let a = pool.ensure_named_condition("a");
        let b = pool.ensure_named_condition("b");
        tree.add_condition(&mut pool, class, a);
        tree.add_condition(&mut pool, class, b);
        let mut conds = tree.conditions(&pool, class);
        conds.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(conds, expected);

        assert!(tree.is_present(&pool, class, &Defined(&["a", "b"])));
        assert!(!tree.is_present(&pool, class, &Defined(&["a"])));
    }

    #[test]
    #[should_panic(expected = "can never exist")]
    fn contradictory_conditions_panic() {
        let (mut pool, mut tree, module) = setup();
        let class = tree
            .add_child(&mut pool, module, Format::Class, "C", Access::Public, None)
            .unwrap();
        let a = pool.ensure_named_condition("a");
        let not_a = pool.negate(a);
        tree.add_condition(&mut pool, class, a);
        tree.add_condition(&mut pool, class, not_a);
    }

    #[test]
    fn clones_share_nothing() {
        let (mut pool, mut tree, module) = setup();
        let class = tree
            .add_child(&mut pool, module, Format::Class, "C", Access::Public, None)
            .unwrap();
        let prop = tree
            .add_child(&mut pool, class, Format::Property, "size", Access::Public, None)
            .unwrap();
        let twin = tree.clone_sibling(class);
        assert_ne!(twin, class);
        let Some(ComponentRef::Single(twin_prop)) = tree.child_by_name(&pool, twin, "size", None) else {
            panic!("clone lost its property");
        };
        assert_ne!(twin_prop, prop);
        assert_eq!(tree.parent(twin_prop), Some(twin));
        assert_eq!(tree.identity(twin_prop), tree.identity(prop));
        assert_eq!(
            tree.child_by_name(&pool, module, "C", None),
            Some(ComponentRef::Composite(vec![class, twin]))
        );
    }
}
