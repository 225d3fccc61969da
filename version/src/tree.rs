use core::fmt;

use crate::version::Version;

/// A map from [`Version`] to `V`, stored as a trie keyed by version parts.
///
/// Children are kept sorted by part value, so pre-release parts (which are
/// negative) sort before `0` and iteration yields a version before any of
/// its extensions: `1.0`, `2.0`, `2.1`, `2.2`, `2.2.0.1`, `3.0`.
#[derive(Clone)]
pub struct VersionTree<V> {
    root: Node<V>,
}

#[derive(Clone)]
struct Node<V> {
    part: i32,
    kids: Vec<Node<V>>,
    entry: Option<(Version, V)>,
}

impl<V> Node<V> {
    fn new(part: i32) -> Self {
        Self {
            part,
            kids: Vec::new(),
            entry: None,
        }
    }

    fn is_present(&self) -> bool {
        self.entry.is_some()
    }

    fn version(&self) -> Option<&Version> {
        self.entry.as_ref().map(|(ver, _)| ver)
    }

    fn is_ga(&self) -> bool {
        self.version().is_some_and(Version::is_ga_release)
    }

    fn is_empty(&self) -> bool {
        self.entry.is_none() && self.kids.is_empty()
    }

    fn child(&self, part: i32) -> Option<&Node<V>> {
        self.kids.iter().find(|kid| kid.part == part)
    }

    fn ensure_child(&mut self, part: i32) -> &mut Node<V> {
        let index = match self.kids.binary_search_by_key(&part, |kid| kid.part) {
            Ok(index) => index,
            Err(index) => {
                self.kids.insert(index, Node::new(part));
                index
            }
        };
        &mut self.kids[index]
    }

    fn remove(&mut self, parts: &[i32]) -> Option<V> {
        match parts.split_first() {
            None => self.entry.take().map(|(_, value)| value),
            Some((&part, rest)) => {
                let index = self.kids.iter().position(|kid| kid.part == part)?;
                let removed = self.kids[index].remove(rest);
                if self.kids[index].is_empty() {
                    self.kids.remove(index);
                }
                removed
            }
        }
    }

    fn find_closest(&self, ver: &Version, index: usize) -> Option<&Node<V>> {
        let part = ver.part(index);
        let fallback = (self.is_present() && part >= 0).then_some(self);
        self.child(part)
            .and_then(|kid| kid.find_closest(ver, index + 1))
            .or_else(|| {
                self.kids
                    .iter()
                    .rev()
                    .find(|kid| kid.part < part && kid.is_present())
            })
            .or(fallback)
    }

    /// The highest version at or below this node, preferring GA releases.
    fn find_highest(&self) -> Option<&Node<V>> {
        let best = self
            .kids
            .iter()
            .rev()
            .filter_map(Node::find_highest)
            .reduce(|first, next| {
                if first.is_ga() || !next.is_ga() {
                    first
                } else {
                    next
                }
            });
        match best {
            Some(node) if node.is_ga() => Some(node),
            _ if self.is_present() && (best.is_none() || self.is_ga()) => Some(self),
            _ => best,
        }
    }

    fn find_highest_for(&self, ver: &Version, index: usize) -> Option<&Node<V>> {
        let parts = ver.parts();
        let count = parts.len();
        let pre_release = parts[count - 1] < 0 || (count >= 2 && parts[count - 2] < 0);
        let mut matched = count as isize - 1;
        if pre_release {
            matched -= if parts[count - 1] < 0 { 1 } else { 2 };
        }

        if (index as isize) < matched {
            let part = parts[index];
            return self
                .child(part)
                .and_then(|kid| kid.find_highest_for(ver, index + 1))
                .or_else(|| {
                    let zero_tail = parts[index + 1..].iter().all(|&p| p == 0);
                    (part == 0 && self.is_present() && zero_tail).then_some(self)
                });
        }

        if index < count {
            let part = parts[index];
            let best = self
                .kids
                .iter()
                .rev()
                .take_while(|kid| kid.part >= part)
                .filter_map(|kid| {
                    if kid.part == part {
                        kid.find_highest_for(ver, index + 1)
                    } else {
                        kid.find_highest()
                    }
                })
                .reduce(|acc, node| {
                    if acc.is_ga() {
                        acc
                    } else if node.is_ga() {
                        node
                    } else {
                        let acc_cat = acc.version().map(Version::release_category);
                        let node_cat = node.version().map(Version::release_category);
                        match (node_cat, acc_cat) {
                            (Some(n), Some(a)) if n.is_more_stable_than(a) => node,
                            _ => acc,
                        }
                    }
                });
            return match best {
                Some(node) if node.is_ga() => Some(node),
                _ if self.is_present()
                    && (best.is_none() || self.is_ga())
                    && self.version().is_some_and(|v| v.is_substitutable_for(ver)) =>
                {
                    Some(self)
                }
                _ => best,
            };
        }

        self.find_highest()
    }

    fn copy_into(&self, tree: &mut VersionTree<V>)
    where
        V: Clone,
    {
        if let Some((ver, value)) = &self.entry {
            tree.insert(ver.clone(), value.clone());
        }
        for kid in &self.kids {
            kid.copy_into(tree);
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, first: &str, indent: &str) -> fmt::Result
    where
        V: fmt::Debug,
    {
        write!(f, "\n{first}{}", self.part)?;
        if let Some((ver, value)) = &self.entry {
            write!(f, ":  {ver}={value:?}")?;
        }
        render_kids(&self.kids, f, indent)
    }
}

fn render_kids<V: fmt::Debug>(kids: &[Node<V>], f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
    let next = format!("{indent}|- ");
    let middle = format!("{indent}|  ");
    let last = format!("{indent}   ");
    for (i, kid) in kids.iter().enumerate() {
        let kid_indent = if i + 1 == kids.len() { &last } else { &middle };
        kid.render(f, &next, kid_indent)?;
    }
    Ok(())
}

impl<V> VersionTree<V> {
    pub fn new() -> Self {
        Self { root: Node::new(0) }
    }

    pub fn is_empty(&self) -> bool {
        self.root.kids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Versions and values in trie order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            stack: vec![self.root.kids.iter()],
        }
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.iter().map(|(ver, _)| ver)
    }

    fn find_node(&self, ver: &Version) -> Option<&Node<V>> {
        ver.parts()
            .iter()
            .try_fold(&self.root, |node, &part| node.child(part))
    }

    pub fn contains(&self, ver: &Version) -> bool {
        self.find_node(ver).is_some_and(Node::is_present)
    }

    pub fn get(&self, ver: &Version) -> Option<&V> {
        self.find_node(ver)
            .and_then(|node| node.entry.as_ref())
            .map(|(_, value)| value)
    }

    /// Store `value` under `ver`, returning the value it replaced.
    pub fn insert(&mut self, ver: Version, value: V) -> Option<V> {
        let node = ver
            .parts()
            .iter()
            .fold(&mut self.root, |node, &part| node.ensure_child(part));
        node.entry.replace((ver, value)).map(|(_, old)| old)
    }

    /// Remove `ver`, pruning any branch left without versions.
    pub fn remove(&mut self, ver: &Version) -> Option<V> {
        self.root.remove(ver.parts())
    }

    pub fn clear(&mut self) {
        self.root = Node::new(0);
    }

    /// Copy of every entry at or under `prefix`.
    pub fn sub_tree(&self, prefix: &Version) -> VersionTree<V>
    where
        V: Clone,
    {
        let mut tree = VersionTree::new();
        if let Some(node) = self.find_node(prefix) {
            node.copy_into(&mut tree);
        }
        tree
    }

    pub fn extend_from(&mut self, other: &VersionTree<V>)
    where
        V: Clone,
    {
        for (ver, value) in other.iter() {
            self.insert(ver.clone(), value.clone());
        }
    }

    /// The version that best stands in for `ver` when walking down the trie:
    /// the deepest present version on `ver`'s path, or failing that the
    /// nearest lower sibling.
    pub fn find_closest_version(&self, ver: &Version) -> Option<&Version> {
        self.root.find_closest(ver, 0).and_then(Node::version)
    }

    pub fn find_lowest_version(&self) -> Option<&Version> {
        self.versions().next()
    }

    /// The highest version in the tree, preferring GA releases.
    pub fn find_highest_version(&self) -> Option<&Version> {
        self.root.find_highest().and_then(Node::version)
    }

    /// The highest version compatible with `ver`, preferring GA releases and
    /// then the most stable pre-release.
    pub fn find_highest_version_for(&self, ver: &Version) -> Option<&Version> {
        if ver.is_empty() {
            return None;
        }
        self.root.find_highest_for(ver, 0).and_then(Node::version)
    }

    /// The first version in iteration order that substitutes for `ver`.
    ///
    /// Iteration is pre-order, so a GA release is tried before its own
    /// pre-releases: with `2.1` and `2.1.beta` both present, `2.1` answers a
    /// request for `2.1.beta`.
    pub fn find_lowest_substitutable(&self, ver: &Version) -> Option<&Version> {
        self.versions().find(|v| v.is_substitutable_for(ver))
    }
}

impl<V> Default for VersionTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: PartialEq> PartialEq for VersionTree<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(ver, value)| other.get(ver) == Some(value))
    }
}

impl<V: fmt::Debug> fmt::Debug for VersionTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VersionTree")?;
        render_kids(&self.root.kids, f, "")
    }
}

impl<V> FromIterator<(Version, V)> for VersionTree<V> {
    fn from_iter<I: IntoIterator<Item = (Version, V)>>(iter: I) -> Self {
        let mut tree = VersionTree::new();
        for (ver, value) in iter {
            tree.insert(ver, value);
        }
        tree
    }
}

impl<'a, V> IntoIterator for &'a VersionTree<V> {
    type Item = (&'a Version, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Pre-order iterator over a [`VersionTree`].
pub struct Iter<'a, V> {
    stack: Vec<core::slice::Iter<'a, Node<V>>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a Version, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let level = self.stack.last_mut()?;
            match level.next() {
                Some(node) => {
                    self.stack.push(node.kids.iter());
                    if let Some((ver, value)) = &node.entry {
                        return Some((ver, value));
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
