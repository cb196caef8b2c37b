use std::cmp::Ordering;

use super::KeyMap;

type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug)]
struct RbNode<K, V> {
    key: K,
    value: V,
    color: Color,
    left: Option<NodeId>,
    right: Option<NodeId>,
    /// Lookup only; ownership runs root to leaves through the arena.
    parent: Option<NodeId>,
}

/// Red-black tree with nodes in an arena addressed by index.
///
/// Missing children are `None` and count as black.
#[derive(Debug)]
pub struct RbTree<K, V> {
    nodes: Vec<Option<RbNode<K, V>>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    len: usize,
}

impl<K: Ord, V> Default for RbTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> RbTree<K, V> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    fn node(&self, id: NodeId) -> &RbNode<K, V> {
        match &self.nodes[id] {
            Some(node) => node,
            None => unreachable!("released node {} still linked", id),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut RbNode<K, V> {
        match &mut self.nodes[id] {
            Some(node) => node,
            None => unreachable!("released node {} still linked", id),
        }
    }

    fn color(&self, id: Option<NodeId>) -> Color {
        id.map_or(Color::Black, |id| self.node(id).color)
    }

    fn set_color(&mut self, id: Option<NodeId>, color: Color) {
        if let Some(id) = id {
            self.node_mut(id).color = color;
        }
    }

    fn left(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).left
    }

    fn right(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).right
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    fn alloc(&mut self, node: RbNode<K, V>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn find(&self, key: &K) -> Option<NodeId> {
        let mut current = self.root;
        while let Some(id) = current {
            let node = self.node(id);
            current = match key.cmp(&node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(id),
            };
        }
        None
    }

    fn minimum(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.left(id) {
            id = left;
        }
        id
    }

    /// Points `parent`'s link that referred to `old` at `new`.
    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: Option<NodeId>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                if self.left(p) == Some(old) {
                    self.node_mut(p).left = new;
                } else {
                    self.node_mut(p).right = new;
                }
            }
        }
    }

    fn rotate_left(&mut self, x: NodeId) {
        let Some(y) = self.right(x) else { return };
        let y_left = self.left(y);
        self.node_mut(x).right = y_left;
        if let Some(b) = y_left {
            self.node_mut(b).parent = Some(x);
        }
        let x_parent = self.parent(x);
        self.node_mut(y).parent = x_parent;
        self.replace_child(x_parent, x, Some(y));
        self.node_mut(y).left = Some(x);
        self.node_mut(x).parent = Some(y);
    }

    fn rotate_right(&mut self, x: NodeId) {
        let Some(y) = self.left(x) else { return };
        let y_right = self.right(y);
        self.node_mut(x).left = y_right;
        if let Some(b) = y_right {
            self.node_mut(b).parent = Some(x);
        }
        let x_parent = self.parent(x);
        self.node_mut(y).parent = x_parent;
        self.replace_child(x_parent, x, Some(y));
        self.node_mut(y).right = Some(x);
        self.node_mut(x).parent = Some(y);
    }

    fn insert_fixup(&mut self, mut z: NodeId) {
        while let Some(p) = self.parent(z).filter(|&p| self.node(p).color == Color::Red) {
            // A red parent is never the root, so the grandparent exists.
            let Some(g) = self.parent(p) else { break };
            if Some(p) == self.left(g) {
                let uncle = self.right(g);
                if self.color(uncle) == Color::Red {
                    self.set_color(Some(p), Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(Some(g), Color::Red);
                    z = g;
                    continue;
                }
                if Some(z) == self.right(p) {
                    z = p;
                    self.rotate_left(z);
                }
                let p = self.parent(z).unwrap_or(p);
                self.set_color(Some(p), Color::Black);
                self.set_color(Some(g), Color::Red);
                self.rotate_right(g);
            } else {
                let uncle = self.left(g);
                if self.color(uncle) == Color::Red {
                    self.set_color(Some(p), Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(Some(g), Color::Red);
                    z = g;
                    continue;
                }
                if Some(z) == self.left(p) {
                    z = p;
                    self.rotate_right(z);
                }
                let p = self.parent(z).unwrap_or(p);
                self.set_color(Some(p), Color::Black);
                self.set_color(Some(g), Color::Red);
                self.rotate_left(g);
            }
        }
        self.set_color(self.root, Color::Black);
    }

    /// Puts `v` where `u` was in `u`'s parent.
    fn transplant(&mut self, u: NodeId, v: Option<NodeId>) {
        let u_parent = self.parent(u);
        self.replace_child(u_parent, u, v);
        if let Some(v) = v {
            self.node_mut(v).parent = u_parent;
        }
    }

    /// `x` may be a missing child, so its parent is tracked separately.
    fn delete_fixup(&mut self, mut x: Option<NodeId>, mut parent: Option<NodeId>) {
        while x != self.root && self.color(x) == Color::Black {
            let Some(p) = parent else { break };
            if x == self.left(p) {
                let mut w = self.right(p);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(Some(p), Color::Red);
                    self.rotate_left(p);
                    w = self.right(p);
                }
                let Some(s) = w else { break };
                if self.color(self.left(s)) == Color::Black && self.color(self.right(s)) == Color::Black
                {
                    self.set_color(Some(s), Color::Red);
                    x = Some(p);
                    parent = self.parent(p);
                } else {
                    if self.color(self.right(s)) == Color::Black {
                        self.set_color(self.left(s), Color::Black);
                        self.set_color(Some(s), Color::Red);
                        self.rotate_right(s);
                    }
                    let s = self.right(p).unwrap_or(s);
                    self.set_color(Some(s), self.color(Some(p)));
                    self.set_color(Some(p), Color::Black);
                    self.set_color(self.right(s), Color::Black);
                    self.rotate_left(p);
                    x = self.root;
                    parent = None;
                }
            } else {
                let mut w = self.left(p);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(Some(p), Color::Red);
                    self.rotate_right(p);
                    w = self.left(p);
                }
                let Some(s) = w else { break };
                if self.color(self.left(s)) == Color::Black && self.color(self.right(s)) == Color::Black
                {
                    self.set_color(Some(s), Color::Red);
                    x = Some(p);
                    parent = self.parent(p);
                } else {
                    if self.color(self.left(s)) == Color::Black {
                        self.set_color(self.right(s), Color::Black);
                        self.set_color(Some(s), Color::Red);
                        self.rotate_left(s);
                    }
                    let s = self.left(p).unwrap_or(s);
                    self.set_color(Some(s), self.color(Some(p)));
                    self.set_color(Some(p), Color::Black);
                    self.set_color(self.left(s), Color::Black);
                    self.rotate_right(p);
                    x = self.root;
                    parent = None;
                }
            }
        }
        self.set_color(x, Color::Black);
    }

    fn delete_node(&mut self, z: NodeId) -> Option<V> {
        let z_left = self.left(z);
        let z_right = self.right(z);
        let mut removed_color = self.node(z).color;
        let x;
        let x_parent;

        match (z_left, z_right) {
            (None, _) => {
                x = z_right;
                x_parent = self.parent(z);
                self.transplant(z, z_right);
            }
            (_, None) => {
                x = z_left;
                x_parent = self.parent(z);
                self.transplant(z, z_left);
            }
            (Some(zl), Some(zr)) => {
                let y = self.minimum(zr);
                removed_color = self.node(y).color;
                x = self.right(y);
                if self.parent(y) == Some(z) {
                    x_parent = Some(y);
                } else {
                    x_parent = self.parent(y);
                    self.transplant(y, x);
                    self.node_mut(y).right = Some(zr);
                    self.node_mut(zr).parent = Some(y);
                }
                self.transplant(z, Some(y));
                self.node_mut(y).left = Some(zl);
                self.node_mut(zl).parent = Some(y);
                let z_color = self.node(z).color;
                self.node_mut(y).color = z_color;
            }
        }

        if removed_color == Color::Black {
            self.delete_fixup(x, x_parent);
        }

        self.free.push(z);
        self.len -= 1;
        self.nodes[z].take().map(|node| node.value)
    }

    fn collect_range<'a>(
        &'a self,
        id: Option<NodeId>,
        lo: Option<&K>,
        hi: Option<&K>,
        out: &mut Vec<(&'a K, &'a V)>,
    ) {
        let Some(id) = id else { return };
        let node = self.node(id);
        let above_lo = lo.map_or(true, |lo| node.key >= *lo);
        let below_hi = hi.map_or(true, |hi| node.key <= *hi);

        if above_lo {
            self.collect_range(node.left, lo, hi, out);
        }
        if above_lo && below_hi {
            out.push((&node.key, &node.value));
        }
        if below_hi {
            self.collect_range(node.right, lo, hi, out);
        }
    }

    /// Black height, checking red-red edges and equal black counts on the way.
    #[cfg(test)]
    fn check(&self, id: Option<NodeId>) -> usize {
        let Some(id) = id else { return 1 };
        let node = self.node(id);
        if node.color == Color::Red {
            assert_eq!(self.color(node.left), Color::Black);
            assert_eq!(self.color(node.right), Color::Black);
        }
        for child in [node.left, node.right].into_iter().flatten() {
            assert_eq!(self.parent(child), Some(id));
        }
        let left = self.check(node.left);
        let right = self.check(node.right);
        assert_eq!(left, right);
        left + usize::from(node.color == Color::Black)
    }
}

impl<K, V> KeyMap<K, V> for RbTree<K, V>
where
    K: Ord + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|id| &self.node(id).value)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let id = self.find(key)?;
        Some(&mut self.node_mut(id).value)
    }

    fn insert(&mut self, key: K, value: V) {
        let mut parent = None;
        let mut current = self.root;
        let mut go_left = false;
        while let Some(id) = current {
            parent = Some(id);
            match key.cmp(&self.node(id).key) {
                Ordering::Less => {
                    go_left = true;
                    current = self.left(id);
                }
                Ordering::Greater => {
                    go_left = false;
                    current = self.right(id);
                }
                Ordering::Equal => {
                    self.node_mut(id).value = value;
                    return;
                }
            }
        }

        let z = self.alloc(RbNode {
            key,
            value,
            color: Color::Red,
            left: None,
            right: None,
            parent,
        });
        match parent {
            None => self.root = Some(z),
            Some(p) if go_left => self.node_mut(p).left = Some(z),
            Some(p) => self.node_mut(p).right = Some(z),
        }
        self.len += 1;
        self.insert_fixup(z);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let z = self.find(key)?;
        self.delete_node(z)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    fn range(&self, lo: Option<&K>, hi: Option<&K>) -> Vec<(&K, &V)> {
        let mut out = Vec::new();
        self.collect_range(self.root, lo, hi, &mut out);
        out
    }

    fn max_key(&self) -> Option<&K> {
        let mut id = self.root?;
        while let Some(right) = self.right(id) {
            id = right;
        }
        Some(&self.node(id).key)
    }

    fn is_ordered(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rb_tree_insert_balanced() {
        let mut tree = RbTree::new();
        for i in 0..1000u32 {
            tree.insert(i, i);
        }
        assert_eq!(tree.len(), 1000);
        assert_eq!(tree.color(tree.root), Color::Black);
        // 1000 sequential keys need a black height of at most ~10
        assert!(tree.check(tree.root) <= 11);
        assert_eq!(tree.max_key(), Some(&999));
    }

    #[test]
    fn test_rb_tree_remove_keeps_invariants() {
        let mut tree = RbTree::new();
        for i in 0..300u32 {
            tree.insert((i * 37) % 300, i);
        }
        for i in (0..300u32).step_by(2) {
            assert!(tree.remove(&i).is_some());
            tree.check(tree.root);
        }
        assert_eq!(tree.len(), 150);
        assert!(tree.remove(&0).is_none());

        let keys: Vec<u32> = tree.range(None, None).into_iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (1..300).step_by(2).collect::<Vec<_>>());
    }

    #[test]
    fn test_rb_tree_range() {
        let mut tree = RbTree::new();
        for k in [10u32, 20, 30, 40] {
            tree.insert(k, ());
        }
        let keys: Vec<u32> = tree
            .range(Some(&15), Some(&35))
            .into_iter()
            .map(|(k, _)| *k)
            .collect();
        assert_eq!(keys, vec![20, 30]);
    }
}
