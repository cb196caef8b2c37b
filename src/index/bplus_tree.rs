use std::mem;

use super::KeyMap;

type NodeId = usize;

#[derive(Debug)]
enum Node<K, V> {
    Leaf {
        keys: Vec<K>,
        values: Vec<V>,
        next: Option<NodeId>,
    },
    Internal {
        keys: Vec<K>,
        children: Vec<NodeId>,
    },
}

impl<K, V> Node<K, V> {
    fn empty_leaf() -> Self {
        Node::Leaf {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }

    fn keys(&self) -> &[K] {
        match self {
            Node::Leaf { keys, .. } | Node::Internal { keys, .. } => keys,
        }
    }
}

/// Result of inserting into a subtree that had to split: the separator key
/// and the new right sibling.
type Split<K> = Option<(K, NodeId)>;

/// In-memory B+ tree.
///
/// Nodes live in an arena and refer to each other by index. Internal node
/// `keys[i]` separates `children[i]` (keys below it) from `children[i + 1]`
/// (keys at or above it). Leaves are chained left to right for range scans.
///
/// A node splits once it holds more than `order` keys and is rebalanced when
/// a removal leaves it with fewer than `order / 2`: first by borrowing from
/// a sibling, otherwise by merging with one.
#[derive(Debug)]
pub struct BPlusTree<K, V> {
    nodes: Vec<Node<K, V>>,
    free: Vec<NodeId>,
    root: NodeId,
    order: usize,
    len: usize,
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    pub fn new(order: usize) -> Self {
        Self {
            nodes: vec![Node::empty_leaf()],
            free: Vec::new(),
            root: 0,
            order: order.max(3),
            len: 0,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    fn min_keys(&self) -> usize {
        self.order / 2
    }

    /// Height of the tree, 1 for a lone leaf.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = self.root;
        while let Node::Internal { children, .. } = &self.nodes[id] {
            id = children[0];
            height += 1;
        }
        height
    }

    fn alloc(&mut self, node: Node<K, V>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = Node::empty_leaf();
        self.free.push(id);
    }

    fn child_index(keys: &[K], key: &K) -> usize {
        keys.partition_point(|k| k <= key)
    }

    fn find_leaf(&self, key: &K) -> NodeId {
        let mut id = self.root;
        while let Node::Internal { keys, children } = &self.nodes[id] {
            id = children[Self::child_index(keys, key)];
        }
        id
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut id = self.root;
        while let Node::Internal { children, .. } = &self.nodes[id] {
            id = children[0];
        }
        id
    }

    fn insert_rec(&mut self, id: NodeId, key: K, value: V) -> Split<K> {
        let order = self.order;
        let child = match &mut self.nodes[id] {
            Node::Leaf { keys, values, .. } => {
                match keys.binary_search(&key) {
                    Ok(pos) => values[pos] = value,
                    Err(pos) => {
                        keys.insert(pos, key);
                        values.insert(pos, value);
                    }
                }
                if keys.len() <= order {
                    return None;
                }
                return Some(self.split_leaf(id));
            }
            Node::Internal { keys, children } => {
                let idx = Self::child_index(keys, &key);
                (idx, children[idx])
            }
        };

        let (idx, child_id) = child;
        let (separator, right) = self.insert_rec(child_id, key, value)?;
        if let Node::Internal { keys, children } = &mut self.nodes[id] {
            keys.insert(idx, separator);
            children.insert(idx + 1, right);
            if keys.len() <= order {
                return None;
            }
        }
        Some(self.split_internal(id))
    }

    fn split_leaf(&mut self, id: NodeId) -> (K, NodeId) {
        let (right_keys, right_values, next) = match &mut self.nodes[id] {
            Node::Leaf { keys, values, next } => {
                let mid = keys.len() / 2;
                (keys.split_off(mid), values.split_off(mid), next.take())
            }
            Node::Internal { .. } => unreachable!("split_leaf on internal node"),
        };
        let separator = right_keys[0].clone();
        let right = self.alloc(Node::Leaf {
            keys: right_keys,
            values: right_values,
            next,
        });
        if let Node::Leaf { next, .. } = &mut self.nodes[id] {
            *next = Some(right);
        }
        (separator, right)
    }

    fn split_internal(&mut self, id: NodeId) -> (K, NodeId) {
        let (separator, right_keys, right_children) = match &mut self.nodes[id] {
            Node::Internal { keys, children } => {
                let mid = keys.len() / 2;
                let mut right_keys = keys.split_off(mid);
                let separator = right_keys.remove(0);
                (separator, right_keys, children.split_off(mid + 1))
            }
            Node::Leaf { .. } => unreachable!("split_internal on leaf"),
        };
        let right = self.alloc(Node::Internal {
            keys: right_keys,
            children: right_children,
        });
        (separator, right)
    }

    fn remove_rec(&mut self, id: NodeId, key: &K) -> Option<V> {
        let (idx, child_id) = match &mut self.nodes[id] {
            Node::Leaf { keys, values, .. } => {
                let pos = keys.binary_search(key).ok()?;
                keys.remove(pos);
                return Some(values.remove(pos));
            }
            Node::Internal { keys, children } => {
                let idx = Self::child_index(keys, key);
                (idx, children[idx])
            }
        };

        let removed = self.remove_rec(child_id, key)?;
        if self.nodes[child_id].keys().len() < self.min_keys() {
            self.rebalance(id, idx);
        }
        Some(removed)
    }

    /// Restores the minimum fill of `parent.children[idx]`.
    fn rebalance(&mut self, parent: NodeId, idx: usize) {
        let children = match &self.nodes[parent] {
            Node::Internal { children, .. } => children.clone(),
            Node::Leaf { .. } => return,
        };
        let min = self.min_keys();

        if idx > 0 && self.nodes[children[idx - 1]].keys().len() > min {
            self.borrow_from_left(parent, idx, children[idx - 1], children[idx]);
        } else if idx + 1 < children.len() && self.nodes[children[idx + 1]].keys().len() > min {
            self.borrow_from_right(parent, idx, children[idx], children[idx + 1]);
        } else if idx > 0 {
            self.merge(parent, idx - 1, children[idx - 1], children[idx]);
        } else if idx + 1 < children.len() {
            self.merge(parent, idx, children[idx], children[idx + 1]);
        }
    }

    fn separator_mut(&mut self, parent: NodeId, at: usize) -> Option<&mut K> {
        match &mut self.nodes[parent] {
            Node::Internal { keys, .. } => keys.get_mut(at),
            Node::Leaf { .. } => None,
        }
    }

    fn borrow_from_left(&mut self, parent: NodeId, idx: usize, left: NodeId, child: NodeId) {
        let mut left_node = mem::replace(&mut self.nodes[left], Node::empty_leaf());
        let mut child_node = mem::replace(&mut self.nodes[child], Node::empty_leaf());

        match (&mut left_node, &mut child_node) {
            (
                Node::Leaf {
                    keys: lk,
                    values: lv,
                    ..
                },
                Node::Leaf {
                    keys: ck,
                    values: cv,
                    ..
                },
            ) => {
                if let (Some(k), Some(v)) = (lk.pop(), lv.pop()) {
                    ck.insert(0, k.clone());
                    cv.insert(0, v);
                    if let Some(sep) = self.separator_mut(parent, idx - 1) {
                        *sep = k;
                    }
                }
            }
            (
                Node::Internal {
                    keys: lk,
                    children: lc,
                },
                Node::Internal {
                    keys: ck,
                    children: cc,
                },
            ) => {
                if let (Some(k), Some(c)) = (lk.pop(), lc.pop()) {
                    if let Some(sep) = self.separator_mut(parent, idx - 1) {
                        ck.insert(0, mem::replace(sep, k));
                        cc.insert(0, c);
                    }
                }
            }
            _ => unreachable!("siblings at different depths"),
        }

        self.nodes[left] = left_node;
        self.nodes[child] = child_node;
    }

    fn borrow_from_right(&mut self, parent: NodeId, idx: usize, child: NodeId, right: NodeId) {
        let mut child_node = mem::replace(&mut self.nodes[child], Node::empty_leaf());
        let mut right_node = mem::replace(&mut self.nodes[right], Node::empty_leaf());

        match (&mut child_node, &mut right_node) {
            (
                Node::Leaf {
                    keys: ck,
                    values: cv,
                    ..
                },
                Node::Leaf {
                    keys: rk,
                    values: rv,
                    ..
                },
            ) => {
                ck.push(rk.remove(0));
                cv.push(rv.remove(0));
                let first = rk[0].clone();
                if let Some(sep) = self.separator_mut(parent, idx) {
                    *sep = first;
                }
            }
            (
                Node::Internal {
                    keys: ck,
                    children: cc,
                },
                Node::Internal {
                    keys: rk,
                    children: rc,
                },
            ) => {
                let k = rk.remove(0);
                if let Some(sep) = self.separator_mut(parent, idx) {
                    ck.push(mem::replace(sep, k));
                }
                cc.push(rc.remove(0));
            }
            _ => unreachable!("siblings at different depths"),
        }

        self.nodes[child] = child_node;
        self.nodes[right] = right_node;
    }

    /// Folds `parent.children[at + 1]` into `parent.children[at]`.
    fn merge(&mut self, parent: NodeId, at: usize, left: NodeId, right: NodeId) {
        let separator = match &mut self.nodes[parent] {
            Node::Internal { keys, children } => {
                children.remove(at + 1);
                keys.remove(at)
            }
            Node::Leaf { .. } => return,
        };
        let right_node = mem::replace(&mut self.nodes[right], Node::empty_leaf());

        match (&mut self.nodes[left], right_node) {
            (
                Node::Leaf { keys, values, next },
                Node::Leaf {
                    keys: rk,
                    values: rv,
                    next: rn,
                },
            ) => {
                keys.extend(rk);
                values.extend(rv);
                *next = rn;
            }
            (
                Node::Internal { keys, children },
                Node::Internal {
                    keys: rk,
                    children: rc,
                },
            ) => {
                keys.push(separator);
                keys.extend(rk);
                children.extend(rc);
            }
            _ => unreachable!("siblings at different depths"),
        }
        self.release(right);
    }
}

impl<K, V> KeyMap<K, V> for BPlusTree<K, V>
where
    K: Ord + Clone + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Option<&V> {
        match &self.nodes[self.find_leaf(key)] {
            Node::Leaf { keys, values, .. } => keys.binary_search(key).ok().map(|pos| &values[pos]),
            Node::Internal { .. } => None,
        }
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let leaf = self.find_leaf(key);
        match &mut self.nodes[leaf] {
            Node::Leaf { keys, values, .. } => {
                let pos = keys.binary_search(key).ok()?;
                values.get_mut(pos)
            }
            Node::Internal { .. } => None,
        }
    }

    fn insert(&mut self, key: K, value: V) {
        let exists = self.get(&key).is_some();
        if let Some((separator, right)) = self.insert_rec(self.root, key, value) {
            let old_root = self.root;
            self.root = self.alloc(Node::Internal {
                keys: vec![separator],
                children: vec![old_root, right],
            });
        }
        if !exists {
            self.len += 1;
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.remove_rec(self.root, key)?;
        self.len -= 1;

        // Collapse a root left with a single child.
        if let Node::Internal { keys, children } = &self.nodes[self.root] {
            if keys.is_empty() {
                let only = children[0];
                let old_root = self.root;
                self.root = only;
                self.release(old_root);
            }
        }
        Some(removed)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.nodes = vec![Node::empty_leaf()];
        self.free.clear();
        self.root = 0;
        self.len = 0;
    }

    fn range(&self, lo: Option<&K>, hi: Option<&K>) -> Vec<(&K, &V)> {
        let mut out = Vec::new();
        let mut leaf = Some(match lo {
            Some(lo) => self.find_leaf(lo),
            None => self.leftmost_leaf(),
        });

        while let Some(id) = leaf {
            let Node::Leaf { keys, values, next } = &self.nodes[id] else {
                break;
            };
            for (k, v) in keys.iter().zip(values) {
                if lo.is_some_and(|lo| k < lo) {
                    continue;
                }
                if hi.is_some_and(|hi| k > hi) {
                    return out;
                }
                out.push((k, v));
            }
            leaf = *next;
        }
        out
    }

    fn max_key(&self) -> Option<&K> {
        let mut id = self.root;
        loop {
            match &self.nodes[id] {
                Node::Internal { children, .. } => id = *children.last()?,
                Node::Leaf { keys, .. } => return keys.last(),
            }
        }
    }

    fn is_ordered(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_in_order(tree: &BPlusTree<u32, u32>) -> Vec<u32> {
        tree.range(None, None).into_iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_bplus_tree_split_and_scan() {
        let mut tree = BPlusTree::new(4);
        for i in (0..100u32).rev() {
            tree.insert(i, i * 10);
        }
        assert_eq!(tree.len(), 100);
        assert!(tree.height() > 2);
        assert_eq!(keys_in_order(&tree), (0..100).collect::<Vec<_>>());
        assert_eq!(tree.get(&42), Some(&420));
        assert_eq!(tree.max_key(), Some(&99));
    }

    #[test]
    fn test_bplus_tree_range_bounds() {
        let mut tree = BPlusTree::new(4);
        for i in 0..50u32 {
            tree.insert(i * 2, i);
        }
        let found: Vec<u32> = tree
            .range(Some(&11), Some(&19))
            .into_iter()
            .map(|(k, _)| *k)
            .collect();
        assert_eq!(found, vec![12, 14, 16, 18]);
    }

    #[test]
    fn test_bplus_tree_remove_rebalances() {
        let mut tree = BPlusTree::new(4);
        for i in 0..200u32 {
            tree.insert(i, i);
        }
        let tall = tree.height();

        for i in (0..200u32).filter(|i| i % 3 != 0) {
            assert_eq!(tree.remove(&i), Some(i));
        }
        assert_eq!(tree.remove(&1), None);
        assert_eq!(
            keys_in_order(&tree),
            (0..200).filter(|i| i % 3 == 0).collect::<Vec<_>>()
        );

        for i in (0..200u32).filter(|i| i % 3 == 0) {
            assert_eq!(tree.remove(&i), Some(i));
        }
        assert!(tree.is_empty());
        assert!(tree.height() < tall);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.max_key(), None);
    }

    #[test]
    fn test_bplus_tree_reuses_released_nodes() {
        let mut tree = BPlusTree::new(4);
        for round in 0..3 {
            for i in 0..64u32 {
                tree.insert(i, round);
            }
            for i in 0..64u32 {
                tree.remove(&i);
            }
        }
        assert!(tree.nodes.len() < 64);
    }
}
