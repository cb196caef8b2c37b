use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{SKIP_LIST_MAX_LEVEL, SKIP_LIST_SEED};

use super::KeyMap;

type NodeId = usize;

#[derive(Debug)]
struct SkipNode<K, V> {
    key: K,
    value: V,
    /// Next node per level; `forward.len()` is the node's height.
    forward: Vec<Option<NodeId>>,
}

/// Skip list with nodes in an arena and per-level forward links by index.
///
/// Tower heights come from a seeded generator, so a given insert sequence
/// always builds the same layout.
#[derive(Debug)]
pub struct SkipList<K, V> {
    nodes: Vec<Option<SkipNode<K, V>>>,
    free: Vec<NodeId>,
    head: Vec<Option<NodeId>>,
    level: usize,
    len: usize,
    rng: StdRng,
}

impl<K: Ord, V> Default for SkipList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> SkipList<K, V> {
    pub fn new() -> Self {
        Self::with_seed(SKIP_LIST_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: vec![None; SKIP_LIST_MAX_LEVEL],
            level: 1,
            len: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn node(&self, id: NodeId) -> &SkipNode<K, V> {
        match &self.nodes[id] {
            Some(node) => node,
            None => unreachable!("released node {} still linked", id),
        }
    }

    /// Forward link at `level` of `from`, where `None` is the head.
    fn next(&self, from: Option<NodeId>, level: usize) -> Option<NodeId> {
        match from {
            None => self.head[level],
            Some(id) => self.node(id).forward[level],
        }
    }

    fn set_next(&mut self, from: Option<NodeId>, level: usize, to: Option<NodeId>) {
        match from {
            None => self.head[level] = to,
            Some(id) => {
                if let Some(node) = self.nodes[id].as_mut() {
                    node.forward[level] = to;
                }
            }
        }
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < SKIP_LIST_MAX_LEVEL && self.rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    /// Last node with key below `key` on every level, `None` for the head.
    fn predecessors(&self, key: &K) -> Vec<Option<NodeId>> {
        let mut update = vec![None; SKIP_LIST_MAX_LEVEL];
        let mut current = None;
        for level in (0..self.level).rev() {
            while let Some(next) = self.next(current, level) {
                if self.node(next).key < *key {
                    current = Some(next);
                } else {
                    break;
                }
            }
            update[level] = current;
        }
        update
    }

    fn find(&self, key: &K) -> Option<NodeId> {
        let update = self.predecessors(key);
        self.next(update[0], 0)
            .filter(|&candidate| self.node(candidate).key == *key)
    }
}

impl<K, V> KeyMap<K, V> for SkipList<K, V>
where
    K: Ord + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|id| &self.node(id).value)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let id = self.find(key)?;
        self.nodes[id].as_mut().map(|node| &mut node.value)
    }

    fn insert(&mut self, key: K, value: V) {
        if let Some(value_slot) = self.get_mut(&key) {
            *value_slot = value;
            return;
        }

        let update = self.predecessors(&key);
        let height = self.random_level();
        if height > self.level {
            self.level = height;
        }

        let forward = (0..height).map(|lvl| self.next(update[lvl], lvl)).collect();
        let node = SkipNode {
            key,
            value,
            forward,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        for (lvl, pred) in update.iter().enumerate().take(height) {
            self.set_next(*pred, lvl, Some(id));
        }
        self.len += 1;
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let update = self.predecessors(key);
        let id = self
            .next(update[0], 0)
            .filter(|&candidate| self.node(candidate).key == *key)?;

        let forward = self.node(id).forward.clone();
        for (lvl, next) in forward.into_iter().enumerate() {
            if self.next(update[lvl], lvl) == Some(id) {
                self.set_next(update[lvl], lvl, next);
            }
        }
        while self.level > 1 && self.head[self.level - 1].is_none() {
            self.level -= 1;
        }

        self.free.push(id);
        self.len -= 1;
        self.nodes[id].take().map(|node| node.value)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = vec![None; SKIP_LIST_MAX_LEVEL];
        self.level = 1;
        self.len = 0;
    }

    fn range(&self, lo: Option<&K>, hi: Option<&K>) -> Vec<(&K, &V)> {
        let mut current = match lo {
            Some(lo) => self.next(self.predecessors(lo)[0], 0),
            None => self.head[0],
        };
        let mut out = Vec::new();
        while let Some(id) = current {
            let node = self.node(id);
            if hi.is_some_and(|hi| node.key > *hi) {
                break;
            }
            out.push((&node.key, &node.value));
            current = node.forward[0];
        }
        out
    }

    fn max_key(&self) -> Option<&K> {
        let mut current = None;
        for level in (0..self.level).rev() {
            while let Some(next) = self.next(current, level) {
                current = Some(next);
            }
        }
        current.map(|id| &self.node(id).key)
    }

    fn is_ordered(&self) -> bool {
        true
    }
}
