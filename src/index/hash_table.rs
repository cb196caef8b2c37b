use std::collections::HashMap;
use std::hash::Hash;

use super::KeyMap;

/// Unordered key map over `std::collections::HashMap`.
///
/// Point lookups are O(1); `range` has no order to exploit and scans and
/// filters every key, so range queries cost O(n) and come back unsorted.
#[derive(Debug)]
pub struct HashTable<K, V> {
    map: HashMap<K, V>,
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

impl<K, V> HashTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, V> KeyMap<K, V> for HashTable<K, V>
where
    K: Ord + Hash + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.map.get_mut(key)
    }

    fn insert(&mut self, key: K, value: V) {
        self.map.insert(key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        self.map = HashMap::new();
    }

    fn range(&self, lo: Option<&K>, hi: Option<&K>) -> Vec<(&K, &V)> {
        self.map
            .iter()
            .filter(|(k, _)| lo.map_or(true, |lo| *k >= lo) && hi.map_or(true, |hi| *k <= hi))
            .collect()
    }

    fn max_key(&self) -> Option<&K> {
        self.map.keys().max()
    }

    fn is_ordered(&self) -> bool {
        false
    }
}
