use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;

use crate::common::{Result, StrataError};

/// Key/value search structure behind one indexed column.
///
/// Keys are `Option<K>`; `None` is the null key. A null key is accepted only
/// by nullable indexes and sorts before every real key, so range searches
/// reach it only with an unbounded lower bound.
///
/// A unique index stores one value per key. A non-unique index keeps the
/// first value as the primary one and the rest as duplicates; when the
/// primary is removed the oldest duplicate takes its place.
pub trait Index<K, V>: Send + Sync {
    /// Adds `value` under `key`.
    ///
    /// Fails with `DuplicateKey` if the index is unique and the key exists,
    /// or with `NullKey` if `key` is null and the index is not nullable.
    /// Adding a value already stored under `key` is a no-op.
    fn insert(&mut self, key: Option<K>, value: V) -> Result<()>;

    /// Removes `value` from under `key`. Returns false if it wasn't there.
    fn remove(&mut self, key: Option<&K>, value: &V) -> bool;

    /// Every value stored under `key`, primary first.
    fn search(&self, key: Option<&K>) -> Vec<(Option<K>, V)>;

    /// Entries with `lo <= key <= hi`; a `None` bound is unbounded.
    /// Ordered structures return entries sorted by key.
    fn range_search(&self, lo: Option<&K>, hi: Option<&K>) -> Vec<(Option<K>, V)>;

    fn is_key(&self, key: Option<&K>) -> bool;

    /// Replaces the value of `key`. Unique indexes only.
    fn update(&mut self, key: Option<&K>, new_value: V) -> Result<()>;

    /// Replaces `old_value` under `key` with `new_value`. Non-unique
    /// indexes only. If `new_value` is already stored the two collapse.
    fn update_value(&mut self, key: Option<&K>, new_value: V, old_value: &V) -> Result<()>;

    /// Largest non-null key.
    fn get_max(&self) -> Option<K>;

    /// Number of stored (key, value) pairs.
    fn size(&self) -> usize;

    fn set_unique(&mut self, unique: bool) -> Result<()>;

    fn set_nullable(&mut self, nullable: bool) -> Result<()>;

    fn is_unique(&self) -> bool;

    fn is_nullable(&self) -> bool;

    /// Whether `range_search` and `entries` come back sorted by key.
    fn is_ordered(&self) -> bool;

    fn clear(&mut self);

    /// Every entry, in structure order.
    fn entries(&self) -> Vec<(Option<K>, V)> {
        self.range_search(None, None)
    }
}

/// Map from key to one stored item, the contract each backing structure
/// implements. Callers never insert a key that is already present.
pub trait KeyMap<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<&V>;

    fn get_mut(&mut self, key: &K) -> Option<&mut V>;

    fn insert(&mut self, key: K, value: V);

    fn remove(&mut self, key: &K) -> Option<V>;

    /// Number of keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Entries with `lo <= key <= hi`, sorted when the map is ordered.
    fn range(&self, lo: Option<&K>, hi: Option<&K>) -> Vec<(&K, &V)>;

    fn max_key(&self) -> Option<&K>;

    fn is_ordered(&self) -> bool;
}

/// Values stored under one key.
#[derive(Debug, Clone)]
pub struct Bucket<V> {
    primary: V,
    duplicates: VecDeque<V>,
}

impl<V: PartialEq + Clone> Bucket<V> {
    fn new(primary: V) -> Self {
        Self {
            primary,
            duplicates: VecDeque::new(),
        }
    }

    fn contains(&self, value: &V) -> bool {
        self.primary == *value || self.duplicates.contains(value)
    }

    fn values(&self) -> impl Iterator<Item = &V> {
        std::iter::once(&self.primary).chain(self.duplicates.iter())
    }

    /// Removes `value`; promotes the oldest duplicate if it was the primary.
    /// Returns `Some(true)` if the bucket is now empty.
    fn remove(&mut self, value: &V) -> Option<bool> {
        if self.primary == *value {
            match self.duplicates.pop_front() {
                Some(next) => {
                    self.primary = next;
                    Some(false)
                }
                None => Some(true),
            }
        } else {
            let pos = self.duplicates.iter().position(|v| v == value)?;
            self.duplicates.remove(pos);
            Some(false)
        }
    }

    fn replace(&mut self, old_value: &V, new_value: V) -> bool {
        if self.primary == *old_value {
            self.primary = new_value;
            return true;
        }
        match self.duplicates.iter_mut().find(|v| **v == *old_value) {
            Some(slot) => {
                *slot = new_value;
                true
            }
            None => false,
        }
    }
}

/// The [`Index`] implementation shared by every backing structure: unique
/// and null-key rules, duplicate buckets and size accounting live here,
/// ordering and lookup live in `M`.
pub struct BucketIndex<K, V, M> {
    name: String,
    map: M,
    null_bucket: Option<Bucket<V>>,
    unique: bool,
    nullable: bool,
    size: usize,
    _key: std::marker::PhantomData<fn() -> K>,
}

impl<K, V, M> BucketIndex<K, V, M>
where
    K: Ord + Hash + Clone + Debug + Send + Sync,
    V: PartialEq + Clone + Debug + Send + Sync,
    M: KeyMap<K, Bucket<V>>,
{
    pub fn new(name: impl Into<String>, map: M) -> Self {
        Self {
            name: name.into(),
            map,
            null_bucket: None,
            unique: false,
            nullable: false,
            size: 0,
            _key: std::marker::PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self, key: Option<&K>) -> Option<&Bucket<V>> {
        match key {
            Some(key) => self.map.get(key),
            None => self.null_bucket.as_ref(),
        }
    }

    fn bucket_mut(&mut self, key: Option<&K>) -> Option<&mut Bucket<V>> {
        match key {
            Some(key) => self.map.get_mut(key),
            None => self.null_bucket.as_mut(),
        }
    }

    fn drop_bucket(&mut self, key: Option<&K>) {
        match key {
            Some(key) => {
                self.map.remove(key);
            }
            None => self.null_bucket = None,
        }
    }

    fn key_not_found(&self, key: Option<&K>) -> StrataError {
        StrataError::KeyNotFound(format!("{:?} in {}", key, self.name))
    }

    fn ensure_empty(&self, setting: &str) -> Result<()> {
        if self.size > 0 {
            return Err(StrataError::IndexConfiguration(format!(
                "cannot change {} of non-empty index {}",
                setting, self.name
            )));
        }
        Ok(())
    }

    fn expand_into(out: &mut Vec<(Option<K>, V)>, key: Option<&K>, bucket: &Bucket<V>) {
        out.extend(bucket.values().map(|v| (key.cloned(), v.clone())));
    }
}

impl<K, V, M> Index<K, V> for BucketIndex<K, V, M>
where
    K: Ord + Hash + Clone + Debug + Send + Sync,
    V: PartialEq + Clone + Debug + Send + Sync,
    M: KeyMap<K, Bucket<V>>,
{
    fn insert(&mut self, key: Option<K>, value: V) -> Result<()> {
        if key.is_none() && !self.nullable {
            return Err(StrataError::NullKey(self.name.clone()));
        }
        let unique = self.unique;
        let name = self.name.clone();

        if let Some(bucket) = self.bucket_mut(key.as_ref()) {
            if unique {
                return Err(StrataError::DuplicateKey {
                    column: name,
                    key: format!("{:?}", key),
                });
            }
            if bucket.contains(&value) {
                return Ok(());
            }
            bucket.duplicates.push_back(value);
        } else {
            match key {
                Some(key) => self.map.insert(key, Bucket::new(value)),
                None => self.null_bucket = Some(Bucket::new(value)),
            }
        }
        self.size += 1;
        Ok(())
    }

    fn remove(&mut self, key: Option<&K>, value: &V) -> bool {
        let Some(bucket) = self.bucket_mut(key) else {
            return false;
        };
        match bucket.remove(value) {
            None => false,
            Some(emptied) => {
                if emptied {
                    self.drop_bucket(key);
                }
                self.size -= 1;
                true
            }
        }
    }

    fn search(&self, key: Option<&K>) -> Vec<(Option<K>, V)> {
        let mut out = Vec::new();
        if let Some(bucket) = self.bucket(key) {
            Self::expand_into(&mut out, key, bucket);
        }
        out
    }

    fn range_search(&self, lo: Option<&K>, hi: Option<&K>) -> Vec<(Option<K>, V)> {
        let mut out = Vec::new();
        if lo.is_none() {
            if let Some(bucket) = &self.null_bucket {
                Self::expand_into(&mut out, None, bucket);
            }
        }
        for (key, bucket) in self.map.range(lo, hi) {
            Self::expand_into(&mut out, Some(key), bucket);
        }
        out
    }

    fn is_key(&self, key: Option<&K>) -> bool {
        self.bucket(key).is_some()
    }

    fn update(&mut self, key: Option<&K>, new_value: V) -> Result<()> {
        if !self.unique {
            return Err(StrataError::InvalidIndexOperation(format!(
                "single-value update on non-unique index {}",
                self.name
            )));
        }
        match self.bucket_mut(key) {
            Some(bucket) => {
                bucket.primary = new_value;
                Ok(())
            }
            None => Err(self.key_not_found(key)),
        }
    }

    fn update_value(&mut self, key: Option<&K>, new_value: V, old_value: &V) -> Result<()> {
        if self.unique {
            return Err(StrataError::InvalidIndexOperation(format!(
                "old/new update on unique index {}",
                self.name
            )));
        }
        let bucket = self.bucket(key).ok_or_else(|| self.key_not_found(key))?;
        if !bucket.contains(old_value) {
            return Err(StrataError::ValueNotFound(format!(
                "{:?} in {}",
                key, self.name
            )));
        }
        if *old_value == new_value {
            return Ok(());
        }
        if bucket.contains(&new_value) {
            self.remove(key, old_value);
            return Ok(());
        }
        if let Some(bucket) = self.bucket_mut(key) {
            bucket.replace(old_value, new_value);
        }
        Ok(())
    }

    fn get_max(&self) -> Option<K> {
        self.map.max_key().cloned()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn set_unique(&mut self, unique: bool) -> Result<()> {
        if self.unique != unique {
            self.ensure_empty("uniqueness")?;
            self.unique = unique;
        }
        Ok(())
    }

    fn set_nullable(&mut self, nullable: bool) -> Result<()> {
        if self.nullable != nullable {
            self.ensure_empty("nullability")?;
            self.nullable = nullable;
        }
        Ok(())
    }

    fn is_unique(&self) -> bool {
        self.unique
    }

    fn is_nullable(&self) -> bool {
        self.nullable
    }

    fn is_ordered(&self) -> bool {
        self.map.is_ordered()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.null_bucket = None;
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_fifo_promotion() {
        let mut bucket = Bucket::new("a");
        bucket.duplicates.push_back("b");
        bucket.duplicates.push_back("c");

        assert_eq!(bucket.remove(&"a"), Some(false));
        assert_eq!(bucket.primary, "b");
        assert_eq!(bucket.remove(&"c"), Some(false));
        assert_eq!(bucket.remove(&"x"), None);
        assert_eq!(bucket.remove(&"b"), Some(true));
    }

    #[test]
    fn test_bucket_replace() {
        let mut bucket = Bucket::new(1);
        bucket.duplicates.push_back(2);
        assert!(bucket.replace(&2, 5));
        assert_eq!(bucket.values().copied().collect::<Vec<_>>(), vec![1, 5]);
        assert!(!bucket.replace(&9, 6));
    }
}
