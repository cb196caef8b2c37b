//! Integration tests for the LRU-K replacer

use strata::buffer::LruKReplacer;
use strata::common::{PageId, PageKey};

fn key(id: u32) -> PageKey {
    PageKey::table("t", PageId::new(id))
}

#[test]
fn test_lru_k_eviction_order() {
    let mut replacer = LruKReplacer::new(2);

    for i in 0..5 {
        replacer.record_access(&key(i));
        replacer.set_evictable(&key(i), true);
    }
    assert_eq!(replacer.size(), 5);

    // One access each (< k = 2): every key has +inf distance, oldest goes first
    for i in 0..5 {
        assert_eq!(replacer.evict(), Some(key(i)));
    }
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_respects_k_distance() {
    let mut replacer = LruKReplacer::new(2);

    replacer.record_access(&key(0));
    replacer.record_access(&key(1));
    replacer.record_access(&key(1));
    replacer.record_access(&key(2));
    replacer.record_access(&key(2));
    for i in 0..3 {
        replacer.set_evictable(&key(i), true);
    }

    // Fewer than k accesses beats any finite distance
    assert_eq!(replacer.evict(), Some(key(0)));
    assert_eq!(replacer.evict(), Some(key(1)));
    assert_eq!(replacer.evict(), Some(key(2)));
}

#[test]
fn test_lru_k_one_is_plain_lru() {
    let mut replacer = LruKReplacer::new(1);

    for i in 0..3 {
        replacer.record_access(&key(i));
        replacer.set_evictable(&key(i), true);
    }
    // Touch key 0 again; key 1 is now least recently used
    replacer.record_access(&key(0));

    assert_eq!(replacer.evict(), Some(key(1)));
    assert_eq!(replacer.evict(), Some(key(2)));
    assert_eq!(replacer.evict(), Some(key(0)));
}

#[test]
fn test_lru_k_pinned_keys_not_evicted() {
    let mut replacer = LruKReplacer::new(2);

    for i in 0..3 {
        replacer.record_access(&key(i));
    }
    replacer.set_evictable(&key(1), true);
    replacer.set_evictable(&key(2), true);
    assert_eq!(replacer.size(), 2);
    assert_eq!(replacer.tracked(), 3);

    assert_eq!(replacer.evict(), Some(key(1)));
    assert_eq!(replacer.evict(), Some(key(2)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_toggle_evictable() {
    let mut replacer = LruKReplacer::new(2);

    replacer.record_access(&key(0));
    replacer.set_evictable(&key(0), true);
    replacer.set_evictable(&key(0), true);
    assert_eq!(replacer.size(), 1);

    replacer.set_evictable(&key(0), false);
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);

    // Unknown keys are ignored
    replacer.set_evictable(&key(9), true);
    assert_eq!(replacer.size(), 0);
}

#[test]
fn test_lru_k_remove_and_clear() {
    let mut replacer = LruKReplacer::new(2);

    for i in 0..4 {
        replacer.record_access(&key(i));
        replacer.set_evictable(&key(i), true);
    }
    replacer.remove(&key(0));
    assert_eq!(replacer.size(), 3);
    assert_eq!(replacer.evict(), Some(key(1)));

    replacer.clear();
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.tracked(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_history_limit() {
    let mut replacer = LruKReplacer::new(2);

    // Key 0 is hammered early, key 1 gets two recent accesses
    for _ in 0..10 {
        replacer.record_access(&key(0));
    }
    replacer.record_access(&key(1));
    replacer.record_access(&key(1));
    replacer.set_evictable(&key(0), true);
    replacer.set_evictable(&key(1), true);

    // Only the last k accesses count, so key 0's k-distance is larger
    assert_eq!(replacer.evict(), Some(key(0)));
}
