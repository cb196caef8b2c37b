//! Integration tests for the page cache and transaction overlays

use std::sync::Arc;

use bytes::Bytes;
use strata::buffer::{PageCache, PageStore, TransactionCache};
use strata::common::{PageId, PageKey, SlotId, StrataError};
use strata::storage::disk::MemoryBlockStore;

const RECORD: usize = 8;

fn key(id: u32) -> PageKey {
    PageKey::table("t", PageId::new(id))
}

fn record(byte: u8) -> Bytes {
    Bytes::from(vec![byte; RECORD])
}

fn setup(capacity: usize) -> (Arc<MemoryBlockStore>, Arc<PageCache>) {
    let store = Arc::new(MemoryBlockStore::new());
    let cache = Arc::new(PageCache::new(capacity, 1, store.clone()));
    (store, cache)
}

#[test]
fn test_eviction_writes_back_dirty_lru_page() {
    let (store, cache) = setup(2);

    cache.get(&key(1), RECORD).unwrap();
    cache
        .get(&key(2), RECORD)
        .unwrap()
        .write()
        .add(record(2))
        .unwrap();
    cache.get(&key(1), RECORD).unwrap();
    assert_eq!(store.get_num_writes(), 0);

    cache.get(&key(3), RECORD).unwrap();

    assert!(!cache.contains(&key(2)));
    assert!(cache.contains(&key(1)));
    assert!(cache.contains(&key(3)));
    assert_eq!(store.get_num_writes(), 1);
    assert_eq!(store.file_len("t.tbl"), 3 * 4096);
}

#[test]
fn test_eviction_of_clean_page_writes_nothing() {
    let (store, cache) = setup(2);

    cache.get(&key(1), RECORD).unwrap();
    cache.get(&key(2), RECORD).unwrap();
    cache.get(&key(1), RECORD).unwrap();
    cache.get(&key(3), RECORD).unwrap();

    assert!(!cache.contains(&key(2)));
    assert_eq!(store.get_num_writes(), 0);
}

#[test]
fn test_referenced_pages_are_not_evicted() {
    let (_store, cache) = setup(1);

    let held = cache.get(&key(1), RECORD).unwrap();
    let _second = cache.get(&key(2), RECORD).unwrap();

    // Both pages are referenced outside the cache, so it grows past capacity
    assert_eq!(cache.len(), 2);
    drop(held);
    cache.get(&key(3), RECORD).unwrap();
    assert!(!cache.contains(&key(1)));
}

#[test]
fn test_evicted_page_reloads_from_storage() {
    let (_store, cache) = setup(1);

    cache
        .get(&key(0), RECORD)
        .unwrap()
        .write()
        .add(record(7))
        .unwrap();
    cache.get(&key(1), RECORD).unwrap();
    assert!(!cache.contains(&key(0)));

    let page = cache.get(&key(0), RECORD).unwrap();
    let page = page.read();
    assert_eq!(page.get(SlotId::new(0)).unwrap(), &record(7));
    assert!(!page.is_dirty());
}

#[test]
fn test_commit_flushes_in_key_order_and_rollback_drops() {
    let (store, cache) = setup(8);

    for id in [3, 0, 2] {
        cache
            .get(&key(id), RECORD)
            .unwrap()
            .write()
            .add(record(id as u8))
            .unwrap();
    }
    cache.get(&key(1), RECORD).unwrap();

    assert_eq!(cache.commit().unwrap(), 3);
    assert_eq!(cache.commit().unwrap(), 0);
    assert_eq!(store.get_num_writes(), 3);

    cache
        .get(&key(0), RECORD)
        .unwrap()
        .write()
        .add(record(9))
        .unwrap();
    cache.rollback();
    assert!(cache.is_empty());

    let page = cache.get(&key(0), RECORD).unwrap();
    assert_eq!(page.read().size(), 1);
}

#[test]
fn test_create_replaces_stale_page() {
    let (_store, cache) = setup(4);

    cache
        .get(&key(0), RECORD)
        .unwrap()
        .write()
        .add(record(1))
        .unwrap();
    cache.commit().unwrap();

    let fresh = cache.create(&key(0), RECORD).unwrap();
    assert!(fresh.read().is_empty());
    assert!(fresh.read().is_dirty());
}

#[test]
fn test_truncate_drops_tail_pages() {
    let (store, cache) = setup(8);

    for id in 0..3 {
        cache
            .get(&key(id), RECORD)
            .unwrap()
            .write()
            .add(record(1))
            .unwrap();
    }
    cache.commit().unwrap();

    cache.truncate(&key(0), 1).unwrap();
    assert!(cache.contains(&key(0)));
    assert!(!cache.contains(&key(1)));
    assert!(!cache.contains(&key(2)));
    assert_eq!(store.file_len("t.tbl"), 4096);
    assert_eq!(store.get_num_truncates(), 1);
}

#[test]
fn test_nested_transaction_caches() {
    let (store, root) = setup(8);
    root.get(&key(0), RECORD)
        .unwrap()
        .write()
        .add(record(1))
        .unwrap();
    root.commit().unwrap();

    let outer = Arc::new(TransactionCache::new(root.clone()));
    let inner = TransactionCache::new(outer.clone());

    inner
        .get(&key(0), RECORD)
        .unwrap()
        .write()
        .add(record(2))
        .unwrap();
    // The clean root page moved all the way up into the inner overlay
    assert!(!root.contains(&key(0)));
    assert!(!outer.contains(&key(0)));

    inner.commit().unwrap();
    assert!(outer.contains(&key(0)));
    assert_eq!(outer.get(&key(0), RECORD).unwrap().read().size(), 2);

    outer.rollback();
    assert_eq!(root.get(&key(0), RECORD).unwrap().read().size(), 1);
    assert_eq!(store.get_num_writes(), 1);
}

#[test]
fn test_transaction_cache_cannot_write_back() {
    let (_store, root) = setup(8);
    let overlay = TransactionCache::new(root);
    overlay.get(&key(0), RECORD).unwrap();

    assert!(overlay.is_transactional());
    assert!(matches!(
        overlay.write_back(&key(0)),
        Err(StrataError::TransactionCacheWriteBack(_))
    ));
}
