use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::common::{PageKey, Result, PAGE_SIZE};
use crate::storage::disk::BlockStore;
use crate::storage::page::SlottedPage;

use super::LruKReplacer;

/// Shared handle to a cached page.
pub type PageRef = Arc<RwLock<SlottedPage>>;

/// A keyed store of loaded pages.
///
/// Implemented by the root [`PageCache`], which talks to the block store,
/// and by [`super::TransactionCache`], which overlays another `PageStore`.
pub trait PageStore: Send + Sync {
    /// Returns the page for `key`, loading it on a miss.
    fn get(&self, key: &PageKey, record_size: usize) -> Result<PageRef>;

    /// Installs a fresh empty page under `key`, replacing anything resident.
    ///
    /// Used when a page id is allocated again after it was vacated, so stale
    /// bytes that may still be on disk are never read back.
    fn create(&self, key: &PageKey, record_size: usize) -> Result<PageRef>;

    /// Inserts or replaces a resident page.
    fn put(&self, key: PageKey, page: PageRef) -> Result<()>;

    /// Drops a resident page without writing it back.
    fn remove(&self, key: &PageKey) -> Option<PageRef>;

    fn contains(&self, key: &PageKey) -> bool;

    /// Number of resident pages.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True for overlays that must never write to storage themselves.
    fn is_transactional(&self) -> bool;

    /// Writes a resident dirty page to storage.
    fn write_back(&self, key: &PageKey) -> Result<()>;
}

struct CacheState {
    pages: HashMap<PageKey, PageRef>,
    replacer: LruKReplacer<PageKey>,
}

/// The root page cache.
///
/// Holds up to `capacity` pages and evicts with LRU-K (plain LRU for k = 1).
/// A page is only a candidate while the cache holds the sole reference to
/// it. Dirty victims are written to the block store before they are dropped.
/// If every resident page is referenced elsewhere the new page is admitted
/// over capacity.
///
/// All operations run under one mutex, including the I/O of a miss.
pub struct PageCache {
    capacity: usize,
    store: Arc<dyn BlockStore>,
    state: Mutex<CacheState>,
}

impl PageCache {
    pub fn new(capacity: usize, k: usize, store: Arc<dyn BlockStore>) -> Self {
        Self {
            capacity,
            store,
            state: Mutex::new(CacheState {
                pages: HashMap::new(),
                replacer: LruKReplacer::new(k),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// Writes every dirty resident page in PageKey order and clears the
    /// dirty flags. Pages stay resident.
    pub fn commit(&self) -> Result<usize> {
        let state = self.state.lock();
        let mut keys: Vec<&PageKey> = state.pages.keys().collect();
        keys.sort();

        let mut written = 0;
        for key in keys {
            if self.flush_page(key, &state.pages[key])? {
                written += 1;
            }
        }
        debug!(written, resident = state.pages.len(), "flushed page cache");
        Ok(written)
    }

    /// Drops every resident page without writing anything.
    pub fn rollback(&self) {
        let mut state = self.state.lock();
        let dropped = state.pages.len();
        state.pages.clear();
        state.replacer.clear();
        debug!(dropped, "discarded page cache");
    }

    /// Shrinks the file `file` belongs to so it holds `page_count` pages and
    /// drops resident pages of that file at or past `page_count`.
    pub fn truncate(&self, file: &PageKey, page_count: u32) -> Result<()> {
        let mut state = self.state.lock();
        let stale: Vec<PageKey> = state
            .pages
            .keys()
            .filter(|key| key.same_file(file) && key.page_id.as_u32() >= page_count)
            .cloned()
            .collect();
        for key in &stale {
            state.pages.remove(key);
            state.replacer.remove(key);
        }

        let len = page_count as u64 * PAGE_SIZE as u64;
        self.store.truncate(&file.file_path(), len)?;
        debug!(file = %file.file_path(), page_count, dropped = stale.len(), "truncated");
        Ok(())
    }

    /// Writes one page if it is dirty. Returns whether a write happened.
    fn flush_page(&self, key: &PageKey, page: &PageRef) -> Result<bool> {
        let mut page = page.write();
        if !page.is_dirty() {
            return Ok(false);
        }
        let offset = key.page_id.byte_offset(PAGE_SIZE);
        if let Err(e) = self
            .store
            .write_block(&key.file_path(), offset, &page.to_bytes())
        {
            error!(page = %key, error = %e, "write-back failed");
            return Err(e);
        }
        page.set_dirty(false);
        Ok(true)
    }

    /// Makes room for one more page.
    fn evict_for_insert(&self, state: &mut CacheState) -> Result<()> {
        while state.pages.len() >= self.capacity {
            for (key, page) in state.pages.iter() {
                state
                    .replacer
                    .set_evictable(key, Arc::strong_count(page) == 1);
            }

            let Some(victim) = state.replacer.evict() else {
                warn!(
                    resident = state.pages.len(),
                    capacity = self.capacity,
                    "no evictable page, admitting over capacity"
                );
                return Ok(());
            };

            let Some(page) = state.pages.remove(&victim) else {
                continue;
            };
            if let Err(e) = self.flush_page(&victim, &page) {
                // Keep the page so its changes are not lost.
                state.replacer.record_access(&victim);
                state.pages.insert(victim, page);
                return Err(e);
            }
            debug!(page = %victim, "evicted");
        }
        Ok(())
    }

    fn install(&self, state: &mut CacheState, key: PageKey, page: PageRef) -> Result<()> {
        if !state.pages.contains_key(&key) {
            self.evict_for_insert(state)?;
        }
        state.replacer.record_access(&key);
        state.pages.insert(key, page);
        Ok(())
    }

    fn load(&self, key: &PageKey, record_size: usize) -> Result<SlottedPage> {
        let offset = key.page_id.byte_offset(PAGE_SIZE);
        let data = self.store.read_block(&key.file_path(), offset, PAGE_SIZE)?;
        debug!(page = %key, found = data.is_some(), "cache miss");
        match data {
            Some(bytes) => SlottedPage::from_bytes(key.page_id, record_size, &bytes),
            None => Ok(SlottedPage::new(key.page_id, record_size)),
        }
    }
}

impl PageStore for PageCache {
    fn get(&self, key: &PageKey, record_size: usize) -> Result<PageRef> {
        let mut state = self.state.lock();
        if let Some(page) = state.pages.get(key) {
            let page = Arc::clone(page);
            state.replacer.record_access(key);
            return Ok(page);
        }

        let page = Arc::new(RwLock::new(self.load(key, record_size)?));
        self.install(&mut state, key.clone(), Arc::clone(&page))?;
        Ok(page)
    }

    fn create(&self, key: &PageKey, record_size: usize) -> Result<PageRef> {
        let mut fresh = SlottedPage::new(key.page_id, record_size);
        fresh.set_dirty(true);
        let page = Arc::new(RwLock::new(fresh));

        let mut state = self.state.lock();
        self.install(&mut state, key.clone(), Arc::clone(&page))?;
        Ok(page)
    }

    /// Merged pages are never refused: if no victim can be written out the
    /// page is admitted over capacity.
    fn put(&self, key: PageKey, page: PageRef) -> Result<()> {
        let mut state = self.state.lock();
        if !state.pages.contains_key(&key) {
            if let Err(e) = self.evict_for_insert(&mut state) {
                warn!(page = %key, error = %e, "eviction failed, admitting over capacity");
            }
        }
        state.replacer.record_access(&key);
        state.pages.insert(key, page);
        Ok(())
    }

    fn remove(&self, key: &PageKey) -> Option<PageRef> {
        let mut state = self.state.lock();
        state.replacer.remove(key);
        state.pages.remove(key)
    }

    fn contains(&self, key: &PageKey) -> bool {
        self.state.lock().pages.contains_key(key)
    }

    fn len(&self) -> usize {
        self.state.lock().pages.len()
    }

    fn is_transactional(&self) -> bool {
        false
    }

    fn write_back(&self, key: &PageKey) -> Result<()> {
        let state = self.state.lock();
        match state.pages.get(key) {
            Some(page) => self.flush_page(key, page).map(|_| ()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PageId;
    use crate::storage::disk::MemoryBlockStore;
    use bytes::Bytes;

    fn key(id: u32) -> PageKey {
        PageKey::table("t", PageId::new(id))
    }

    #[test]
    fn test_page_cache_miss_loads_empty_page() {
        let store = Arc::new(MemoryBlockStore::new());
        let cache = PageCache::new(4, 1, store.clone());

        let page = cache.get(&key(0), 8).unwrap();
        assert!(page.read().is_empty());
        assert!(!page.read().is_dirty());
        assert_eq!(store.get_num_reads(), 1);

        cache.get(&key(0), 8).unwrap();
        assert_eq!(store.get_num_reads(), 1);
    }

    #[test]
    fn test_page_cache_write_back_then_reload() {
        let store = Arc::new(MemoryBlockStore::new());
        let cache = PageCache::new(4, 1, store.clone());

        cache
            .get(&key(1), 8)
            .unwrap()
            .write()
            .add(Bytes::from(vec![3u8; 8]))
            .unwrap();
        cache.write_back(&key(1)).unwrap();
        assert_eq!(store.get_num_writes(), 1);
        assert_eq!(store.file_len("t.tbl"), 2 * PAGE_SIZE as u64);

        cache.rollback();
        assert_eq!(cache.len(), 0);
        let page = cache.get(&key(1), 8).unwrap();
        assert_eq!(page.read().size(), 1);
    }

    #[test]
    fn test_page_cache_pinned_pages_admitted_over_capacity() {
        let store = Arc::new(MemoryBlockStore::new());
        let cache = PageCache::new(1, 1, store);

        let first = cache.get(&key(0), 8).unwrap();
        let _second = cache.get(&key(1), 8).unwrap();
        assert_eq!(cache.len(), 2);

        drop(first);
        cache.get(&key(2), 8).unwrap();
        assert!(!cache.contains(&key(0)));
    }

    struct FullDisk;

    impl BlockStore for FullDisk {
        fn read_block(&self, _: &str, _: u64, _: usize) -> Result<Option<Bytes>> {
            Ok(None)
        }

        fn write_block(&self, _: &str, _: u64, _: &[u8]) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }

        fn truncate(&self, _: &str, _: u64) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_page_cache_put_admits_when_victim_unwritable() {
        let cache = PageCache::new(1, 1, Arc::new(FullDisk));
        cache
            .get(&key(0), 8)
            .unwrap()
            .write()
            .add(Bytes::from(vec![1u8; 8]))
            .unwrap();

        // A fresh page needs the dirty victim written, which fails
        assert!(cache.create(&key(1), 8).is_err());
        assert_eq!(cache.len(), 1);

        let merged = Arc::new(RwLock::new(SlottedPage::new(PageId::new(1), 8)));
        cache.put(key(1), merged).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(0), 8).unwrap().read().is_dirty());
    }

    #[test]
    fn test_page_cache_create_replaces_stale_page() {
        let store = Arc::new(MemoryBlockStore::new());
        let cache = PageCache::new(4, 1, store);

        cache
            .get(&key(0), 8)
            .unwrap()
            .write()
            .add(Bytes::from(vec![1u8; 8]))
            .unwrap();
        let page = cache.create(&key(0), 8).unwrap();
        assert!(page.read().is_empty());
        assert!(page.read().is_dirty());
        assert!(cache.get(&key(0), 8).unwrap().read().is_empty());
    }
}
