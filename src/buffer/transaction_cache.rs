use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::common::{PageKey, Result, StrataError};
use crate::storage::page::SlottedPage;

use super::{PageRef, PageStore};

/// Copy-on-write overlay over another [`PageStore`].
///
/// Unbounded. A miss is served by the parent: a dirty parent page is deep
/// copied so the parent keeps its version until commit, while a clean one is
/// taken out of the parent and moved here (it still matches storage, so
/// nothing is lost if this overlay is discarded).
///
/// Overlays nest by using another `TransactionCache` as the parent.
pub struct TransactionCache {
    parent: Arc<dyn PageStore>,
    pages: Mutex<BTreeMap<PageKey, PageRef>>,
}

impl TransactionCache {
    pub fn new(parent: Arc<dyn PageStore>) -> Self {
        Self {
            parent,
            pages: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn parent(&self) -> &Arc<dyn PageStore> {
        &self.parent
    }

    /// Merges every resident page into the parent in PageKey order and
    /// leaves this overlay empty.
    ///
    /// If the parent refuses a page, that page and every page not yet merged
    /// stay here.
    pub fn commit(&self) -> Result<()> {
        let mut pages = self.pages.lock();
        let mut merged = 0usize;
        while let Some((key, page)) = pages.pop_first() {
            if let Err(e) = self.parent.put(key.clone(), Arc::clone(&page)) {
                warn!(page = %key, merged, remaining = pages.len() + 1, error = %e, "merge failed");
                pages.insert(key, page);
                return Err(e);
            }
            merged += 1;
        }
        debug!(merged, "merged transaction cache into parent");
        Ok(())
    }

    /// Discards every page of this overlay.
    pub fn rollback(&self) {
        let mut pages = self.pages.lock();
        debug!(discarded = pages.len(), "discarded transaction cache");
        pages.clear();
    }
}

impl PageStore for TransactionCache {
    fn get(&self, key: &PageKey, record_size: usize) -> Result<PageRef> {
        let mut pages = self.pages.lock();
        if let Some(page) = pages.get(key) {
            return Ok(Arc::clone(page));
        }

        let from_parent = self.parent.get(key, record_size)?;
        let dirty = from_parent.read().is_dirty();
        let page = if dirty {
            Arc::new(RwLock::new(from_parent.read().deep_copy()))
        } else {
            self.parent.remove(key);
            from_parent
        };
        pages.insert(key.clone(), Arc::clone(&page));
        Ok(page)
    }

    fn create(&self, key: &PageKey, record_size: usize) -> Result<PageRef> {
        let mut fresh = SlottedPage::new(key.page_id, record_size);
        fresh.set_dirty(true);
        let page = Arc::new(RwLock::new(fresh));
        self.pages.lock().insert(key.clone(), Arc::clone(&page));
        Ok(page)
    }

    fn put(&self, key: PageKey, page: PageRef) -> Result<()> {
        self.pages.lock().insert(key, page);
        Ok(())
    }

    fn remove(&self, key: &PageKey) -> Option<PageRef> {
        self.pages.lock().remove(key)
    }

    fn contains(&self, key: &PageKey) -> bool {
        self.pages.lock().contains_key(key)
    }

    fn len(&self) -> usize {
        self.pages.lock().len()
    }

    fn is_transactional(&self) -> bool {
        true
    }

    fn write_back(&self, key: &PageKey) -> Result<()> {
        Err(StrataError::TransactionCacheWriteBack(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PageCache;
    use crate::common::PageId;
    use crate::storage::disk::MemoryBlockStore;
    use bytes::Bytes;

    fn key(id: u32) -> PageKey {
        PageKey::table("t", PageId::new(id))
    }

    fn root() -> Arc<PageCache> {
        Arc::new(PageCache::new(8, 1, Arc::new(MemoryBlockStore::new())))
    }

    #[test]
    fn test_transaction_cache_moves_clean_page() {
        let root = root();
        root.get(&key(0), 8).unwrap();

        let txn = TransactionCache::new(root.clone());
        txn.get(&key(0), 8).unwrap();
        assert!(!root.contains(&key(0)));
        assert!(txn.contains(&key(0)));
    }

    #[test]
    fn test_transaction_cache_copies_dirty_page() {
        let root = root();
        root.get(&key(0), 8)
            .unwrap()
            .write()
            .add(Bytes::from(vec![1u8; 8]))
            .unwrap();

        let txn = TransactionCache::new(root.clone());
        let copy = txn.get(&key(0), 8).unwrap();
        assert!(copy.read().is_dirty());
        copy.write().add(Bytes::from(vec![2u8; 8])).unwrap();

        assert_eq!(root.get(&key(0), 8).unwrap().read().size(), 1);
        txn.commit().unwrap();
        assert_eq!(root.get(&key(0), 8).unwrap().read().size(), 2);
        assert!(txn.is_empty());
    }

    #[test]
    fn test_transaction_cache_rollback_keeps_parent() {
        let root = root();
        root.get(&key(0), 8)
            .unwrap()
            .write()
            .add(Bytes::from(vec![1u8; 8]))
            .unwrap();

        let txn = TransactionCache::new(root.clone());
        txn.get(&key(0), 8).unwrap().write().remove_last();
        txn.rollback();

        assert_eq!(root.get(&key(0), 8).unwrap().read().size(), 1);
    }

    /// Parent that refuses merged pages from `refuse_from` on.
    struct RefusingParent {
        inner: Arc<PageCache>,
        refuse_from: u32,
    }

    impl PageStore for RefusingParent {
        fn get(&self, key: &PageKey, record_size: usize) -> Result<PageRef> {
            self.inner.get(key, record_size)
        }

        fn create(&self, key: &PageKey, record_size: usize) -> Result<PageRef> {
            self.inner.create(key, record_size)
        }

        fn put(&self, key: PageKey, page: PageRef) -> Result<()> {
            if key.page_id.as_u32() >= self.refuse_from {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "refused").into());
            }
            self.inner.put(key, page)
        }

        fn remove(&self, key: &PageKey) -> Option<PageRef> {
            self.inner.remove(key)
        }

        fn contains(&self, key: &PageKey) -> bool {
            self.inner.contains(key)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn is_transactional(&self) -> bool {
            false
        }

        fn write_back(&self, key: &PageKey) -> Result<()> {
            self.inner.write_back(key)
        }
    }

    #[test]
    fn test_transaction_cache_failed_merge_keeps_remaining_pages() {
        let root = root();
        let parent = Arc::new(RefusingParent {
            inner: root.clone(),
            refuse_from: 1,
        });
        let txn = TransactionCache::new(parent);
        for id in 0..3 {
            txn.create(&key(id), 8).unwrap();
        }

        assert!(txn.commit().is_err());
        assert!(root.contains(&key(0)));
        assert_eq!(txn.len(), 2);
        assert!(txn.contains(&key(1)));
        assert!(txn.contains(&key(2)));
    }

    #[test]
    fn test_transaction_cache_write_back_forbidden() {
        let txn = TransactionCache::new(root());
        assert!(txn.is_transactional());
        assert!(matches!(
            txn.write_back(&key(0)),
            Err(StrataError::TransactionCacheWriteBack(_))
        ));
    }
}
