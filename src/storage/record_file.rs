use bytes::Bytes;
use tracing::debug;

use crate::buffer::{PageCache, PageStore};
use crate::common::{BlockPointer, PageId, PageKey, Result, StrataError};
use crate::storage::page::SlottedPage;
use crate::txn::{Snapshot, SnapshotStack};

/// The last record of a file moved into a vacated slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShift {
    pub from: BlockPointer,
    pub to: BlockPointer,
    pub record: Bytes,
}

/// A file of fixed-size records kept in slotted pages with no holes.
///
/// Every page but the last is full. Appends go to the last page; removing
/// a record moves the file's last record into its slot, so the file shrinks
/// from the end and an emptied last page is dropped from the page count and
/// queued for truncation. Page bookkeeping lives in a [`SnapshotStack`] so
/// transactions can restore it.
#[derive(Debug)]
pub struct RecordFile {
    owner: String,
    column: Option<String>,
    record_size: usize,
    snapshots: SnapshotStack,
}

impl RecordFile {
    /// Opens a file, counting pages from 0 up to the first empty one.
    pub fn open(
        store: &dyn PageStore,
        owner: impl Into<String>,
        column: Option<String>,
        record_size: usize,
    ) -> Result<Self> {
        if SlottedPage::capacity_for(record_size) == 0 {
            return Err(StrataError::InvalidConfig(format!(
                "record size {} does not fit a page",
                record_size
            )));
        }
        let mut file = Self {
            owner: owner.into(),
            column,
            record_size,
            snapshots: SnapshotStack::new(0),
        };

        let mut page_count = 0;
        loop {
            let page = store.get(&file.page_key(PageId::new(page_count)), record_size)?;
            if page.read().is_empty() {
                break;
            }
            page_count += 1;
        }
        file.snapshots = SnapshotStack::new(page_count);
        debug!(file = %file.page_key(PageId::new(0)).file_path(), page_count, "opened record file");
        Ok(file)
    }

    pub fn page_key(&self, page_id: PageId) -> PageKey {
        PageKey {
            owner: self.owner.clone(),
            column: self.column.clone(),
            page_id,
        }
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn records_per_page(&self) -> usize {
        SlottedPage::capacity_for(self.record_size)
    }

    pub fn page_count(&self) -> u32 {
        self.snapshots.current().page_count
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.snapshots.current()
    }

    pub fn begin(&mut self) {
        self.snapshots.begin();
    }

    pub fn commit(&mut self) {
        self.snapshots.commit();
    }

    pub fn rollback(&mut self) {
        self.snapshots.rollback();
    }

    /// Number of vacated pages waiting for truncation.
    pub fn pending_truncation(&self) -> usize {
        self.snapshots.current().deleted.len()
    }

    /// Total number of records.
    pub fn len(&self, store: &dyn PageStore) -> Result<usize> {
        match self.last_page_id() {
            None => Ok(0),
            Some(last) => {
                let page = store.get(&self.page_key(last), self.record_size)?;
                let size = page.read().size();
                Ok(last.as_u32() as usize * self.records_per_page() + size)
            }
        }
    }

    fn last_page_id(&self) -> Option<PageId> {
        self.page_count().checked_sub(1).map(PageId::new)
    }

    fn check_page(&self, at: BlockPointer) -> Result<()> {
        if at.page_id.as_u32() >= self.page_count() {
            return Err(StrataError::InvalidSlot {
                page_id: at.page_id,
                slot: at.slot_id.as_u16(),
                size: 0,
            });
        }
        Ok(())
    }

    /// Appends a record and returns where it was written.
    pub fn append(&mut self, store: &dyn PageStore, record: Bytes) -> Result<BlockPointer> {
        if let Some(last) = self.last_page_id() {
            let page = store.get(&self.page_key(last), self.record_size)?;
            let mut page = page.write();
            if !page.is_full() {
                let slot = page.add(record)?;
                return Ok(BlockPointer::new(last, slot));
            }
        }

        // Anything on disk at this position is stale, start from empty.
        let page_id = PageId::new(self.page_count());
        let page = store.create(&self.page_key(page_id), self.record_size)?;
        let slot = page.write().add(record)?;

        let snapshot = self.snapshots.current_mut();
        snapshot.page_count += 1;
        snapshot.deleted.remove(&page_id);
        debug!(page = %self.page_key(page_id), "allocated page");
        Ok(BlockPointer::new(page_id, slot))
    }

    pub fn get(&self, store: &dyn PageStore, at: BlockPointer) -> Result<Bytes> {
        self.check_page(at)?;
        let page = store.get(&self.page_key(at.page_id), self.record_size)?;
        let record = page.read().get(at.slot_id)?.clone();
        Ok(record)
    }

    /// Overwrites a record in place and returns the old bytes.
    pub fn replace(&self, store: &dyn PageStore, at: BlockPointer, record: Bytes) -> Result<Bytes> {
        self.check_page(at)?;
        let page = store.get(&self.page_key(at.page_id), self.record_size)?;
        let old = page.write().replace(at.slot_id, record)?;
        Ok(old)
    }

    /// Removes the record at `at` and fills its slot with the file's last
    /// record. Returns the removed bytes and, unless `at` was the last
    /// record, where the moved record came from.
    pub fn remove(
        &mut self,
        store: &dyn PageStore,
        at: BlockPointer,
    ) -> Result<(Bytes, Option<RecordShift>)> {
        self.check_page(at)?;
        let Some(last_id) = self.last_page_id() else {
            return Err(StrataError::InvalidSlot {
                page_id: at.page_id,
                slot: at.slot_id.as_u16(),
                size: 0,
            });
        };

        let last_page = store.get(&self.page_key(last_id), self.record_size)?;
        let (removed, shift, emptied) = if at.page_id == last_id {
            let mut page = last_page.write();
            let last_slot = page.last_slot();
            let removed = page.remove(at.slot_id)?;
            let shift = match last_slot {
                Some(last_slot) if last_slot != at.slot_id => Some(RecordShift {
                    from: BlockPointer::new(last_id, last_slot),
                    to: at,
                    record: page.get(at.slot_id)?.clone(),
                }),
                _ => None,
            };
            (removed, shift, page.is_empty())
        } else {
            let target = store.get(&self.page_key(at.page_id), self.record_size)?;
            target.read().get(at.slot_id)?;

            let mut last = last_page.write();
            let last_slot = last.last_slot().ok_or_else(|| StrataError::PageCorrupted {
                page_id: last_id,
                reason: "last page of a record file is empty".to_string(),
            })?;
            let moved = last.remove(last_slot)?;
            let removed = target.write().replace(at.slot_id, moved.clone())?;
            let shift = RecordShift {
                from: BlockPointer::new(last_id, last_slot),
                to: at,
                record: moved,
            };
            (removed, Some(shift), last.is_empty())
        };

        if emptied {
            let snapshot = self.snapshots.current_mut();
            snapshot.page_count -= 1;
            snapshot.deleted.insert(last_id);
            debug!(page = %self.page_key(last_id), "vacated page");
        }
        Ok((removed, shift))
    }

    /// Every record in page and slot order.
    pub fn scan(&self, store: &dyn PageStore) -> Result<Vec<(BlockPointer, Bytes)>> {
        let mut out = Vec::new();
        for id in 0..self.page_count() {
            let page_id = PageId::new(id);
            let page = store.get(&self.page_key(page_id), self.record_size)?;
            let page = page.read();
            out.extend(
                page.iter()
                    .map(|(slot, record)| (BlockPointer::new(page_id, slot), record.clone())),
            );
        }
        Ok(out)
    }

    /// Shrinks the file to its page count once at least `threshold` vacated
    /// pages are waiting. Returns whether it truncated.
    pub fn truncate_if_needed(&mut self, cache: &PageCache, threshold: usize) -> Result<bool> {
        if self.pending_truncation() < threshold.max(1) {
            return Ok(false);
        }
        let page_count = self.page_count();
        cache.truncate(&self.page_key(PageId::new(page_count)), page_count)?;
        self.snapshots.current_mut().deleted.clear();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{SlotId, PAGE_SIZE};
    use crate::storage::disk::MemoryBlockStore;
    use std::sync::Arc;

    const RECORD: usize = 1000;

    fn record(byte: u8) -> Bytes {
        Bytes::from(vec![byte; RECORD])
    }

    fn cache() -> PageCache {
        PageCache::new(16, 1, Arc::new(MemoryBlockStore::new()))
    }

    #[test]
    fn test_record_file_append_fills_pages() {
        let cache = cache();
        let mut file = RecordFile::open(&cache, "t", None, RECORD).unwrap();
        assert_eq!(file.records_per_page(), 4);

        let pointers: Vec<_> = (0..9)
            .map(|i| file.append(&cache, record(i)).unwrap())
            .collect();
        assert_eq!(file.page_count(), 3);
        assert_eq!(pointers[4], BlockPointer::new(PageId::new(1), SlotId::new(0)));
        assert_eq!(file.len(&cache).unwrap(), 9);
        assert_eq!(file.get(&cache, pointers[8]).unwrap(), record(8));
    }

    #[test]
    fn test_record_file_remove_moves_last_record() {
        let cache = cache();
        let mut file = RecordFile::open(&cache, "t", None, RECORD).unwrap();
        let pointers: Vec<_> = (0..5)
            .map(|i| file.append(&cache, record(i)).unwrap())
            .collect();

        let (removed, shift) = file.remove(&cache, pointers[1]).unwrap();
        assert_eq!(removed, record(1));
        let shift = shift.unwrap();
        assert_eq!(shift.from, pointers[4]);
        assert_eq!(shift.to, pointers[1]);
        assert_eq!(file.get(&cache, pointers[1]).unwrap(), record(4));

        // page 1 emptied and is queued for truncation
        assert_eq!(file.page_count(), 1);
        assert_eq!(file.pending_truncation(), 1);
    }

    #[test]
    fn test_record_file_remove_last_has_no_shift() {
        let cache = cache();
        let mut file = RecordFile::open(&cache, "t", None, RECORD).unwrap();
        let a = file.append(&cache, record(1)).unwrap();
        let b = file.append(&cache, record(2)).unwrap();

        let (_, shift) = file.remove(&cache, b).unwrap();
        assert!(shift.is_none());
        let (_, shift) = file.remove(&cache, a).unwrap();
        assert!(shift.is_none());
        assert_eq!(file.page_count(), 0);
        assert!(file.remove(&cache, a).is_err());
    }

    #[test]
    fn test_record_file_reopen_counts_pages() {
        let cache = cache();
        let mut file = RecordFile::open(&cache, "t", Some("c".to_string()), RECORD).unwrap();
        for i in 0..6 {
            file.append(&cache, record(i)).unwrap();
        }
        cache.commit().unwrap();
        cache.rollback();

        let file = RecordFile::open(&cache, "t", Some("c".to_string()), RECORD).unwrap();
        assert_eq!(file.page_count(), 2);
        assert_eq!(file.scan(&cache).unwrap().len(), 6);
    }

    #[test]
    fn test_record_file_rejects_unusable_record_size() {
        let cache = cache();
        for size in [0, PAGE_SIZE] {
            assert!(matches!(
                RecordFile::open(&cache, "t", None, size),
                Err(StrataError::InvalidConfig(_))
            ));
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_file_truncate_threshold() {
        let store = Arc::new(MemoryBlockStore::new());
        let cache = PageCache::new(16, 1, store.clone());
        let mut file = RecordFile::open(&cache, "t", None, RECORD).unwrap();
        let pointers: Vec<_> = (0..8)
            .map(|i| file.append(&cache, record(i)).unwrap())
            .collect();
        cache.commit().unwrap();

        for at in pointers[4..].iter().rev() {
            file.remove(&cache, *at).unwrap();
        }
        assert!(!file.truncate_if_needed(&cache, 2).unwrap());
        assert!(file.truncate_if_needed(&cache, 1).unwrap());
        assert_eq!(store.file_len("t.tbl"), 4096);
        assert_eq!(file.pending_truncation(), 0);
    }
}
