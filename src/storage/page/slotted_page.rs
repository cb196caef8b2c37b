use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::{PageId, Result, SlotId, StrataError, PAGE_HEADER_SIZE, PAGE_SIZE};

/// Slotted page layout:
///
/// +---------------------------+
/// | page_id: i32              |
/// | entry_count: i16          |
/// | space_in_use: i32         |
/// | header_size: i32          |  (PAGE_HEADER_SIZE bytes)
/// +---------------------------+
/// | slot 0                    |
/// | slot 1                    |  fixed-size records, no holes
/// | ...                       |
/// | slot entry_count - 1      |
/// +---------------------------+
/// | unused tail               |
/// +---------------------------+
///
/// Every record on a page has the same size. Removing a slot other than the
/// last moves the last record into the freed slot, so live records always
/// occupy slots `0..entry_count`.
#[derive(Debug, Clone)]
pub struct SlottedPage {
    page_id: PageId,
    record_size: usize,
    entries: Vec<Bytes>,
    space_in_use: usize,
    dirty: bool,
}

impl SlottedPage {
    /// Creates an empty page for records of `record_size` bytes.
    pub fn new(page_id: PageId, record_size: usize) -> Self {
        debug_assert!(record_size > 0 && record_size <= PAGE_SIZE - PAGE_HEADER_SIZE);
        Self {
            page_id,
            record_size,
            entries: Vec::new(),
            space_in_use: 0,
            dirty: false,
        }
    }

    /// Number of records of `record_size` bytes that fit on one page.
    /// Zero-width records fit nowhere.
    pub fn capacity_for(record_size: usize) -> usize {
        (PAGE_SIZE - PAGE_HEADER_SIZE)
            .checked_div(record_size)
            .unwrap_or(0)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn capacity(&self) -> usize {
        Self::capacity_for(self.record_size)
    }

    /// Number of live records.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity()
    }

    pub fn space_in_use(&self) -> usize {
        self.space_in_use
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Slot of the last live record.
    pub fn last_slot(&self) -> Option<SlotId> {
        self.entries
            .len()
            .checked_sub(1)
            .map(|last| SlotId::new(last as u16))
    }

    fn check_record(&self, entry: &[u8]) -> Result<()> {
        if entry.len() != self.record_size {
            return Err(StrataError::RecordSize {
                expected: self.record_size,
                actual: entry.len(),
            });
        }
        Ok(())
    }

    fn invalid_slot(&self, slot: SlotId) -> StrataError {
        StrataError::InvalidSlot {
            page_id: self.page_id,
            slot: slot.as_u16(),
            size: self.entries.len() as u16,
        }
    }

    /// Appends a record and returns the slot it was written to.
    pub fn add(&mut self, entry: Bytes) -> Result<SlotId> {
        self.check_record(&entry)?;
        if self.is_full() {
            return Err(StrataError::PageFull(self.page_id));
        }
        let slot = SlotId::new(self.entries.len() as u16);
        self.entries.push(entry);
        self.space_in_use += self.record_size;
        self.dirty = true;
        Ok(slot)
    }

    /// Writes a record into a specific slot.
    ///
    /// Fails if the slot already holds a record. Only the first free slot may
    /// be written, otherwise the page would have a hole.
    pub fn add_at(&mut self, slot: SlotId, entry: Bytes) -> Result<()> {
        let index = slot.as_usize();
        if index < self.entries.len() {
            return Err(StrataError::SlotOccupied {
                page_id: self.page_id,
                slot: slot.as_u16(),
            });
        }
        if index > self.entries.len() {
            return Err(self.invalid_slot(slot));
        }
        self.add(entry).map(|_| ())
    }

    pub fn get(&self, slot: SlotId) -> Result<&Bytes> {
        self.entries
            .get(slot.as_usize())
            .ok_or_else(|| self.invalid_slot(slot))
    }

    /// Overwrites the record in an occupied slot and returns the old one.
    pub fn replace(&mut self, slot: SlotId, entry: Bytes) -> Result<Bytes> {
        self.check_record(&entry)?;
        let index = slot.as_usize();
        if index >= self.entries.len() {
            return Err(self.invalid_slot(slot));
        }
        self.dirty = true;
        Ok(std::mem::replace(&mut self.entries[index], entry))
    }

    /// Removes the record in `slot`.
    ///
    /// If `slot` is not the last slot, the last record moves into `slot`;
    /// its pointer changes from `(page, size - 1)` to `(page, slot)`.
    pub fn remove(&mut self, slot: SlotId) -> Result<Bytes> {
        let index = slot.as_usize();
        if index >= self.entries.len() {
            return Err(self.invalid_slot(slot));
        }
        let removed = self.entries.swap_remove(index);
        self.space_in_use -= self.record_size;
        self.dirty = true;
        Ok(removed)
    }

    pub fn remove_last(&mut self) -> Option<Bytes> {
        let removed = self.entries.pop()?;
        self.space_in_use -= self.record_size;
        self.dirty = true;
        Some(removed)
    }

    /// Iterates over live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &Bytes)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (SlotId::new(i as u16), entry))
    }

    /// Deep copy with every record duplicated; the dirty flag carries over.
    pub fn deep_copy(&self) -> Self {
        Self {
            page_id: self.page_id,
            record_size: self.record_size,
            entries: self
                .entries
                .iter()
                .map(|entry| Bytes::copy_from_slice(entry))
                .collect(),
            space_in_use: self.space_in_use,
            dirty: self.dirty,
        }
    }

    /// Serializes to exactly `PAGE_SIZE` bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PAGE_SIZE);
        buf.put_i32_le(self.page_id.as_u32() as i32);
        buf.put_i16_le(self.entries.len() as i16);
        buf.put_i32_le(self.space_in_use as i32);
        buf.put_i32_le(PAGE_HEADER_SIZE as i32);
        for entry in &self.entries {
            buf.put_slice(entry);
        }
        buf.resize(PAGE_SIZE, 0);
        buf.freeze()
    }

    /// Deserializes a page read from storage.
    ///
    /// A missing or zero-filled block yields an empty page. Space in use is
    /// recomputed from the records read and must match the stored header.
    pub fn from_bytes(page_id: PageId, record_size: usize, data: &[u8]) -> Result<Self> {
        if data.len() < PAGE_HEADER_SIZE || data[..PAGE_HEADER_SIZE].iter().all(|&b| b == 0) {
            return Ok(Self::new(page_id, record_size));
        }

        let corrupted = |reason: String| StrataError::PageCorrupted { page_id, reason };

        let mut header = &data[..PAGE_HEADER_SIZE];
        let stored_id = header.get_i32_le();
        let entry_count = header.get_i16_le();
        let stored_space = header.get_i32_le();
        let header_size = header.get_i32_le();

        if header_size != PAGE_HEADER_SIZE as i32 {
            return Err(corrupted(format!("header size {}", header_size)));
        }
        if stored_id != page_id.as_u32() as i32 {
            return Err(corrupted(format!("stored page id {}", stored_id)));
        }
        let capacity = Self::capacity_for(record_size);
        if entry_count < 0 || entry_count as usize > capacity {
            return Err(corrupted(format!(
                "entry count {} outside capacity {}",
                entry_count, capacity
            )));
        }

        let count = entry_count as usize;
        let body_end = PAGE_HEADER_SIZE + count * record_size;
        if data.len() < body_end {
            return Err(corrupted(format!(
                "{} bytes cannot hold {} records",
                data.len(),
                count
            )));
        }

        let entries: Vec<Bytes> = data[PAGE_HEADER_SIZE..body_end]
            .chunks_exact(record_size)
            .map(Bytes::copy_from_slice)
            .collect();
        let space_in_use = entries.len() * record_size;
        if stored_space < 0 || space_in_use != stored_space as usize {
            return Err(corrupted(format!(
                "space in use {} but header says {}",
                space_in_use, stored_space
            )));
        }

        Ok(Self {
            page_id,
            record_size,
            entries,
            space_in_use,
            dirty: false,
        })
    }
}
