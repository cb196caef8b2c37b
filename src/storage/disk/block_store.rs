use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::common::Result;

/// Path-addressed byte-range storage.
///
/// Offsets are byte offsets; a page lives at `page_id * PAGE_SIZE`.
pub trait BlockStore: Send + Sync {
    /// Reads up to `max_len` bytes at `offset`.
    /// Returns None if `offset` is at or past the end of the file; the result
    /// may be shorter than `max_len` near the end.
    fn read_block(&self, path: &str, offset: u64, max_len: usize) -> Result<Option<Bytes>>;

    /// Writes `data` at `offset`, extending the file if needed.
    fn write_block(&self, path: &str, offset: u64, data: &[u8]) -> Result<()>;

    /// Shrinks (or extends) the file to `len` bytes.
    fn truncate(&self, path: &str, len: u64) -> Result<()>;
}

/// In-memory block store that keeps I/O counters per operation kind.
#[derive(Default)]
pub struct MemoryBlockStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
    num_truncates: AtomicU32,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of a file, 0 if it was never written.
    pub fn file_len(&self, path: &str) -> u64 {
        self.files
            .lock()
            .get(path)
            .map(|data| data.len() as u64)
            .unwrap_or(0)
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn get_num_truncates(&self) -> u32 {
        self.num_truncates.load(Ordering::Relaxed)
    }
}

impl BlockStore for MemoryBlockStore {
    fn read_block(&self, path: &str, offset: u64, max_len: usize) -> Result<Option<Bytes>> {
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        let files = self.files.lock();
        let Some(data) = files.get(path) else {
            return Ok(None);
        };
        let start = offset as usize;
        if start >= data.len() {
            return Ok(None);
        }
        let end = (start + max_len).min(data.len());
        Ok(Some(Bytes::copy_from_slice(&data[start..end])))
    }

    fn write_block(&self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        let mut files = self.files.lock();
        let file = files.entry(path.to_string()).or_default();
        let start = offset as usize;
        let end = start + data.len();
        if file.len() < end {
            file.resize(end, 0);
        }
        file[start..end].copy_from_slice(data);
        Ok(())
    }

    fn truncate(&self, path: &str, len: u64) -> Result<()> {
        self.num_truncates.fetch_add(1, Ordering::Relaxed);
        let mut files = self.files.lock();
        files.entry(path.to_string()).or_default().resize(len as usize, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_block_store_read_write() {
        let store = MemoryBlockStore::new();
        assert_eq!(store.read_block("t.tbl", 0, 16).unwrap(), None);

        store.write_block("t.tbl", 4, b"abcd").unwrap();
        assert_eq!(store.file_len("t.tbl"), 8);

        let block = store.read_block("t.tbl", 2, 16).unwrap().unwrap();
        assert_eq!(&block[..], &[0, 0, b'a', b'b', b'c', b'd']);
        assert_eq!(store.get_num_writes(), 1);
        assert_eq!(store.get_num_reads(), 2);
    }

    #[test]
    fn test_memory_block_store_truncate() {
        let store = MemoryBlockStore::new();
        store.write_block("t.tbl", 0, &[1u8; 32]).unwrap();
        store.truncate("t.tbl", 8).unwrap();
        assert_eq!(store.file_len("t.tbl"), 8);
        assert_eq!(store.read_block("t.tbl", 8, 8).unwrap(), None);
    }
}
