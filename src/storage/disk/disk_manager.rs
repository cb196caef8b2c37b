use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::common::Result;

use super::BlockStore;

/// DiskManager reads and writes byte ranges of the files under one data
/// directory. Files are opened lazily on first access and kept open.
pub struct DiskManager {
    /// Root directory all block paths are relative to
    root: PathBuf,
    /// Open file handles keyed by relative path
    files: Mutex<HashMap<String, File>>,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
    /// Number of truncations performed
    num_truncates: AtomicU32,
}

impl DiskManager {
    /// Creates a DiskManager rooted at `root`, creating the directory if
    /// it doesn't exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            files: Mutex::new(HashMap::new()),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            num_truncates: AtomicU32::new(0),
        })
    }

    /// Runs `f` against the open handle for `path`.
    fn with_file<T>(&self, path: &str, f: impl FnOnce(&mut File) -> Result<T>) -> Result<T> {
        let mut files = self.files.lock();
        let file = match files.entry(path.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(self.root.join(path))?,
            ),
        };
        f(file)
    }

    /// Returns the length of a file in bytes.
    pub fn file_len(&self, path: &str) -> Result<u64> {
        self.with_file(path, |file| Ok(file.metadata()?.len()))
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

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Flushes every open file to disk.
    pub fn sync(&self) -> Result<()> {
        let files = self.files.lock();
        for file in files.values() {
            file.sync_all()?;
        }
        Ok(())
    }
}

impl BlockStore for DiskManager {
    fn read_block(&self, path: &str, offset: u64, max_len: usize) -> Result<Option<Bytes>> {
        let data = self.with_file(path, |file| {
            let len = file.metadata()?.len();
            if offset >= len {
                return Ok(None);
            }
            let to_read = ((len - offset) as usize).min(max_len);
            let mut buf = vec![0u8; to_read];
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
            Ok(Some(Bytes::from(buf)))
        })?;
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }

    fn write_block(&self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        self.with_file(path, |file| {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;
            file.flush()?;
            Ok(())
        })?;
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn truncate(&self, path: &str, len: u64) -> Result<()> {
        self.with_file(path, |file| {
            file.set_len(len)?;
            Ok(())
        })?;
        self.num_truncates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        for file in self.files.get_mut().values() {
            let _ = file.sync_all();
        }
    }
}
