use bytes::Bytes;
use tracing::debug;

use crate::buffer::{PageCache, PageStore};
use crate::common::{BlockPointer, PointerPair, Result, StrataError, BLOCK_POINTER_SIZE};
use crate::storage::RecordFile;
use crate::txn::Snapshot;
use crate::types::{DataType, Value};

use super::Index;

/// A log record moved into the slot of a removed one. The index entry for
/// `key` that pointed at `from` must now point at `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogShift {
    pub key: Option<Value>,
    pub table_row: BlockPointer,
    pub from: BlockPointer,
    pub to: BlockPointer,
}

/// Durable `(key, row pointer)` records for one indexed column.
///
/// ## Record Format
///
/// ```text
/// +-----------+-------------------+------------------------------+
/// | null flag | row pointer       | key                          |
/// | (0 or 1)  | (6 bytes)         | (data type max size)         |
/// +-----------+-------------------+------------------------------+
/// ```
///
/// The null flag byte exists only for nullable columns. A null key is
/// written as zeros. The log is never queried; [`IndexLogManager::replay`]
/// reads it back in page and slot order to rebuild the in-memory index.
#[derive(Debug)]
pub struct IndexLogManager {
    column: String,
    data_type: DataType,
    nullable: bool,
    file: RecordFile,
}

impl IndexLogManager {
    pub fn record_size(data_type: DataType, nullable: bool) -> usize {
        usize::from(nullable) + BLOCK_POINTER_SIZE + data_type.max_size()
    }

    pub fn open(
        store: &dyn PageStore,
        table: &str,
        column: &str,
        data_type: DataType,
        nullable: bool,
    ) -> Result<Self> {
        let file = RecordFile::open(
            store,
            table,
            Some(column.to_string()),
            Self::record_size(data_type, nullable),
        )?;
        Ok(Self {
            column: column.to_string(),
            data_type,
            nullable,
            file,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn page_count(&self) -> u32 {
        self.file.page_count()
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.file.snapshot()
    }

    pub fn len(&self, store: &dyn PageStore) -> Result<usize> {
        self.file.len(store)
    }

    fn encode(&self, table_row: BlockPointer, key: Option<&Value>) -> Result<Bytes> {
        let mut out = Vec::with_capacity(self.file.record_size());
        if self.nullable {
            out.push(u8::from(key.is_none()));
        }
        table_row.encode(&mut out);
        match key {
            Some(key) => self.data_type.encode(key, &mut out).ok_or_else(|| {
                StrataError::TypeMismatch {
                    column: self.column.clone(),
                    expected: self.data_type.to_string(),
                    found: key.type_name().to_string(),
                }
            })?,
            None if self.nullable => self.data_type.encode_null(&mut out),
            None => return Err(StrataError::NullKey(self.column.clone())),
        }
        Ok(Bytes::from(out))
    }

    fn decode(&self, at: BlockPointer, record: &[u8]) -> Result<(BlockPointer, Option<Value>)> {
        let corrupted = |reason: &str| StrataError::PageCorrupted {
            page_id: at.page_id,
            reason: format!("index log {} slot {}: {}", self.column, at.slot_id.as_u16(), reason),
        };

        let (is_null, rest) = match (self.nullable, record.split_first()) {
            (true, Some((flag, rest))) => (*flag != 0, rest),
            (true, None) => return Err(corrupted("empty record")),
            (false, _) => (false, record),
        };
        let table_row =
            BlockPointer::decode(rest).ok_or_else(|| corrupted("bad row pointer"))?;
        if is_null {
            return Ok((table_row, None));
        }
        let key = self
            .data_type
            .decode(&rest[BLOCK_POINTER_SIZE..])
            .ok_or_else(|| corrupted("bad key"))?;
        Ok((table_row, Some(key)))
    }

    /// Appends a record and returns its pointer.
    pub fn insert(
        &mut self,
        store: &dyn PageStore,
        table_row: BlockPointer,
        key: Option<&Value>,
    ) -> Result<BlockPointer> {
        let record = self.encode(table_row, key)?;
        self.file.append(store, record)
    }

    pub fn read(
        &self,
        store: &dyn PageStore,
        at: BlockPointer,
    ) -> Result<(BlockPointer, Option<Value>)> {
        let record = self.file.get(store, at)?;
        self.decode(at, &record)
    }

    /// Rewrites the row pointer of the record at `at`.
    pub fn update(
        &mut self,
        store: &dyn PageStore,
        at: BlockPointer,
        table_row: BlockPointer,
        key: Option<&Value>,
    ) -> Result<()> {
        let record = self.encode(table_row, key)?;
        self.file.replace(store, at, record)?;
        Ok(())
    }

    /// Removes the record at `at`. The log's last record fills the hole; if
    /// that happened, the returned shift says which index entry to repoint.
    pub fn remove(&mut self, store: &dyn PageStore, at: BlockPointer) -> Result<Option<LogShift>> {
        let (_, shift) = self.file.remove(store, at)?;
        match shift {
            None => Ok(None),
            Some(shift) => {
                let (table_row, key) = self.decode(shift.to, &shift.record)?;
                Ok(Some(LogShift {
                    key,
                    table_row,
                    from: shift.from,
                    to: shift.to,
                }))
            }
        }
    }

    /// Rebuilds `index` from the log. Returns the number of entries loaded.
    pub fn replay(
        &self,
        store: &dyn PageStore,
        index: &mut dyn Index<Value, PointerPair>,
    ) -> Result<usize> {
        index.clear();
        let records = self.file.scan(store)?;
        for (at, record) in &records {
            let (table_row, key) = self.decode(*at, record)?;
            index.insert(key, PointerPair::new(table_row, *at))?;
        }
        debug!(column = %self.column, entries = records.len(), "replayed index log");
        Ok(records.len())
    }

    pub fn begin(&mut self) {
        self.file.begin();
    }

    pub fn commit(&mut self) {
        self.file.commit();
    }

    pub fn rollback(&mut self) {
        self.file.rollback();
    }

    pub fn pending_truncation(&self) -> usize {
        self.file.pending_truncation()
    }

    pub fn truncate_if_needed(&mut self, cache: &PageCache, threshold: usize) -> Result<bool> {
        self.file.truncate_if_needed(cache, threshold)
    }
}
