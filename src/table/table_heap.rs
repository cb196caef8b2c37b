use tracing::debug;

use crate::buffer::{PageCache, PageStore};
use crate::common::{BlockPointer, Result, StrataError};
use crate::storage::RecordFile;
use crate::txn::Snapshot;
use crate::types::{Row, Schema};

/// The table's last row moved into the slot of a deleted one.
#[derive(Debug, Clone, PartialEq)]
pub struct RowShift {
    pub from: BlockPointer,
    pub to: BlockPointer,
    pub row: Row,
}

/// Rows of one table, stored at a fixed width in slotted pages.
///
/// Deletes fill the hole with the table's last row, so the heap never has
/// gaps and only its last page can be partly filled.
#[derive(Debug)]
pub struct TableHeap {
    name: String,
    schema: Schema,
    file: RecordFile,
}

impl TableHeap {
    pub fn open(store: &dyn PageStore, name: &str, schema: Schema) -> Result<Self> {
        let file = RecordFile::open(store, name, None, schema.row_size())?;
        debug!(table = name, pages = file.page_count(), row_size = schema.row_size(), "opened table heap");
        Ok(Self {
            name: name.to_string(),
            schema,
            file,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn page_count(&self) -> u32 {
        self.file.page_count()
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.file.snapshot()
    }

    pub fn rows_per_page(&self) -> usize {
        self.file.records_per_page()
    }

    pub fn len(&self, store: &dyn PageStore) -> Result<usize> {
        self.file.len(store)
    }

    fn decode(&self, at: BlockPointer, data: &[u8]) -> Result<Row> {
        Row::from_bytes(&self.schema, data).ok_or_else(|| StrataError::PageCorrupted {
            page_id: at.page_id,
            reason: format!("undecodable row in {} slot {}", self.name, at.slot_id.as_u16()),
        })
    }

    pub fn insert(&mut self, store: &dyn PageStore, row: &Row) -> Result<BlockPointer> {
        let record = row.to_bytes(&self.schema)?;
        self.file.append(store, record)
    }

    pub fn get(&self, store: &dyn PageStore, at: BlockPointer) -> Result<Row> {
        let record = self.file.get(store, at)?;
        self.decode(at, &record)
    }

    /// Overwrites the row at `at` and returns the old one.
    pub fn update(&mut self, store: &dyn PageStore, at: BlockPointer, row: &Row) -> Result<Row> {
        let record = row.to_bytes(&self.schema)?;
        let old = self.file.replace(store, at, record)?;
        self.decode(at, &old)
    }

    /// Deletes the row at `at`. Returns it along with the move of the last
    /// row into its slot, if one happened.
    pub fn delete(
        &mut self,
        store: &dyn PageStore,
        at: BlockPointer,
    ) -> Result<(Row, Option<RowShift>)> {
        let (removed, shift) = self.file.remove(store, at)?;
        let row = self.decode(at, &removed)?;
        let shift = match shift {
            None => None,
            Some(shift) => Some(RowShift {
                row: self.decode(shift.to, &shift.record)?,
                from: shift.from,
                to: shift.to,
            }),
        };
        Ok((row, shift))
    }

    pub fn scan(&self, store: &dyn PageStore) -> Result<Vec<(BlockPointer, Row)>> {
        self.file
            .scan(store)?
            .into_iter()
            .map(|(at, record)| Ok((at, self.decode(at, &record)?)))
            .collect()
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
