use tracing::debug;

use crate::buffer::{PageCache, PageStore};
use crate::common::{BlockPointer, PointerPair, Result};
use crate::index::{IndexManager, IndexSpec, IndexStructure, Predicate, RangeMatch};
use crate::types::{Row, Schema, Value};

use super::TableHeap;

/// A table: its row heap plus the indexes kept in step with it.
pub struct Table {
    heap: TableHeap,
    indexes: IndexManager,
}

impl Table {
    pub fn open(
        store: &dyn PageStore,
        name: &str,
        schema: Schema,
        specs: &[IndexSpec],
        default_structure: IndexStructure,
    ) -> Result<Self> {
        let indexes = IndexManager::open(store, name, &schema, specs, default_structure)?;
        let heap = TableHeap::open(store, name, schema)?;
        Ok(Self { heap, indexes })
    }

    pub fn name(&self) -> &str {
        self.heap.name()
    }

    pub fn schema(&self) -> &Schema {
        self.heap.schema()
    }

    pub fn heap(&self) -> &TableHeap {
        &self.heap
    }

    pub fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    pub fn len(&self, store: &dyn PageStore) -> Result<usize> {
        self.heap.len(store)
    }

    pub fn insert_row(&mut self, store: &dyn PageStore, row: &Row) -> Result<BlockPointer> {
        let at = self.heap.insert(store, row)?;
        if let Err(e) = self.indexes.insert_index(store, row, at) {
            // The new row is the heap's last, so removing it moves nothing.
            self.heap.delete(store, at)?;
            return Err(e);
        }
        Ok(at)
    }

    /// Deletes the row at `at` and repoints the indexes of the row that
    /// moved into its slot.
    pub fn delete_row(&mut self, store: &dyn PageStore, at: BlockPointer) -> Result<Row> {
        let row = self.heap.get(store, at)?;
        self.indexes.remove_index(store, &row, at)?;
        let (row, shift) = self.heap.delete(store, at)?;
        if let Some(shift) = shift {
            debug!(table = %self.name(), from = %shift.from, to = %shift.to, "row moved");
            self.indexes.update_index(store, &shift.row, shift.to, shift.from)?;
        }
        Ok(row)
    }

    /// Replaces the row at `at`, keeping its position. Returns the old row.
    ///
    /// If the new row is rejected by an index the old entries are put back
    /// and the heap is left untouched.
    pub fn update_row(
        &mut self,
        store: &dyn PageStore,
        at: BlockPointer,
        row: &Row,
    ) -> Result<Row> {
        row.validate(self.heap.schema())?;
        let old = self.heap.get(store, at)?;
        self.indexes.remove_index(store, &old, at)?;
        if let Err(e) = self.indexes.insert_index(store, row, at) {
            self.indexes.insert_index(store, &old, at)?;
            return Err(e);
        }
        self.heap.update(store, at, row)
    }

    pub fn get_row(&self, store: &dyn PageStore, at: BlockPointer) -> Result<Row> {
        self.heap.get(store, at)
    }

    pub fn scan(&self, store: &dyn PageStore) -> Result<Vec<(BlockPointer, Row)>> {
        self.heap.scan(store)
    }

    pub fn find_block(
        &self,
        column: &str,
        key: Option<&Value>,
    ) -> Result<Vec<(Option<Value>, PointerPair)>> {
        self.indexes.find_block(key, column)
    }

    pub fn is_key_found(&self, column: &str, key: Option<&Value>) -> Result<bool> {
        self.indexes.is_key_found(key, column)
    }

    pub fn get_max(&self, column: &str) -> Result<Option<Value>> {
        self.indexes.get_max(column)
    }

    /// Rows matching `predicate`. Clauses on unindexed columns scan the heap.
    pub fn find_range(
        &self,
        store: &dyn PageStore,
        predicate: &Predicate,
    ) -> Result<Vec<RangeMatch>> {
        let heap = &self.heap;
        self.indexes
            .find_range_index(predicate, &mut |column, lo, hi| {
                let mut matches = Vec::new();
                for (at, row) in heap.scan(store)? {
                    let key = row.value(column);
                    let in_range = match key {
                        None => lo.is_none(),
                        Some(key) => {
                            lo.map_or(true, |lo| key >= lo) && hi.map_or(true, |hi| key <= hi)
                        }
                    };
                    if in_range {
                        matches.push(RangeMatch {
                            key: key.cloned(),
                            value: PointerPair::row_only(at),
                            column,
                        });
                    }
                }
                Ok(matches)
            })
    }

    pub fn begin(&mut self) {
        self.heap.begin();
        self.indexes.begin_transaction();
    }

    pub fn commit(&mut self) {
        self.heap.commit();
        self.indexes.commit();
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.heap.rollback();
        self.indexes.rollback()
    }

    /// Truncates the heap and index log files that have at least `threshold`
    /// vacated pages.
    pub fn truncate_if_needed(&mut self, cache: &PageCache, threshold: usize) -> Result<usize> {
        let mut truncated = self.indexes.truncate_if_needed(cache, threshold)?;
        if self.heap.truncate_if_needed(cache, threshold)? {
            truncated += 1;
        }
        Ok(truncated)
    }
}
