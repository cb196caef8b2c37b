use tracing::{debug, warn};

use crate::buffer::{PageCache, PageStore};
use crate::common::{BlockPointer, PointerPair, Result, StrataError};
use crate::txn::{ColumnChange, Operation, OperationKind, UndoLog};
use crate::types::{DataType, Row, Schema, Value};

use super::predicate::{self, Predicate, RangeMatch};
use super::{create_index, ColumnIndex, Index, IndexKind, IndexLogManager, IndexStructure};

/// Index requested on one column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub column: String,
    pub kind: IndexKind,
    /// Overrides the database default when set.
    pub structure: Option<IndexStructure>,
}

impl IndexSpec {
    pub fn new(column: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            column: column.into(),
            kind,
            structure: None,
        }
    }

    pub fn primary(column: impl Into<String>) -> Self {
        Self::new(column, IndexKind::Primary)
    }

    pub fn unique(column: impl Into<String>) -> Self {
        Self::new(column, IndexKind::Unique)
    }

    pub fn secondary(column: impl Into<String>) -> Self {
        Self::new(column, IndexKind::Secondary)
    }

    pub fn with_structure(mut self, structure: IndexStructure) -> Self {
        self.structure = Some(structure);
        self
    }
}

struct IndexedColumn {
    name: String,
    /// Position in the table schema.
    position: usize,
    data_type: DataType,
    nullable: bool,
    kind: IndexKind,
    index: ColumnIndex,
    log: IndexLogManager,
}

impl IndexedColumn {
    fn key_of(&self, row: &Row) -> Result<Option<Value>> {
        let key = row.value(self.position).cloned();
        match &key {
            None if !self.nullable => Err(StrataError::NullKey(self.name.clone())),
            Some(value) if !self.data_type.accepts(value) => Err(StrataError::TypeMismatch {
                column: self.name.clone(),
                expected: self.data_type.to_string(),
                found: value.type_name().to_string(),
            }),
            _ => Ok(key),
        }
    }

    /// The stored value for `table_row` under `key`.
    fn find_pair(&self, key: Option<&Value>, table_row: BlockPointer) -> Result<PointerPair> {
        self.index
            .search(key)
            .into_iter()
            .map(|(_, value)| value)
            .find(|value| value.table_row == table_row)
            .ok_or_else(|| {
                StrataError::ValueNotFound(format!(
                    "row {} under {:?} in index on {}",
                    table_row, key, self.name
                ))
            })
    }

    /// Swaps `old` for `new` under `key` with the update the index allows.
    fn repoint(&mut self, key: Option<&Value>, new: PointerPair, old: &PointerPair) -> Result<()> {
        if self.index.is_unique() {
            self.index.update(key, new)
        } else {
            self.index.update_value(key, new, old)
        }
    }
}

/// The indexes of one table, each paired with its durable log.
///
/// Multi-column operations validate every column before touching any of
/// them and record one undo [`Operation`] per mutation while a transaction
/// is open.
pub struct IndexManager {
    table: String,
    schema: Schema,
    columns: Vec<IndexedColumn>,
    undo: UndoLog,
}

impl IndexManager {
    /// Builds the indexes named by `specs` and fills them from their logs.
    pub fn open(
        store: &dyn PageStore,
        table: &str,
        schema: &Schema,
        specs: &[IndexSpec],
        default_structure: IndexStructure,
    ) -> Result<Self> {
        let mut columns: Vec<IndexedColumn> = Vec::with_capacity(specs.len());
        for spec in specs {
            let (position, column) = schema
                .columns()
                .enumerate()
                .find(|(_, column)| column.name() == spec.column)
                .ok_or_else(|| StrataError::ColumnNotFound(spec.column.clone()))?;
            if columns.iter().any(|c| c.position == position) {
                return Err(StrataError::IndexConfiguration(format!(
                    "column {} indexed twice",
                    spec.column
                )));
            }

            let index = create_index(
                &format!("{}.{}", table, column.name()),
                spec.kind,
                column.data_type(),
                column.is_nullable(),
                spec.structure.unwrap_or(default_structure),
            )?;
            let log = IndexLogManager::open(
                store,
                table,
                column.name(),
                column.data_type(),
                column.is_nullable(),
            )?;
            columns.push(IndexedColumn {
                name: column.name().to_string(),
                position,
                data_type: column.data_type(),
                nullable: column.is_nullable(),
                kind: spec.kind,
                index,
                log,
            });
        }

        let mut manager = Self {
            table: table.to_string(),
            schema: schema.clone(),
            columns,
            undo: UndoLog::new(),
        };
        manager.initialize(store)?;
        Ok(manager)
    }

    /// Clears every index and replays its log. Returns the entries loaded.
    pub fn initialize(&mut self, store: &dyn PageStore) -> Result<usize> {
        let mut total = 0;
        for column in &mut self.columns {
            total += column.log.replay(store, column.index.as_mut())?;
        }
        debug!(table = %self.table, indexes = self.columns.len(), entries = total, "initialized indexes");
        Ok(total)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn indexed_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn kind(&self, column: &str) -> Option<IndexKind> {
        self.find_column(column).map(|c| c.kind)
    }

    pub fn index(&self, column: &str) -> Option<&dyn Index<Value, PointerPair>> {
        self.find_column(column).map(|c| c.index.as_ref())
    }

    pub fn log(&self, column: &str) -> Option<&IndexLogManager> {
        self.find_column(column).map(|c| &c.log)
    }

    /// Open transaction segments.
    pub fn depth(&self) -> usize {
        self.undo.depth()
    }

    /// Undo records waiting in the innermost open transaction.
    pub fn pending_operations(&self) -> &[Operation] {
        self.undo.pending()
    }

    fn find_column(&self, column: &str) -> Option<&IndexedColumn> {
        self.columns.iter().find(|c| c.name == column)
    }

    fn indexed(&self, column: &str) -> Result<&IndexedColumn> {
        self.find_column(column).ok_or_else(|| {
            StrataError::ColumnNotFound(format!("{}.{} has no index", self.table, column))
        })
    }

    /// Adds `row` to every index.
    ///
    /// Nothing is applied unless every key is valid. Should a later column
    /// still fail, the columns already written are taken back.
    pub fn insert_index(
        &mut self,
        store: &dyn PageStore,
        row: &Row,
        table_row: BlockPointer,
    ) -> Result<()> {
        let mut keys = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let key = column.key_of(row)?;
            if column.index.is_unique() && column.index.is_key(key.as_ref()) {
                return Err(StrataError::DuplicateKey {
                    column: column.name.clone(),
                    key: format!("{:?}", key),
                });
            }
            keys.push(key);
        }

        let mut changes: Vec<ColumnChange> = Vec::with_capacity(keys.len());
        for (i, key) in keys.into_iter().enumerate() {
            match self.insert_column(store, i, key.as_ref(), table_row) {
                Ok(value) => changes.push(ColumnChange::new(i, key, value)),
                Err(e) => {
                    self.take_back(store, &changes);
                    return Err(e);
                }
            }
        }
        self.undo.record(Operation::new(OperationKind::Insert, changes));
        Ok(())
    }

    fn insert_column(
        &mut self,
        store: &dyn PageStore,
        i: usize,
        key: Option<&Value>,
        table_row: BlockPointer,
    ) -> Result<PointerPair> {
        let column = &mut self.columns[i];
        let log_ptr = column.log.insert(store, table_row, key)?;
        let value = PointerPair::new(table_row, log_ptr);
        if let Err(e) = column.index.insert(key.cloned(), value) {
            // Just appended, so this is the log's last record and nothing moves.
            column.log.remove(store, log_ptr)?;
            return Err(e);
        }
        Ok(value)
    }

    fn take_back(&mut self, store: &dyn PageStore, changes: &[ColumnChange]) {
        for change in changes.iter().rev() {
            let column = &mut self.columns[change.column];
            column.index.remove(change.key.as_ref(), &change.value);
            if let Some(at) = change.value.index_log {
                if let Err(e) = column.log.remove(store, at) {
                    warn!(column = %column.name, error = %e, "failed to take back index log record");
                }
            }
        }
    }

    /// Removes `row` from every index.
    ///
    /// Each log removal may move the log's last record; the moved record's
    /// index entry is repointed and recorded as an update before the removal
    /// itself, so a rollback puts the key back first and then undoes the move.
    pub fn remove_index(
        &mut self,
        store: &dyn PageStore,
        row: &Row,
        table_row: BlockPointer,
    ) -> Result<()> {
        let mut targets = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let key = column.key_of(row)?;
            let value = column.find_pair(key.as_ref(), table_row)?;
            targets.push((key, value));
        }

        let mut shifts = Vec::new();
        let mut removed = Vec::with_capacity(targets.len());
        let result = self.remove_columns(store, targets, &mut shifts, &mut removed);
        self.undo.record(Operation::new(OperationKind::Update, shifts));
        self.undo.record(Operation::new(OperationKind::Remove, removed));
        result
    }

    fn remove_columns(
        &mut self,
        store: &dyn PageStore,
        targets: Vec<(Option<Value>, PointerPair)>,
        shifts: &mut Vec<ColumnChange>,
        removed: &mut Vec<ColumnChange>,
    ) -> Result<()> {
        for (i, (key, value)) in targets.into_iter().enumerate() {
            let column = &mut self.columns[i];
            if let Some(at) = value.index_log {
                if let Some(shift) = column.log.remove(store, at)? {
                    let old = PointerPair::new(shift.table_row, shift.from);
                    let new = PointerPair::new(shift.table_row, shift.to);
                    column.repoint(shift.key.as_ref(), new, &old)?;
                    shifts.push(ColumnChange::replaced(i, shift.key, new, old));
                }
            }
            column.index.remove(key.as_ref(), &value);
            removed.push(ColumnChange::new(i, key, value));
        }
        Ok(())
    }

    /// Moves the entries of `row` from `old_row` to `new_row` in every index
    /// and its log.
    pub fn update_index(
        &mut self,
        store: &dyn PageStore,
        row: &Row,
        new_row: BlockPointer,
        old_row: BlockPointer,
    ) -> Result<()> {
        let mut targets = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let key = column.key_of(row)?;
            let value = column.find_pair(key.as_ref(), old_row)?;
            targets.push((key, value));
        }

        let mut changes = Vec::with_capacity(targets.len());
        let result = self.relocate_columns(store, targets, new_row, &mut changes);
        self.undo.record(Operation::new(OperationKind::Update, changes));
        result
    }

    fn relocate_columns(
        &mut self,
        store: &dyn PageStore,
        targets: Vec<(Option<Value>, PointerPair)>,
        new_row: BlockPointer,
        changes: &mut Vec<ColumnChange>,
    ) -> Result<()> {
        for (i, (key, old)) in targets.into_iter().enumerate() {
            let column = &mut self.columns[i];
            let new = PointerPair {
                table_row: new_row,
                index_log: old.index_log,
            };
            if let Some(at) = old.index_log {
                column.log.update(store, at, new_row, key.as_ref())?;
            }
            column.repoint(key.as_ref(), new, &old)?;
            changes.push(ColumnChange::replaced(i, key, new, old));
        }
        Ok(())
    }

    pub fn find_block(
        &self,
        key: Option<&Value>,
        column: &str,
    ) -> Result<Vec<(Option<Value>, PointerPair)>> {
        Ok(self.indexed(column)?.index.search(key))
    }

    pub fn is_key_found(&self, key: Option<&Value>, column: &str) -> Result<bool> {
        Ok(self.indexed(column)?.index.is_key(key))
    }

    pub fn get_max(&self, column: &str) -> Result<Option<Value>> {
        Ok(self.indexed(column)?.index.get_max())
    }

    /// Evaluates `predicate` with a range search per clause.
    ///
    /// Clauses on columns without an index go to `scan`, called with the
    /// column's schema position and the clause bounds. AND keeps the first
    /// clause's matches whose row every other clause also matched; OR
    /// appends unseen rows in clause order.
    pub fn find_range_index(
        &self,
        predicate: &Predicate,
        scan: &mut dyn FnMut(usize, Option<&Value>, Option<&Value>) -> Result<Vec<RangeMatch>>,
    ) -> Result<Vec<RangeMatch>> {
        match predicate {
            Predicate::Range { column, lo, hi } => {
                self.find_clause(column, lo.as_ref(), hi.as_ref(), scan)
            }
            Predicate::Eq { column, value } => {
                self.find_clause(column, Some(value), Some(value), scan)
            }
            Predicate::And(clauses) => {
                let mut clauses = clauses.iter();
                let Some(first) = clauses.next() else {
                    return Ok(Vec::new());
                };
                let mut matches = self.find_range_index(first, scan)?;
                for clause in clauses {
                    if matches.is_empty() {
                        break;
                    }
                    let other = self.find_range_index(clause, scan)?;
                    matches = predicate::intersect(matches, &other);
                }
                Ok(matches)
            }
            Predicate::Or(clauses) => {
                let mut matches = Vec::new();
                for clause in clauses {
                    matches = predicate::union(matches, self.find_range_index(clause, scan)?);
                }
                Ok(matches)
            }
        }
    }

    fn find_clause(
        &self,
        column: &str,
        lo: Option<&Value>,
        hi: Option<&Value>,
        scan: &mut dyn FnMut(usize, Option<&Value>, Option<&Value>) -> Result<Vec<RangeMatch>>,
    ) -> Result<Vec<RangeMatch>> {
        let position = self
            .schema
            .column_index(column)
            .ok_or_else(|| StrataError::ColumnNotFound(column.to_string()))?;
        match self.columns.iter().find(|c| c.position == position) {
            Some(indexed) => Ok(indexed
                .index
                .range_search(lo, hi)
                .into_iter()
                .map(|(key, value)| RangeMatch {
                    key,
                    value,
                    column: position,
                })
                .collect()),
            None => scan(position, lo, hi),
        }
    }

    pub fn begin_transaction(&mut self) {
        self.undo.begin();
        for column in &mut self.columns {
            column.log.begin();
        }
    }

    pub fn commit(&mut self) {
        self.undo.commit();
        for column in &mut self.columns {
            column.log.commit();
        }
    }

    /// Restores the log snapshots and undoes the innermost transaction's
    /// index changes, newest first.
    pub fn rollback(&mut self) -> Result<()> {
        for column in &mut self.columns {
            column.log.rollback();
        }
        let operations = self.undo.rollback();
        let undone = operations.len();
        let mut first_error = None;
        for operation in operations {
            if let Err(e) = self.undo_operation(operation) {
                warn!(table = %self.table, error = %e, "undo failed");
                first_error.get_or_insert(e);
            }
        }
        debug!(table = %self.table, undone, "rolled back index changes");
        first_error.map_or(Ok(()), Err)
    }

    fn undo_operation(&mut self, operation: Operation) -> Result<()> {
        for change in operation.changes.into_iter().rev() {
            let column = &mut self.columns[change.column];
            match operation.kind {
                OperationKind::Insert => {
                    column.index.remove(change.key.as_ref(), &change.value);
                }
                OperationKind::Remove => column.index.insert(change.key, change.value)?,
                OperationKind::Update => {
                    if let Some(old) = change.old_value {
                        column.repoint(change.key.as_ref(), old, &change.value)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Truncates the logs with enough vacated pages. Returns how many were
    /// truncated.
    pub fn truncate_if_needed(&mut self, cache: &PageCache, threshold: usize) -> Result<usize> {
        let mut truncated = 0;
        for column in &mut self.columns {
            if column.log.truncate_if_needed(cache, threshold)? {
                truncated += 1;
            }
        }
        Ok(truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, SlotId};
    use crate::storage::disk::MemoryBlockStore;
    use std::sync::Arc;

    fn schema() -> Schema {
        Schema::builder()
            .column("id", DataType::Integer)
            .nullable_column("tag", DataType::VarChar(8))
            .build()
    }

    fn ptr(slot: u16) -> BlockPointer {
        BlockPointer::new(PageId::new(0), SlotId::new(slot))
    }

    fn row(id: i32, tag: Option<&str>) -> Row {
        Row::new(vec![Some(Value::Integer(id)), tag.map(Value::from)])
    }

    fn manager(cache: &PageCache) -> IndexManager {
        IndexManager::open(
            cache,
            "t",
            &schema(),
            &[IndexSpec::primary("id"), IndexSpec::secondary("tag")],
            IndexStructure::BPlusTree,
        )
        .unwrap()
    }

    #[test]
    fn test_index_manager_rejects_bad_specs() {
        let cache = PageCache::new(8, 1, Arc::new(MemoryBlockStore::new()));
        let missing = IndexManager::open(
            &cache,
            "t",
            &schema(),
            &[IndexSpec::primary("nope")],
            IndexStructure::BPlusTree,
        );
        assert!(matches!(missing, Err(StrataError::ColumnNotFound(_))));

        let nullable_primary = IndexManager::open(
            &cache,
            "t",
            &schema(),
            &[IndexSpec::primary("tag")],
            IndexStructure::BPlusTree,
        );
        assert!(matches!(nullable_primary, Err(StrataError::IndexConfiguration(_))));
    }

    #[test]
    fn test_remove_repoints_moved_log_record() {
        let cache = PageCache::new(8, 1, Arc::new(MemoryBlockStore::new()));
        let mut manager = manager(&cache);
        for i in 0..3 {
            manager
                .insert_index(&cache, &row(i, Some("x")), ptr(i as u16))
                .unwrap();
        }

        manager.remove_index(&cache, &row(0, Some("x")), ptr(0)).unwrap();

        // id 2's log record moved into the slot id 0 held
        let hit = manager.find_block(Some(&Value::Integer(2)), "id").unwrap();
        let log_ptr = hit[0].1.index_log.unwrap();
        assert_eq!(log_ptr.slot_id, SlotId::new(0));
        let log = manager.log("id").unwrap();
        assert_eq!(
            log.read(&cache, log_ptr).unwrap(),
            (ptr(2), Some(Value::Integer(2)))
        );
        assert_eq!(manager.index("tag").unwrap().size(), 2);
    }

    #[test]
    fn test_rollback_restores_indexes() {
        let cache = PageCache::new(8, 1, Arc::new(MemoryBlockStore::new()));
        let mut manager = manager(&cache);
        manager.insert_index(&cache, &row(1, Some("a")), ptr(0)).unwrap();
        manager.insert_index(&cache, &row(2, None), ptr(1)).unwrap();
        let before_id = manager.index("id").unwrap().entries();
        let before_tag = manager.index("tag").unwrap().entries();

        manager.begin_transaction();
        manager.remove_index(&cache, &row(1, Some("a")), ptr(0)).unwrap();
        manager.update_index(&cache, &row(2, None), ptr(0), ptr(1)).unwrap();
        manager.insert_index(&cache, &row(3, Some("a")), ptr(1)).unwrap();
        assert_eq!(manager.pending_operations().len(), 4);
        manager.rollback().unwrap();

        assert_eq!(manager.index("id").unwrap().entries(), before_id);
        assert_eq!(manager.index("tag").unwrap().entries(), before_tag);
        assert_eq!(manager.depth(), 0);
    }

    #[test]
    fn test_find_range_falls_back_to_scan() {
        let cache = PageCache::new(8, 1, Arc::new(MemoryBlockStore::new()));
        let schema = schema();
        let mut manager = IndexManager::open(
            &cache,
            "t",
            &schema,
            &[IndexSpec::primary("id")],
            IndexStructure::SkipList,
        )
        .unwrap();
        for i in 0..4 {
            manager.insert_index(&cache, &row(i * 10, None), ptr(i as u16)).unwrap();
        }

        let mut scanned = Vec::new();
        let predicate = Predicate::range("id", Some(Value::Integer(5)), Some(Value::Integer(25)))
            .and(Predicate::equals("tag", "z"));
        let matches = manager
            .find_range_index(&predicate, &mut |column, _, _| {
                scanned.push(column);
                Ok(vec![RangeMatch {
                    key: Some(Value::from("z")),
                    value: PointerPair::row_only(ptr(2)),
                    column,
                }])
            })
            .unwrap();

        assert_eq!(scanned, vec![1]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key, Some(Value::Integer(20)));
        assert_eq!(matches[0].column, 0);
    }
}
