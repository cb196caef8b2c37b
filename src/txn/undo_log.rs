use crate::common::PointerPair;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Remove,
    Update,
}

/// What one logical row mutation did to a single indexed column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    /// Position of the column among the table's indexed columns.
    pub column: usize,
    pub key: Option<Value>,
    pub value: PointerPair,
    /// Value replaced by an update; `None` for inserts and removes.
    pub old_value: Option<PointerPair>,
}

impl ColumnChange {
    pub fn new(column: usize, key: Option<Value>, value: PointerPair) -> Self {
        Self {
            column,
            key,
            value,
            old_value: None,
        }
    }

    pub fn replaced(column: usize, key: Option<Value>, value: PointerPair, old: PointerPair) -> Self {
        Self {
            column,
            key,
            value,
            old_value: Some(old),
        }
    }
}

/// Undo record covering every indexed column touched by one mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub changes: Vec<ColumnChange>,
}

impl Operation {
    pub fn new(kind: OperationKind, changes: Vec<ColumnChange>) -> Self {
        Self { kind, changes }
    }
}

/// Per-table stack of operation segments, one per open transaction.
///
/// Nothing is recorded while no segment is open.
#[derive(Debug, Default)]
pub struct UndoLog {
    segments: Vec<Vec<Operation>>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_recording(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn begin(&mut self) {
        self.segments.push(Vec::new());
    }

    pub fn record(&mut self, operation: Operation) {
        if operation.changes.is_empty() {
            return;
        }
        if let Some(top) = self.segments.last_mut() {
            top.push(operation);
        }
    }

    /// Appends the top segment to the one below so an outer rollback still
    /// undoes it.
    pub fn commit(&mut self) {
        if let Some(top) = self.segments.pop() {
            if let Some(below) = self.segments.last_mut() {
                below.extend(top);
            }
        }
    }

    /// Pops the top segment and returns its operations newest first.
    pub fn rollback(&mut self) -> Vec<Operation> {
        let mut top = self.segments.pop().unwrap_or_default();
        top.reverse();
        top
    }

    /// Operations in the top segment, oldest first.
    pub fn pending(&self) -> &[Operation] {
        self.segments.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BlockPointer, PageId, SlotId};

    fn op(kind: OperationKind, key: i32) -> Operation {
        let ptr = BlockPointer::new(PageId::new(0), SlotId::new(key as u16));
        Operation::new(
            kind,
            vec![ColumnChange::new(0, Some(Value::Integer(key)), PointerPair::row_only(ptr))],
        )
    }

    #[test]
    fn test_undo_log_ignores_outside_transaction() {
        let mut log = UndoLog::new();
        log.record(op(OperationKind::Insert, 1));
        assert!(!log.is_recording());
        assert!(log.rollback().is_empty());
    }

    #[test]
    fn test_undo_log_rollback_newest_first() {
        let mut log = UndoLog::new();
        log.begin();
        log.record(op(OperationKind::Insert, 1));
        log.record(op(OperationKind::Update, 2));
        log.record(op(OperationKind::Remove, 3));

        let undone = log.rollback();
        let kinds: Vec<_> = undone.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::Remove, OperationKind::Update, OperationKind::Insert]
        );
        assert_eq!(log.depth(), 0);
    }

    #[test]
    fn test_undo_log_nested_commit_folds_into_outer() {
        let mut log = UndoLog::new();
        log.begin();
        log.record(op(OperationKind::Insert, 1));
        log.begin();
        log.record(op(OperationKind::Insert, 2));
        log.commit();

        assert_eq!(log.depth(), 1);
        assert_eq!(log.pending().len(), 2);
        assert_eq!(log.rollback()[0], op(OperationKind::Insert, 2));
    }
}
