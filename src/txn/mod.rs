mod snapshot;
mod undo_log;

pub use snapshot::{Snapshot, SnapshotStack};
pub use undo_log::{ColumnChange, Operation, OperationKind, UndoLog};
