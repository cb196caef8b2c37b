use thiserror::Error;

use super::types::{PageId, PageKey};

/// Storage engine error types
#[derive(Error, Debug)]
pub enum StrataError {
    // Validation
    #[error("Duplicate key {key} in unique index on {column}")]
    DuplicateKey { column: String, key: String },

    #[error("Null key not allowed in index on {0}")]
    NullKey(String),

    #[error("Type mismatch on {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    // Not found
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Value not found under key {0}")]
    ValueNotFound(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    #[error("Column {0} not found")]
    ColumnNotFound(String),

    // Capacity
    #[error("Page {0} is full")]
    PageFull(PageId),

    #[error("Slot {slot} of page {page_id} is already occupied")]
    SlotOccupied { page_id: PageId, slot: u16 },

    #[error("Invalid slot {slot} on page {page_id} holding {size} entries")]
    InvalidSlot { page_id: PageId, slot: u16, size: u16 },

    #[error("Record of {actual} bytes does not match record size {expected}")]
    RecordSize { expected: usize, actual: usize },

    // Consistency
    #[error("Page {page_id} corrupted: {reason}")]
    PageCorrupted { page_id: PageId, reason: String },

    // I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    // Configuration
    #[error("Index configuration error: {0}")]
    IndexConfiguration(String),

    #[error("Invalid index operation: {0}")]
    InvalidIndexOperation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Transactions
    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Transaction cache cannot write {0} to storage")]
    TransactionCacheWriteBack(PageKey),
}

impl StrataError {
    /// Duplicate key, null key or wrong runtime type.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StrataError::DuplicateKey { .. }
                | StrataError::NullKey(_)
                | StrataError::TypeMismatch { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StrataError::KeyNotFound(_)
                | StrataError::ValueNotFound(_)
                | StrataError::TableNotFound(_)
                | StrataError::ColumnNotFound(_)
        )
    }

    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            StrataError::PageFull(_)
                | StrataError::SlotOccupied { .. }
                | StrataError::InvalidSlot { .. }
                | StrataError::RecordSize { .. }
        )
    }

    /// Corruption detected while decoding persisted data.
    pub fn is_consistency(&self) -> bool {
        matches!(self, StrataError::PageCorrupted { .. })
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
