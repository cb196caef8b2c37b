//! Strata - the paged storage core of an embedded relational database
//!
//! Rows and index logs live in fixed-record slotted pages behind an LRU
//! write-back page cache. Transactions stack copy-on-write cache overlays on
//! top of it, and every indexed column keeps an in-memory search structure in
//! step with a compact on-disk log that rebuilds it at startup.
//!
//! # Architecture
//!
//! The crate is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Block I/O and page organization
//!   - `BlockStore`: Path-addressed read/write/truncate
//!   - `DiskManager`: File-backed block store rooted at a directory
//!   - `DiskScheduler`: Single worker thread that serializes file access
//!   - `SlottedPage`: Fixed-size records with swap-delete compaction
//!   - `RecordFile`: Hole-free record sequence spread over slotted pages
//!
//! - **Buffer** (`buffer`): Memory management for pages
//!   - `PageCache`: Bounded root cache with LRU-K eviction and write-back
//!   - `TransactionCache`: Copy-on-write overlay, nestable
//!   - `LruKReplacer`: Replacement policy (plain LRU for k = 1)
//!
//! - **Index** (`index`): Column indexes
//!   - `Index`: Contract shared by the B+ tree, red-black tree, skip list
//!     and hash table structures
//!   - `IndexLogManager`: Durable `(key, row pointer)` log per column
//!   - `IndexManager`: Multi-column insert/remove/update with undo records
//!
//! - **Transactions** (`txn`): Snapshot stacks and undo logs
//!
//! - **Tables** (`table`, `types`): Row model, table heap and the
//!   [`Database`] handle tying everything together
//!
//! # Example
//!
//! ```rust,no_run
//! use strata::index::IndexSpec;
//! use strata::types::{DataType, Row, Schema, Value};
//! use strata::{Database, StorageConfig};
//!
//! let mut db = Database::open_dir("data", StorageConfig::default()).unwrap();
//! let schema = Schema::builder()
//!     .column("id", DataType::Integer)
//!     .nullable_column("name", DataType::VarChar(32))
//!     .build();
//! db.create_table("users", schema, &[IndexSpec::primary("id")]).unwrap();
//!
//! db.begin_transaction();
//! let row = Row::from_values([Value::Integer(1), Value::from("ann")]);
//! db.insert_row("users", &row).unwrap();
//! db.commit().unwrap();
//!
//! let hits = db.find_block("users", "id", Some(&Value::Integer(1))).unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

pub mod buffer;
pub mod common;
mod database;
pub mod index;
pub mod storage;
pub mod table;
pub mod txn;
pub mod types;

// Re-export commonly used types at the crate root
pub use common::{BlockPointer, PageId, PointerPair, Result, SlotId, StorageConfig, StrataError};
pub use database::Database;
