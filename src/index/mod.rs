mod bplus_tree;
mod contract;
mod factory;
mod hash_table;
mod log_manager;
mod manager;
mod predicate;
mod rb_tree;
mod skip_list;

pub use bplus_tree::BPlusTree;
pub use factory::{btree_order_for, create_index, ColumnIndex, IndexKind, IndexStructure};
pub use contract::{Bucket, BucketIndex, Index, KeyMap};
pub use hash_table::HashTable;
pub use log_manager::{IndexLogManager, LogShift};
pub use manager::{IndexManager, IndexSpec};
pub use predicate::{Predicate, RangeMatch};
pub use rb_tree::RbTree;
pub use skip_list::SkipList;
