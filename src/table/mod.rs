mod indexed_table;
mod table_heap;

pub use indexed_table::Table;
pub use table_heap::{RowShift, TableHeap};
