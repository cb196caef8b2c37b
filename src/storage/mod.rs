pub mod disk;
pub mod page;
mod record_file;

pub use record_file::{RecordFile, RecordShift};
