mod block_store;
mod disk_manager;
mod disk_scheduler;

pub use block_store::*;
pub use disk_manager::*;
pub use disk_scheduler::*;
