mod lru_k_replacer;
mod page_cache;
mod transaction_cache;

pub use lru_k_replacer::*;
pub use page_cache::*;
pub use transaction_cache::*;
