use crate::common::{Result, StrataError};
use crate::index::IndexStructure;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Serialized page header: page id (i32), entry count (i16),
/// space in use (i32), header size (i32)
pub const PAGE_HEADER_SIZE: usize = 14;

/// Default number of pages held by the root cache
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Default K for the cache replacer; K = 1 is plain LRU
pub const DEFAULT_LRUK_K: usize = 1;

/// Fraction of cache capacity that pending deleted pages must reach
/// before a checkpoint truncates files
pub const DEFAULT_TRUNCATE_FRACTION: f64 = 0.10;

/// Default B+ tree order (max keys per node)
pub const DEFAULT_BTREE_ORDER: usize = 32;

/// Highest level a skip list tower can reach
pub const SKIP_LIST_MAX_LEVEL: usize = 16;

/// Seed for skip list level generation, fixed so layouts are reproducible
pub const SKIP_LIST_SEED: u64 = 0x5eed_1157;

/// Storage configuration for a database handle.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Pages held by the root cache before eviction starts.
    pub cache_capacity: usize,
    /// K for the LRU-K replacer.
    pub lru_k: usize,
    /// Truncation threshold as a fraction of `cache_capacity`.
    pub truncate_fraction: f64,
    /// In-memory structure used for indexes that do not pick one.
    pub index_structure: IndexStructure,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            lru_k: DEFAULT_LRUK_K,
            truncate_fraction: DEFAULT_TRUNCATE_FRACTION,
            index_structure: IndexStructure::BPlusTree,
        }
    }
}

impl StorageConfig {
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_lru_k(mut self, k: usize) -> Self {
        self.lru_k = k;
        self
    }

    pub fn with_truncate_fraction(mut self, fraction: f64) -> Self {
        self.truncate_fraction = fraction;
        self
    }

    pub fn with_index_structure(mut self, structure: IndexStructure) -> Self {
        self.index_structure = structure;
        self
    }

    /// Number of pending deleted pages that triggers truncation.
    pub fn truncate_threshold(&self) -> usize {
        ((self.cache_capacity as f64 * self.truncate_fraction).ceil() as usize).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(StrataError::InvalidConfig(
                "cache capacity must be at least one page".to_string(),
            ));
        }
        if self.lru_k == 0 {
            return Err(StrataError::InvalidConfig("lru_k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.truncate_fraction) {
            return Err(StrataError::InvalidConfig(format!(
                "truncate fraction {} outside [0, 1]",
                self.truncate_fraction
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_threshold() {
        assert_eq!(StorageConfig::default().truncate_threshold(), 7);
        let config = StorageConfig::default().with_cache_capacity(4);
        assert_eq!(config.truncate_threshold(), 1);
        let config = config.with_truncate_fraction(0.0);
        assert_eq!(config.truncate_threshold(), 1);
    }

    #[test]
    fn test_validate() {
        assert!(StorageConfig::default().validate().is_ok());
        assert!(StorageConfig::default().with_cache_capacity(0).validate().is_err());
        assert!(StorageConfig::default().with_lru_k(0).validate().is_err());
        assert!(StorageConfig::default()
            .with_truncate_fraction(1.5)
            .validate()
            .is_err());
    }
}
