use std::fmt;

use crate::common::{
    PointerPair, Result, StrataError, BLOCK_POINTER_SIZE, DEFAULT_BTREE_ORDER, PAGE_SIZE,
};
use crate::types::{DataType, Value};

use super::{BPlusTree, BucketIndex, HashTable, Index, RbTree, SkipList};

/// Index over one column: values keyed by column value, pointing at the
/// row and at the index-log record.
pub type ColumnIndex = Box<dyn Index<Value, PointerPair>>;

/// Role of an index on its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Unique and never nullable
    Primary,
    Unique,
    /// Non-unique; duplicate keys allowed
    Secondary,
}

impl IndexKind {
    pub fn is_unique(&self) -> bool {
        matches!(self, IndexKind::Primary | IndexKind::Unique)
    }
}

/// In-memory structure backing an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexStructure {
    #[default]
    BPlusTree,
    RedBlackTree,
    SkipList,
    Hash,
}

impl fmt::Display for IndexStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStructure::BPlusTree => write!(f, "b+tree"),
            IndexStructure::RedBlackTree => write!(f, "red-black tree"),
            IndexStructure::SkipList => write!(f, "skip list"),
            IndexStructure::Hash => write!(f, "hash"),
        }
    }
}

/// B+ tree fan-out for keys of `data_type`: as many entries as one page
/// would hold, capped at `DEFAULT_BTREE_ORDER`.
pub fn btree_order_for(data_type: DataType) -> usize {
    let entry = data_type.max_size() + 2 * BLOCK_POINTER_SIZE;
    (PAGE_SIZE / entry).clamp(4, DEFAULT_BTREE_ORDER)
}

/// Builds an empty index for a column.
///
/// Primary indexes cannot be nullable.
pub fn create_index(
    name: &str,
    kind: IndexKind,
    data_type: DataType,
    nullable: bool,
    structure: IndexStructure,
) -> Result<ColumnIndex> {
    if kind == IndexKind::Primary && nullable {
        return Err(StrataError::IndexConfiguration(format!(
            "primary index {} cannot be nullable",
            name
        )));
    }

    let mut index: ColumnIndex = match structure {
        IndexStructure::BPlusTree => Box::new(BucketIndex::new(
            name,
            BPlusTree::new(btree_order_for(data_type)),
        )),
        IndexStructure::RedBlackTree => Box::new(BucketIndex::new(name, RbTree::new())),
        IndexStructure::SkipList => Box::new(BucketIndex::new(name, SkipList::new())),
        IndexStructure::Hash => Box::new(BucketIndex::new(name, HashTable::new())),
    };
    index.set_unique(kind.is_unique())?;
    index.set_nullable(nullable)?;
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_index_flags() {
        let index = create_index(
            "t.id",
            IndexKind::Primary,
            DataType::Integer,
            false,
            IndexStructure::SkipList,
        )
        .unwrap();
        assert!(index.is_unique());
        assert!(!index.is_nullable());
        assert!(index.is_ordered());

        let index = create_index(
            "t.tag",
            IndexKind::Secondary,
            DataType::VarChar(8),
            true,
            IndexStructure::Hash,
        )
        .unwrap();
        assert!(!index.is_unique());
        assert!(index.is_nullable());
        assert!(!index.is_ordered());
    }

    #[test]
    fn test_nullable_primary_rejected() {
        let result = create_index(
            "t.id",
            IndexKind::Primary,
            DataType::Integer,
            true,
            IndexStructure::BPlusTree,
        );
        assert!(matches!(result, Err(StrataError::IndexConfiguration(_))));
    }

    #[test]
    fn test_btree_order_for_wide_keys() {
        assert_eq!(btree_order_for(DataType::Integer), DEFAULT_BTREE_ORDER);
        assert_eq!(btree_order_for(DataType::VarChar(1000)), 4);
    }
}
