use std::fmt;

/// Page identifier - position of a page within its owner's file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Byte offset of this page in its file.
    pub fn byte_offset(&self, page_size: usize) -> u64 {
        self.0 as u64 * page_size as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// Slot identifier within a slotted page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u16);

impl SlotId {
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Size of an encoded [`BlockPointer`]: i32 page id + i16 slot offset.
pub const BLOCK_POINTER_SIZE: usize = 6;

/// Pointer to a record inside a slotted page.
///
/// Only valid while the referenced slot still holds the record it was
/// created for. A swap-delete on the same page sequence moves the last record
/// into the freed slot, after which the moved record's old pointer is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPointer {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl BlockPointer {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }

    /// Encodes as `i32 page id, i16 slot`, little-endian.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.page_id.as_u32() as i32).to_le_bytes());
        out.extend_from_slice(&(self.slot_id.as_u16() as i16).to_le_bytes());
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < BLOCK_POINTER_SIZE {
            return None;
        }
        let page = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let slot = i16::from_le_bytes([data[4], data[5]]);
        if page < 0 || slot < 0 {
            return None;
        }
        Some(Self::new(PageId::new(page as u32), SlotId::new(slot as u16)))
    }
}

impl fmt::Display for BlockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id.0, self.slot_id.0)
    }
}

/// The value stored in every index: where the row lives and where the
/// durable index-log record for the same key lives.
///
/// `index_log` is `None` for results produced by a linear table scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointerPair {
    pub table_row: BlockPointer,
    pub index_log: Option<BlockPointer>,
}

impl PointerPair {
    pub fn new(table_row: BlockPointer, index_log: BlockPointer) -> Self {
        Self {
            table_row,
            index_log: Some(index_log),
        }
    }

    pub fn row_only(table_row: BlockPointer) -> Self {
        Self {
            table_row,
            index_log: None,
        }
    }
}

/// Identity of a cached page: owning table, optional indexed column, page id.
///
/// Orders lexicographically so that write-back happens in a deterministic
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub owner: String,
    pub column: Option<String>,
    pub page_id: PageId,
}

impl PageKey {
    pub fn table(owner: impl Into<String>, page_id: PageId) -> Self {
        Self {
            owner: owner.into(),
            column: None,
            page_id,
        }
    }

    pub fn index_log(owner: impl Into<String>, column: impl Into<String>, page_id: PageId) -> Self {
        Self {
            owner: owner.into(),
            column: Some(column.into()),
            page_id,
        }
    }

    /// Path of the file holding this page, relative to the block store root.
    pub fn file_path(&self) -> String {
        match &self.column {
            None => format!("{}.tbl", self.owner),
            Some(column) => format!("{}.{}.idx", self.owner, column),
        }
    }

    /// Returns true if both keys address the same file.
    pub fn same_file(&self, other: &PageKey) -> bool {
        self.owner == other.owner && self.column == other.column
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            None => write!(f, "{}#{}", self.owner, self.page_id.0),
            Some(column) => write!(f, "{}.{}#{}", self.owner, column, self.page_id.0),
        }
    }
}
