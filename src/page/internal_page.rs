use crate::buffer::BufferPool;
use crate::common::{
    AttrType, AttrValue, BlockNum, BlockType, Result, SlateError, ATTR_SIZE, HEADER_SIZE,
    INTERNAL_ENTRY_STRIDE, MAX_KEYS_INTERNAL,
};

use super::{read_i32, write_i32, BlockHeader};

/// One internal index entry: a routing key with its two children.
///
/// On disk entries are laid out at a 20-byte stride from HEADER_SIZE:
/// `lchild i32 @ +0, attr_val[16] @ +4, rchild i32 @ +20`. The right-child
/// cell of entry i is the left-child cell of entry i+1, so the
/// child-sharing invariant (entry[i].rchild == entry[i+1].lchild) is a
/// property of the layout itself. A block with N entries routes to N+1
/// children.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalEntry {
    pub lchild: BlockNum,
    pub attr_val: AttrValue,
    pub rchild: BlockNum,
}

/// View of a B+ tree internal block. Keys are kept sorted ascending.
pub struct InternalBlock<'a> {
    pool: &'a BufferPool,
    block: BlockNum,
}

impl<'a> InternalBlock<'a> {
    pub fn new(pool: &'a BufferPool, block: BlockNum) -> Self {
        Self { pool, block }
    }

    /// Allocates a fresh internal block with a zeroed header.
    pub fn alloc(pool: &'a BufferPool) -> Result<Self> {
        let block = pool.allocate(BlockType::IndexInternal)?;
        Ok(Self { pool, block })
    }

    pub fn block_num(&self) -> BlockNum {
        self.block
    }

    pub fn header(&self) -> Result<BlockHeader> {
        self.pool.with_block(self.block, BlockHeader::read)
    }

    pub fn set_header(&self, head: &BlockHeader) -> Result<()> {
        self.pool.with_block_mut(self.block, |data| head.write(data))
    }

    /// Reads the entry at the given index. The index is bounds-checked
    /// against the block capacity, not the current entry count.
    pub fn entry(&self, index: i32, ty: AttrType) -> Result<InternalEntry> {
        if index < 0 || index >= MAX_KEYS_INTERNAL as i32 {
            return Err(SlateError::OutOfBound(index));
        }
        self.pool.with_block(self.block, |data| {
            let offset = HEADER_SIZE + index as usize * INTERNAL_ENTRY_STRIDE;
            InternalEntry {
                lchild: read_i32(data, offset),
                attr_val: AttrValue::decode(&data[offset + 4..offset + 4 + ATTR_SIZE], ty),
                rchild: read_i32(data, offset + INTERNAL_ENTRY_STRIDE),
            }
        })
    }

    /// Writes the entry at the given index. Writing the right child also
    /// writes the next entry's left-child cell (they are the same bytes),
    /// so sequences of entries must be written in ascending index order.
    pub fn set_entry(&self, index: i32, entry: &InternalEntry) -> Result<()> {
        if index < 0 || index >= MAX_KEYS_INTERNAL as i32 {
            return Err(SlateError::OutOfBound(index));
        }
        self.pool.with_block_mut(self.block, |data| {
            let offset = HEADER_SIZE + index as usize * INTERNAL_ENTRY_STRIDE;
            write_i32(data, offset, entry.lchild);
            entry
                .attr_val
                .encode(&mut data[offset + 4..offset + 4 + ATTR_SIZE]);
            write_i32(data, offset + INTERNAL_ENTRY_STRIDE, entry.rchild);
        })
    }

    /// Reads all live entries (0..num_entries).
    pub fn entries(&self, ty: AttrType) -> Result<Vec<InternalEntry>> {
        let head = self.header()?;
        let mut entries = Vec::with_capacity(head.num_entries as usize);
        for i in 0..head.num_entries {
            entries.push(self.entry(i, ty)?);
        }
        Ok(entries)
    }

    /// Writes entries starting at index 0, in ascending order. The slice
    /// must satisfy entries[i].rchild == entries[i+1].lchild; the shared
    /// cell is written twice with the same value.
    pub fn write_entries(&self, entries: &[InternalEntry]) -> Result<()> {
        for (i, entry) in entries.iter().enumerate() {
            if i + 1 < entries.len() {
                debug_assert_eq!(entry.rchild, entries[i + 1].lchild);
            }
            self.set_entry(i as i32, entry)?;
        }
        Ok(())
    }
}
