use crate::buffer::BufferPool;
use crate::common::{
    AttrType, AttrValue, BlockNum, BlockType, RecId, Result, SlateError, ATTR_SIZE, HEADER_SIZE,
    LEAF_ENTRY_SIZE, MAX_KEYS_LEAF,
};

use super::{read_i32, write_i32, BlockHeader};

/// One leaf index entry: an attribute value and the record id it points to.
///
/// On disk: `attr_val[16], block i32, slot i32, unused[8]`, 32 bytes per
/// entry, packed from HEADER_SIZE.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafEntry {
    pub attr_val: AttrValue,
    pub block: BlockNum,
    pub slot: i32,
}

impl LeafEntry {
    pub fn rec_id(&self) -> RecId {
        RecId::new(self.block, self.slot)
    }
}

/// View of a B+ tree leaf block. Entries are kept sorted ascending by
/// attribute value; leaves chain left-to-right through the header's
/// sibling links.
pub struct LeafBlock<'a> {
    pool: &'a BufferPool,
    block: BlockNum,
}

impl<'a> LeafBlock<'a> {
    pub fn new(pool: &'a BufferPool, block: BlockNum) -> Self {
        Self { pool, block }
    }

    /// Allocates a fresh leaf block with a zeroed header.
    pub fn alloc(pool: &'a BufferPool) -> Result<Self> {
        let block = pool.allocate(BlockType::IndexLeaf)?;
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
    /// against the leaf capacity, not the current entry count.
    pub fn entry(&self, index: i32, ty: AttrType) -> Result<LeafEntry> {
        if index < 0 || index >= MAX_KEYS_LEAF as i32 {
            return Err(SlateError::OutOfBound(index));
        }
        self.pool.with_block(self.block, |data| {
            let offset = HEADER_SIZE + index as usize * LEAF_ENTRY_SIZE;
            LeafEntry {
                attr_val: AttrValue::decode(&data[offset..offset + ATTR_SIZE], ty),
                block: read_i32(data, offset + ATTR_SIZE),
                slot: read_i32(data, offset + ATTR_SIZE + 4),
            }
        })
    }

    pub fn set_entry(&self, index: i32, entry: &LeafEntry) -> Result<()> {
        if index < 0 || index >= MAX_KEYS_LEAF as i32 {
            return Err(SlateError::OutOfBound(index));
        }
        self.pool.with_block_mut(self.block, |data| {
            let offset = HEADER_SIZE + index as usize * LEAF_ENTRY_SIZE;
            entry.attr_val.encode(&mut data[offset..offset + ATTR_SIZE]);
            write_i32(data, offset + ATTR_SIZE, entry.block);
            write_i32(data, offset + ATTR_SIZE + 4, entry.slot);
        })
    }

    /// Reads all live entries (0..num_entries).
    pub fn entries(&self, ty: AttrType) -> Result<Vec<LeafEntry>> {
        let head = self.header()?;
        let mut entries = Vec::with_capacity(head.num_entries as usize);
        for i in 0..head.num_entries {
            entries.push(self.entry(i, ty)?);
        }
        Ok(entries)
    }

    /// Writes entries starting at index 0. Does not touch the header; the
    /// caller updates num_entries alongside.
    pub fn write_entries(&self, entries: &[LeafEntry]) -> Result<()> {
        for (i, entry) in entries.iter().enumerate() {
            self.set_entry(i as i32, entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileBlockStore;
    use tempfile::NamedTempFile;

    fn pool() -> (BufferPool, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = FileBlockStore::open(temp.path()).unwrap();
        (BufferPool::new(store).unwrap(), temp)
    }

    #[test]
    fn test_leaf_entry_roundtrip() {
        let (pool, _temp) = pool();
        let leaf = LeafBlock::alloc(&pool).unwrap();

        let entry = LeafEntry {
            attr_val: AttrValue::Number(12.0),
            block: 77,
            slot: 3,
        };
        leaf.set_entry(5, &entry).unwrap();
        assert_eq!(leaf.entry(5, AttrType::Number).unwrap(), entry);
    }

    #[test]
    fn test_leaf_entry_out_of_bound() {
        let (pool, _temp) = pool();
        let leaf = LeafBlock::alloc(&pool).unwrap();

        assert!(matches!(
            leaf.entry(MAX_KEYS_LEAF as i32, AttrType::Number),
            Err(SlateError::OutOfBound(_))
        ));
        let entry = LeafEntry {
            attr_val: AttrValue::Number(0.0),
            block: 0,
            slot: 0,
        };
        assert!(matches!(
            leaf.set_entry(-1, &entry),
            Err(SlateError::OutOfBound(-1))
        ));
    }

    #[test]
    fn test_leaf_entries_live_count() {
        let (pool, _temp) = pool();
        let leaf = LeafBlock::alloc(&pool).unwrap();

        for i in 0..4 {
            let entry = LeafEntry {
                attr_val: AttrValue::Number(i as f64),
                block: i,
                slot: 0,
            };
            leaf.set_entry(i, &entry).unwrap();
        }
        let mut head = leaf.header().unwrap();
        head.num_entries = 3;
        leaf.set_header(&head).unwrap();

        let entries = leaf.entries(AttrType::Number).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].attr_val, AttrValue::Number(2.0));
    }
}
