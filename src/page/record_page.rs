use crate::buffer::BufferPool;
use crate::common::{
    AttrType, AttrValue, BlockNum, BlockType, Result, SlateError, ATTR_SIZE, HEADER_SIZE,
};

use super::BlockHeader;

/// A slot is free
pub const SLOT_UNOCCUPIED: u8 = 0;
/// A slot holds a live record
pub const SLOT_OCCUPIED: u8 = 1;

/// View of a record block: header, then one occupancy byte per slot, then
/// fixed-width records of `num_attrs * ATTR_SIZE` bytes each.
///
/// The view holds only the block number; every access re-pins the block
/// through the buffer pool, so it stays valid across evictions.
pub struct RecBlock<'a> {
    pool: &'a BufferPool,
    block: BlockNum,
}

impl<'a> RecBlock<'a> {
    /// A view over an existing record block.
    pub fn new(pool: &'a BufferPool, block: BlockNum) -> Self {
        Self { pool, block }
    }

    /// Allocates a fresh record block with a zeroed header.
    pub fn alloc(pool: &'a BufferPool) -> Result<Self> {
        let block = pool.allocate(BlockType::Record)?;
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

    /// Returns a copy of the slot occupancy map.
    pub fn slot_map(&self) -> Result<Vec<u8>> {
        self.pool.with_block(self.block, |data| {
            let head = BlockHeader::read(data);
            let num_slots = head.num_slots as usize;
            data[HEADER_SIZE..HEADER_SIZE + num_slots].to_vec()
        })
    }

    /// Replaces the slot occupancy map. The argument length must match the
    /// block's slot count.
    pub fn set_slot_map(&self, map: &[u8]) -> Result<()> {
        self.pool.with_block_mut(self.block, |data| {
            let head = BlockHeader::read(data);
            let num_slots = head.num_slots as usize;
            assert_eq!(map.len(), num_slots);
            data[HEADER_SIZE..HEADER_SIZE + num_slots].copy_from_slice(map);
        })
    }

    /// Reads the record at the given slot, decoding each attribute cell
    /// with the schema-supplied type tags.
    pub fn record(&self, slot: i32, types: &[AttrType]) -> Result<Vec<AttrValue>> {
        self.pool.with_block(self.block, |data| {
            let head = BlockHeader::read(data);
            if slot < 0 || slot >= head.num_slots {
                return Err(SlateError::OutOfBound(slot));
            }
            debug_assert_eq!(types.len(), head.num_attrs as usize);

            let offset = record_offset(&head, slot);
            let mut values = Vec::with_capacity(types.len());
            for (i, &ty) in types.iter().enumerate() {
                let cell = &data[offset + i * ATTR_SIZE..offset + (i + 1) * ATTR_SIZE];
                values.push(AttrValue::decode(cell, ty));
            }
            Ok(values)
        })?
    }

    /// Writes a record into the given slot. The value count must match the
    /// block's attribute count.
    pub fn set_record(&self, slot: i32, values: &[AttrValue]) -> Result<()> {
        self.pool.with_block_mut(self.block, |data| {
            let head = BlockHeader::read(data);
            if slot < 0 || slot >= head.num_slots {
                return Err(SlateError::OutOfBound(slot));
            }
            debug_assert_eq!(values.len(), head.num_attrs as usize);

            let offset = record_offset(&head, slot);
            for (i, value) in values.iter().enumerate() {
                let cell = &mut data[offset + i * ATTR_SIZE..offset + (i + 1) * ATTR_SIZE];
                value.encode(cell);
            }
            Ok(())
        })?
    }

    /// Rewrites a single attribute cell of a record in place.
    pub fn set_attr(&self, slot: i32, attr_offset: usize, value: &AttrValue) -> Result<()> {
        self.pool.with_block_mut(self.block, |data| {
            let head = BlockHeader::read(data);
            if slot < 0 || slot >= head.num_slots {
                return Err(SlateError::OutOfBound(slot));
            }
            debug_assert!(attr_offset < head.num_attrs as usize);

            let offset = record_offset(&head, slot) + attr_offset * ATTR_SIZE;
            value.encode(&mut data[offset..offset + ATTR_SIZE]);
            Ok(())
        })?
    }
}

/// Byte offset of a record: header, slot map, then fixed-width records.
fn record_offset(head: &BlockHeader, slot: i32) -> usize {
    let record_size = head.num_attrs as usize * ATTR_SIZE;
    HEADER_SIZE + head.num_slots as usize + slot as usize * record_size
}
