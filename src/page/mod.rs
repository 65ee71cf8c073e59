//! Block codec: typed views over the raw bytes of a cached block.
//!
//! Every live block starts with the same fixed header; the payload region
//! is one of three shapes (slotted record page, B+ tree leaf, B+ tree
//! internal node). All views are pure offset computations over a byte
//! slice obtained from the buffer pool; none of them retains the slice
//! beyond a single pool access.

mod header;
mod internal_page;
mod leaf_page;
mod record_page;

pub use header::BlockHeader;
pub use internal_page::{InternalBlock, InternalEntry};
pub use leaf_page::{LeafBlock, LeafEntry};
pub use record_page::{RecBlock, SLOT_OCCUPIED, SLOT_UNOCCUPIED};

use crate::buffer::BufferPool;
use crate::common::{BlockNum, Result};

pub(crate) fn read_i32(data: &[u8], offset: usize) -> i32 {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    i32::from_le_bytes(bytes)
}

pub(crate) fn write_i32(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Rewrites only the parent-block field of a block's header. Used when a
/// node split re-parents the children that moved to the new sibling.
pub fn set_parent_block(pool: &BufferPool, block: BlockNum, parent: BlockNum) -> Result<()> {
    pool.with_block_mut(block, |data| {
        let mut head = BlockHeader::read(data);
        head.pblock = parent;
        head.write(data);
    })
}
