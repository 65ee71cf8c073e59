/// Size of a disk block in bytes (2 KiB)
pub const BLOCK_SIZE: usize = 2048;

/// Total number of blocks on the disk
pub const DISK_BLOCKS: usize = 8192;

/// Number of in-memory frames in the buffer pool
pub const BUFFER_CAPACITY: usize = 32;

/// Size of the fixed block header in bytes (eight i32 fields)
pub const HEADER_SIZE: usize = 32;

/// Size of one attribute cell in bytes
pub const ATTR_SIZE: usize = 16;

/// Size of one leaf index entry: attribute value + block + slot + padding
pub const LEAF_ENTRY_SIZE: usize = 32;

/// Maximum number of entries in a leaf index block
pub const MAX_KEYS_LEAF: usize = (BLOCK_SIZE - HEADER_SIZE) / LEAF_ENTRY_SIZE;

/// Stride between consecutive internal index entries. Entries overlap: the
/// right-child cell of entry i is the left-child cell of entry i+1.
pub const INTERNAL_ENTRY_STRIDE: usize = 4 + ATTR_SIZE;

/// Maximum number of entries in an internal index block
pub const MAX_KEYS_INTERNAL: usize =
    (BLOCK_SIZE - HEADER_SIZE - 4) / INTERNAL_ENTRY_STRIDE;

/// Number of blocks holding the on-disk block-type map (one byte per block)
pub const ALLOC_MAP_BLOCKS: usize = DISK_BLOCKS / BLOCK_SIZE;

/// Block number of the relation catalog (fixed, single block)
pub const RELCAT_BLOCK: i32 = ALLOC_MAP_BLOCKS as i32;

/// Block number of the first attribute catalog block
pub const ATTRCAT_BLOCK: i32 = RELCAT_BLOCK + 1;

/// Maximum number of simultaneously open relations
pub const MAX_OPEN: usize = 12;

/// Relation id of the relation catalog in the open-relation table
pub const RELCAT_RELID: i32 = 0;

/// Relation id of the attribute catalog in the open-relation table
pub const ATTRCAT_RELID: i32 = 1;

/// Name of the relation catalog relation
pub const RELCAT_NAME: &str = "RELATIONCAT";

/// Name of the attribute catalog relation
pub const ATTRCAT_NAME: &str = "ATTRIBUTECAT";

/// Both catalog relations have six attributes
pub const CATALOG_ATTR_COUNT: usize = 6;

/// Slots per catalog block: 6 * ATTR_SIZE bytes per record plus one
/// slot-map byte per slot
pub const CATALOG_SLOTS_PER_BLOCK: usize =
    (BLOCK_SIZE - HEADER_SIZE) / (CATALOG_ATTR_COUNT * ATTR_SIZE + 1);

// Attribute offsets within a relation catalog record
pub const RELCAT_REL_NAME: usize = 0;
pub const RELCAT_ATTR_COUNT: usize = 1;
pub const RELCAT_RECORD_COUNT: usize = 2;
pub const RELCAT_FIRST_BLOCK: usize = 3;
pub const RELCAT_LAST_BLOCK: usize = 4;
pub const RELCAT_SLOT_COUNT: usize = 5;

// Attribute offsets within an attribute catalog record
pub const ATTRCAT_REL_NAME: usize = 0;
pub const ATTRCAT_ATTR_NAME: usize = 1;
pub const ATTRCAT_ATTR_TYPE: usize = 2;
pub const ATTRCAT_PRIMARY_FLAG: usize = 3;
pub const ATTRCAT_ROOT_BLOCK: usize = 4;
pub const ATTRCAT_OFFSET: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_capacities() {
        assert_eq!(MAX_KEYS_LEAF, 63);
        assert_eq!(MAX_KEYS_INTERNAL, 100);
        assert_eq!(ALLOC_MAP_BLOCKS, 4);
        assert_eq!(CATALOG_SLOTS_PER_BLOCK, 20);
    }

    #[test]
    fn test_internal_entries_fit() {
        // The last entry's right child must still land inside the block.
        let end = HEADER_SIZE + MAX_KEYS_INTERNAL * INTERNAL_ENTRY_STRIDE + 4;
        assert!(end <= BLOCK_SIZE);
    }
}
