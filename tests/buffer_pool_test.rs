//! Integration tests for the buffer pool

use slate::buffer::BufferPool;
use slate::common::{BlockNum, BlockType, SlateError, ALLOC_MAP_BLOCKS, DISK_BLOCKS};
use slate::storage::FileBlockStore;

use tempfile::NamedTempFile;

fn create_pool(capacity: usize) -> (BufferPool, NamedTempFile) {
    let temp = NamedTempFile::new().unwrap();
    let store = FileBlockStore::open(temp.path()).unwrap();
    (BufferPool::with_capacity(store, capacity).unwrap(), temp)
}

#[test]
fn test_pool_basic_read_write() {
    let (pool, _temp) = create_pool(4);

    pool.with_block_mut(10, |data| {
        data[0] = 0xde;
        data[1] = 0xad;
        data[2] = 0xbe;
        data[3] = 0xef;
    })
    .unwrap();

    let bytes = pool
        .with_block(10, |data| [data[0], data[1], data[2], data[3]])
        .unwrap();
    assert_eq!(bytes, [0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn test_pool_capacity_three_evicts_least_recently_used() {
    // Touch blocks 1, 2, 3, 4 in order against a pool of capacity 3: the
    // fourth pin evicts block 1.
    let (pool, _temp) = create_pool(3);

    for block in [1, 2, 3, 4] {
        pool.with_block(block, |_| ()).unwrap();
    }

    assert!(!pool.is_cached(1));
    assert!(pool.is_cached(2));
    assert!(pool.is_cached(3));
    assert!(pool.is_cached(4));

    // Re-pinning block 1 triggers a fresh load, displacing block 2 (now
    // the least recently used).
    pool.with_block(1, |_| ()).unwrap();
    assert!(pool.is_cached(1));
    assert!(!pool.is_cached(2));
}

#[test]
fn test_pool_pin_refreshes_recency() {
    let (pool, _temp) = create_pool(3);

    for block in [1, 2, 3] {
        pool.with_block(block, |_| ()).unwrap();
    }
    pool.with_block(1, |_| ()).unwrap();
    pool.with_block(9, |_| ()).unwrap();

    assert!(pool.is_cached(1), "block 1 was just touched");
    assert!(!pool.is_cached(2), "block 2 was the LRU victim");
}

#[test]
fn test_pool_out_of_range_pin_rejected() {
    let (pool, _temp) = create_pool(3);

    assert!(matches!(
        pool.with_block(-1, |_| ()),
        Err(SlateError::OutOfBound(-1))
    ));
    assert!(matches!(
        pool.with_block(DISK_BLOCKS as BlockNum, |_| ()),
        Err(SlateError::OutOfBound(_))
    ));
}

#[test]
fn test_pool_dirty_eviction_persists_writes() {
    let (pool, _temp) = create_pool(2);

    for block in 50..60 {
        pool.with_block_mut(block, |data| data[0] = block as u8).unwrap();
    }

    // Every block except the last two has been evicted by now; the writes
    // must have gone through the store.
    for block in 50..60 {
        let value = pool.with_block(block, |data| data[0]).unwrap();
        assert_eq!(value, block as u8);
    }
}

#[test]
fn test_pool_allocate_release_cycle() {
    let (pool, _temp) = create_pool(4);

    let a = pool.allocate(BlockType::Record).unwrap();
    let b = pool.allocate(BlockType::IndexLeaf).unwrap();
    assert_eq!(a, ALLOC_MAP_BLOCKS as BlockNum);
    assert_eq!(b, a + 1);

    pool.release(a);
    assert_eq!(pool.block_type(a).unwrap(), BlockType::Unused);

    // The first unused block is found again.
    let c = pool.allocate(BlockType::IndexInternal).unwrap();
    assert_eq!(c, a);
    assert_eq!(pool.block_type(c).unwrap(), BlockType::IndexInternal);
    assert_eq!(pool.block_type(b).unwrap(), BlockType::IndexLeaf);
}

#[test]
fn test_pool_flush_then_reopen() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path().to_path_buf();

    let block = {
        let store = FileBlockStore::open(&path).unwrap();
        let pool = BufferPool::with_capacity(store, 4).unwrap();
        let block = pool.allocate(BlockType::Record).unwrap();
        pool.with_block_mut(block, |data| data[100] = 7).unwrap();
        pool.flush().unwrap();
        block
    };

    let store = FileBlockStore::open(&path).unwrap();
    let pool = BufferPool::with_capacity(store, 4).unwrap();
    assert_eq!(pool.block_type(block).unwrap(), BlockType::Record);
    assert_eq!(pool.with_block(block, |data| data[100]).unwrap(), 7);
}
