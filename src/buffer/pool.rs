use parking_lot::Mutex;

use crate::common::{
    BlockNum, BlockType, Result, SlateError, ALLOC_MAP_BLOCKS, BLOCK_SIZE, BUFFER_CAPACITY,
    DISK_BLOCKS,
};
use crate::page::BlockHeader;
use crate::storage::FileBlockStore;

use super::BufferFrame;

/// Internal pool state guarded by one lock
struct PoolState {
    /// The in-memory frames
    frames: Vec<BufferFrame>,
    /// Global block-type map, one code byte per disk block. Persisted in
    /// the first ALLOC_MAP_BLOCKS blocks of the disk.
    alloc_map: Vec<u8>,
}

/// BufferPool caches a bounded number of disk blocks in memory and is the
/// only path through which block bytes are read or written. A block is
/// brought in on demand; when every frame is occupied the least recently
/// used frame is evicted (written back first if dirty). The pool also owns
/// block allocation: the block-type map records which blocks are live and
/// what shape their payload has.
pub struct BufferPool {
    store: FileBlockStore,
    state: Mutex<PoolState>,
}

impl BufferPool {
    /// Creates a pool with the default frame capacity.
    pub fn new(store: FileBlockStore) -> Result<Self> {
        Self::with_capacity(store, BUFFER_CAPACITY)
    }

    /// Creates a pool with an explicit frame capacity. The capacity is
    /// fixed for the life of the pool.
    pub fn with_capacity(store: FileBlockStore, capacity: usize) -> Result<Self> {
        assert!(capacity > 0);

        let mut alloc_map = vec![BlockType::Unused.code(); DISK_BLOCKS];
        if store.is_fresh() {
            for code in alloc_map.iter_mut().take(ALLOC_MAP_BLOCKS) {
                *code = BlockType::AllocMap.code();
            }
        } else {
            let mut buf = vec![0u8; BLOCK_SIZE];
            for i in 0..ALLOC_MAP_BLOCKS {
                store.read_block(i as BlockNum, &mut buf)?;
                alloc_map[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE].copy_from_slice(&buf);
            }
        }

        let frames = (0..capacity).map(|_| BufferFrame::new()).collect();

        Ok(Self {
            store,
            state: Mutex::new(PoolState { frames, alloc_map }),
        })
    }

    /// Whether the backing store was empty at open time.
    pub fn is_fresh(&self) -> bool {
        self.store.is_fresh()
    }

    /// Number of frames in the pool.
    pub fn capacity(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Runs `f` over an immutable view of the block's bytes, loading the
    /// block into a frame first if necessary.
    pub fn with_block<R>(&self, block: BlockNum, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let mut state = self.state.lock();
        let frame = self.pin(&mut state, block)?;
        Ok(f(&state.frames[frame].data[..]))
    }

    /// Runs `f` over a mutable view of the block's bytes and marks the
    /// frame dirty. The view cannot outlive the call, so a caller can
    /// never hold block bytes across another pool operation.
    pub fn with_block_mut<R>(&self, block: BlockNum, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut state = self.state.lock();
        let frame = self.pin(&mut state, block)?;
        state.frames[frame].dirty = true;
        Ok(f(&mut state.frames[frame].data[..]))
    }

    /// Sets the dirty bit on the block's frame, loading the block if it is
    /// not cached.
    pub fn mark_dirty(&self, block: BlockNum) -> Result<()> {
        let mut state = self.state.lock();
        let frame = self.pin(&mut state, block)?;
        state.frames[frame].dirty = true;
        Ok(())
    }

    /// Whether the block currently occupies a frame.
    pub fn is_cached(&self, block: BlockNum) -> bool {
        let state = self.state.lock();
        state
            .frames
            .iter()
            .any(|f| !f.free && f.block == block)
    }

    /// The block's type according to the global block-type map.
    pub fn block_type(&self, block: BlockNum) -> Result<BlockType> {
        if block < 0 || block >= DISK_BLOCKS as BlockNum {
            return Err(SlateError::OutOfBound(block));
        }
        let state = self.state.lock();
        Ok(BlockType::from_code(state.alloc_map[block as usize]))
    }

    /// Allocates the first unused block on disk, stamps the given type into
    /// the block-type map and the block header, and zeroes the payload.
    /// Fails with DiskFull when no unused block exists.
    pub fn allocate(&self, block_type: BlockType) -> Result<BlockNum> {
        debug_assert!(matches!(
            block_type,
            BlockType::Record | BlockType::IndexInternal | BlockType::IndexLeaf
        ));

        let mut state = self.state.lock();

        let unused = BlockType::Unused.code();
        let block = match state.alloc_map.iter().position(|&c| c == unused) {
            Some(b) => b as BlockNum,
            None => return Err(SlateError::DiskFull),
        };

        state.alloc_map[block as usize] = block_type.code();

        let frame = self.pin(&mut state, block)?;
        let slot = &mut state.frames[frame];
        slot.data.fill(0);
        BlockHeader::new(block_type).write(&mut slot.data[..]);
        slot.dirty = true;

        Ok(block)
    }

    /// Marks the block unused and frees its frame if cached, discarding
    /// the frame contents. Repeated release is safe: a no-op on -1, an
    /// out-of-range number or an already-unused block.
    pub fn release(&self, block: BlockNum) {
        if block < 0 || block >= DISK_BLOCKS as BlockNum {
            return;
        }
        let mut state = self.state.lock();
        state.alloc_map[block as usize] = BlockType::Unused.code();
        if let Some(frame) = state
            .frames
            .iter_mut()
            .find(|f| !f.free && f.block == block)
        {
            frame.reset();
        }
    }

    /// Writes every dirty frame and the block-type map back to the store.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        let PoolState { frames, alloc_map } = &mut *state;

        for frame in frames.iter_mut() {
            if !frame.free && frame.dirty {
                self.store.write_block(&frame.data[..], frame.block)?;
                frame.dirty = false;
            }
        }

        for i in 0..ALLOC_MAP_BLOCKS {
            self.store
                .write_block(&alloc_map[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE], i as BlockNum)?;
        }

        self.store.sync()
    }

    /// Maps a block to a frame index, loading it from the store on a miss.
    /// On a hit the frame's recency counter resets to 0 and every other
    /// occupied frame's counter increments; on a miss, when no frame is
    /// free, the frame with the largest counter is evicted (written back
    /// first if dirty).
    fn pin(&self, state: &mut PoolState, block: BlockNum) -> Result<usize> {
        if block < 0 || block >= DISK_BLOCKS as BlockNum {
            return Err(SlateError::OutOfBound(block));
        }

        let hit = state
            .frames
            .iter()
            .position(|f| !f.free && f.block == block);

        let index = match hit {
            Some(index) => index,
            None => {
                let index = match state.frames.iter().position(|f| f.free) {
                    Some(free) => free,
                    None => {
                        let victim = state
                            .frames
                            .iter()
                            .enumerate()
                            .max_by_key(|(_, f)| f.recency)
                            .map(|(i, _)| i)
                            .expect("pool has at least one frame");
                        let frame = &mut state.frames[victim];
                        if frame.dirty {
                            self.store.write_block(&frame.data[..], frame.block)?;
                        }
                        frame.reset();
                        victim
                    }
                };

                let frame = &mut state.frames[index];
                self.store.read_block(block, &mut frame.data[..])?;
                frame.block = block;
                frame.dirty = false;
                frame.free = false;
                index
            }
        };

        for (i, frame) in state.frames.iter_mut().enumerate() {
            if !frame.free {
                frame.recency = if i == index { 0 } else { frame.recency.saturating_add(1) };
            }
        }

        Ok(index)
    }
}
