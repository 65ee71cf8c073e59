use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::common::{BlockNum, Result, BLOCK_SIZE, DISK_BLOCKS};

/// FileBlockStore persists fixed-size blocks in a single file. The disk has
/// a fixed geometry: DISK_BLOCKS blocks of BLOCK_SIZE bytes, addressed by
/// block number. It imposes no structure on block contents.
pub struct FileBlockStore {
    /// The backing file
    file: Mutex<File>,
    /// Path to the backing file
    path: String,
    /// Whether the file was empty when opened (fresh disk)
    fresh: bool,
}

impl FileBlockStore {
    /// Opens the block store at the given path, creating the file if it
    /// does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let fresh = file.metadata()?.len() == 0;

        Ok(Self {
            file: Mutex::new(file),
            path: path_str,
            fresh,
        })
    }

    /// Whether the backing file was empty at open time, meaning the disk
    /// still needs to be formatted.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Reads one block into the provided buffer. The buffer must be exactly
    /// BLOCK_SIZE bytes. Reading past the current end of file yields zeros.
    pub fn read_block(&self, block: BlockNum, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), BLOCK_SIZE, "Buffer must be BLOCK_SIZE bytes");
        debug_assert!((0..DISK_BLOCKS as i32).contains(&block));

        let offset = block as u64 * BLOCK_SIZE as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < BLOCK_SIZE {
            data[bytes_read..].fill(0);
        }

        Ok(())
    }

    /// Writes one block from the provided buffer. The buffer must be
    /// exactly BLOCK_SIZE bytes.
    pub fn write_block(&self, data: &[u8], block: BlockNum) -> Result<()> {
        assert_eq!(data.len(), BLOCK_SIZE, "Buffer must be BLOCK_SIZE bytes");
        debug_assert!((0..DISK_BLOCKS as i32).contains(&block));

        let offset = block as u64 * BLOCK_SIZE as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        Ok(())
    }

    /// Returns the path to the backing file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Syncs all written data to durable storage.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for FileBlockStore {
    fn drop(&mut self) {
        let file = self.file.get_mut();
        let _ = file.sync_all();
    }
}
