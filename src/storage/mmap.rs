//! # Memory-Mapped Block Store
//!
//! This module implements `MmapStore`, the low-level building block for
//! index file access. The file is mapped into the process address space,
//! so block lookups are pointer arithmetic and node mutation happens
//! directly in mapped memory; the OS page cache does the rest.
//!
//! ## Growth
//!
//! The file grows lazily, one block at a time, through `allocate()`.
//! Growth extends the file with `set_len` (new bytes read as zero) and
//! remaps. `allocate()` takes `&mut self`, so the compiler guarantees no
//! block reference taken before the grow survives it; a reader coming back
//! after a grow re-resolves the block address through `block()` and sees
//! the same bytes at the same file offset.
//!
//! ## Failure Modes
//!
//! - `block()`/`block_mut()` fail if the offset is not block-aligned or
//!   lies beyond the current file size.
//! - `create()` fails if the file already exists; `open()` fails if the
//!   file size is not a whole number of blocks.
//! - `allocate()` propagates `set_len`/remap failures (out of space).

use std::fs::{File, OpenOptions};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

use super::PAGE_UNIT;

#[derive(Debug)]
pub struct MmapStore {
    file: File,
    mmap: MmapMut,
    block_size: usize,
    size: u64,
}

impl MmapStore {
    /// Creates a new index file sized to exactly one block. Fails if the
    /// file already exists.
    pub fn create<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let path = path.as_ref();
        validate_block_size(block_size)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create index file '{}'", path.display()))?;

        file.set_len(block_size as u64)
            .wrap_err_with(|| format!("failed to size '{}' to {} bytes", path.display(), block_size))?;

        // SAFETY: MmapMut::map_mut is unsafe because memory-mapped files can
        // be modified externally, leading to undefined behavior. This is safe
        // because:
        // 1. We just created this file exclusively (create_new)
        // 2. The file size is a valid multiple of block_size
        // 3. The mmap lifetime is tied to MmapStore, preventing use-after-unmap
        // 4. All access goes through block()/block_mut() which bounds-check
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            block_size,
            size: block_size as u64,
        })
    }

    /// Opens an existing index file read-write.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let path = path.as_ref();
        validate_block_size(block_size)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open index file '{}'", path.display()))?;

        let size = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?
            .len();

        ensure!(
            size > 0,
            "cannot open empty index file '{}'",
            path.display()
        );

        ensure!(
            size % block_size as u64 == 0,
            "index file '{}' size {} is not a multiple of block size {}",
            path.display(),
            size,
            block_size
        );

        // SAFETY: see create(); the file is opened read-write and index files
        // are not modified by external processes while a handle is live.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            block_size,
            size,
        })
    }

    /// Returns the block starting at `offset` as an immutable slice of
    /// exactly one block.
    pub fn block(&self, offset: u64) -> Result<&[u8]> {
        self.check_offset(offset)?;
        let start = offset as usize;
        Ok(&self.mmap[start..start + self.block_size])
    }

    /// Returns the block starting at `offset` as a mutable slice.
    pub fn block_mut(&mut self, offset: u64) -> Result<&mut [u8]> {
        self.check_offset(offset)?;
        let start = offset as usize;
        Ok(&mut self.mmap[start..start + self.block_size])
    }

    /// Appends one zero-initialised block to the file and returns its
    /// offset.
    pub fn allocate(&mut self) -> Result<u64> {
        let offset = self.size;
        self.grow(self.size + self.block_size as u64)?;
        Ok(offset)
    }

    fn grow(&mut self, new_size: u64) -> Result<()> {
        if new_size <= self.size {
            return Ok(());
        }

        self.mmap
            .flush_async()
            .wrap_err("failed to flush mmap before grow")?;

        self.file
            .set_len(new_size)
            .wrap_err_with(|| format!("failed to extend index file to {} bytes", new_size))?;

        // SAFETY: the old mmap becomes invalid here. This is safe because:
        // 1. grow() requires &mut self, so no block references can exist
        // 2. The old mmap was flushed above
        // 3. The file was extended before remapping
        // 4. The old mmap is dropped when we assign the new one
        self.mmap =
            unsafe { MmapMut::map_mut(&self.file).wrap_err("failed to remap file after grow")? };

        self.size = new_size;

        Ok(())
    }

    /// Flushes all mapped pages to disk.
    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().wrap_err("failed to sync mmap to disk")
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn check_offset(&self, offset: u64) -> Result<()> {
        ensure!(
            offset % self.block_size as u64 == 0,
            "offset {} is not aligned to block size {}",
            offset,
            self.block_size
        );
        ensure!(
            offset + self.block_size as u64 <= self.size,
            "offset {} out of bounds (file size {})",
            offset,
            self.size
        );
        Ok(())
    }
}

fn validate_block_size(block_size: usize) -> Result<()> {
    ensure!(
        block_size > 0 && block_size % PAGE_UNIT == 0,
        "block size {} must be a positive multiple of {}",
        block_size,
        PAGE_UNIT
    );
    Ok(())
}
