//! # On-Disk Header Definitions
//!
//! Type-safe, zerocopy-based header structs for the index file. Two headers
//! exist: the index file header occupying the start of block 0, and the
//! node header at the start of every node block.
//!
//! ## Index File Header Layout (40 bytes, block 0)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       8     dimensions   Number of spatial axes D
//! 8       8     key_size     MBR byte size (2·D coordinates)
//! 16      8     value_size   Leaf payload byte size
//! 24      8     block_size   Block byte size
//! 32      8     root_offset  File offset of the root node (0 = empty)
//! ```
//!
//! The remaining bytes of block 0 are reserved and zero.
//!
//! ## Node Header Layout (24 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       1     block_type   0 = leaf, 1 = inner
//! 1       7     padding      Zero
//! 8       8     entry_count  Number of packed entries
//! 16      8     self_offset  This node's own file offset
//! ```
//!
//! All multi-byte fields are little-endian; the zerocopy
//! `U64<LittleEndian>` type handles conversion and works with the
//! unaligned reads an mmap requires.

use eyre::{ensure, Result};
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::{INDEX_HEADER_SIZE, INVALID_ROOT_OFFSET, NODE_HEADER_SIZE};

/// Discriminates leaf blocks (data entries) from inner blocks (routing
/// entries).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Leaf = 0,
    Inner = 1,
}

impl BlockType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(BlockType::Leaf),
            1 => Some(BlockType::Inner),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct IndexFileHeader {
    dimensions: U64,
    key_size: U64,
    value_size: U64,
    block_size: U64,
    root_offset: U64,
}

const _: () = assert!(std::mem::size_of::<IndexFileHeader>() == INDEX_HEADER_SIZE);

impl IndexFileHeader {
    pub fn new(dimensions: u64, key_size: u64, value_size: u64, block_size: u64) -> Self {
        Self {
            dimensions: U64::new(dimensions),
            key_size: U64::new(key_size),
            value_size: U64::new(value_size),
            block_size: U64::new(block_size),
            root_offset: U64::new(INVALID_ROOT_OFFSET),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= INDEX_HEADER_SIZE,
            "buffer too small for IndexFileHeader: {} < {}",
            bytes.len(),
            INDEX_HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..INDEX_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse IndexFileHeader: {:?}", e))
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            bytes.len() >= INDEX_HEADER_SIZE,
            "buffer too small for IndexFileHeader: {} < {}",
            bytes.len(),
            INDEX_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut bytes[..INDEX_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse IndexFileHeader: {:?}", e))
    }

    pub fn dimensions(&self) -> u64 {
        self.dimensions.get()
    }

    pub fn key_size(&self) -> u64 {
        self.key_size.get()
    }

    pub fn value_size(&self) -> u64 {
        self.value_size.get()
    }

    pub fn block_size(&self) -> u64 {
        self.block_size.get()
    }

    pub fn root_offset(&self) -> u64 {
        self.root_offset.get()
    }

    pub fn set_root_offset(&mut self, offset: u64) {
        self.root_offset = U64::new(offset);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    block_type: u8,
    padding: [u8; 7],
    entry_count: U64,
    self_offset: U64,
}

const _: () = assert!(std::mem::size_of::<NodeHeader>() == NODE_HEADER_SIZE);

impl NodeHeader {
    pub fn new(block_type: BlockType, entry_count: u64, self_offset: u64) -> Self {
        Self {
            block_type: block_type as u8,
            padding: [0u8; 7],
            entry_count: U64::new(entry_count),
            self_offset: U64::new(self_offset),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= NODE_HEADER_SIZE,
            "buffer too small for NodeHeader: {} < {}",
            bytes.len(),
            NODE_HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse NodeHeader: {:?}", e))
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            bytes.len() >= NODE_HEADER_SIZE,
            "buffer too small for NodeHeader: {} < {}",
            bytes.len(),
            NODE_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut bytes[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse NodeHeader: {:?}", e))
    }

    pub fn block_type(&self) -> Option<BlockType> {
        BlockType::from_byte(self.block_type)
    }

    pub fn set_block_type(&mut self, block_type: BlockType) {
        self.block_type = block_type as u8;
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count.get()
    }

    pub fn set_entry_count(&mut self, count: u64) {
        self.entry_count = U64::new(count);
    }

    pub fn self_offset(&self) -> u64 {
        self.self_offset.get()
    }

    pub fn set_self_offset(&mut self, offset: u64) {
        self.self_offset = U64::new(offset);
    }
}
