//! # Node Views
//!
//! A tree node occupies exactly one block: a 24-byte header followed by a
//! packed array of fixed-size (key, value) slots. This module interprets a
//! raw block as such a node without knowing anything about the tree.
//!
//! ## Slot Layout
//!
//! ```text
//! +---------------------------+
//! |  NodeHeader (24 bytes)    |
//! +---------------------------+
//! |  Slot 0: key | value      |   key   = 2·D coordinates, little-endian
//! |  Slot 1: key | value      |   value = payload (leaf) or child offset
//! |  ...                      |           (inner, 8 bytes)
//! +---------------------------+
//! |  Unused tail (undefined)  |
//! +---------------------------+
//! ```
//!
//! Slot `i` starts at byte `24 + i·(key_size + slot_value_size)`. The slot
//! value size differs between leaves (schema payload size) and inner nodes
//! (8-byte child offset) and so, therefore, does the entry capacity.
//!
//! ## Read Semantics
//!
//! `key_at` decodes the MBR out of the block and returns it by value.
//! Handing out references into block storage for keys invites aliasing
//! into memory that a later grow or split rewrites; an MBR is a handful of
//! scalars and the copy is cheap. Payload bytes are borrowed briefly and
//! copied by the tree engine at the API boundary.
//!
//! Like the leaf/interior views of a B-tree page, the read view and the
//! write view come as a pair: `NodeRef` borrows the block immutably,
//! `NodeMut` mutably, and `NodeMut::as_ref` gives the read view of a
//! write borrow.

use std::marker::PhantomData;

use eyre::{ensure, Result};

use crate::rtree::key::{Coordinate, Mbr};
use crate::storage::{BlockType, NodeHeader, CHILD_PTR_SIZE, NODE_HEADER_SIZE};

/// Schema parameters every node view needs: fixed at index creation,
/// copied freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSchema {
    pub dimensions: usize,
    pub key_size: usize,
    pub value_size: usize,
    pub block_size: usize,
}

impl NodeSchema {
    /// Byte width of the value part of a slot. Inner nodes store an 8-byte
    /// child offset regardless of the schema's payload size.
    pub fn slot_value_size(&self, block_type: BlockType) -> usize {
        match block_type {
            BlockType::Leaf => self.value_size,
            BlockType::Inner => CHILD_PTR_SIZE,
        }
    }

    pub fn slot_size(&self, block_type: BlockType) -> usize {
        self.key_size + self.slot_value_size(block_type)
    }

    /// Entry capacity of one node of the given type.
    pub fn capacity(&self, block_type: BlockType) -> usize {
        (self.block_size - NODE_HEADER_SIZE) / self.slot_size(block_type)
    }
}

#[derive(Debug)]
pub struct NodeRef<'a, C: Coordinate> {
    data: &'a [u8],
    schema: NodeSchema,
    _coord: PhantomData<C>,
}

pub struct NodeMut<'a, C: Coordinate> {
    data: &'a mut [u8],
    schema: NodeSchema,
    _coord: PhantomData<C>,
}

impl<'a, C: Coordinate> NodeRef<'a, C> {
    pub fn from_block(data: &'a [u8], schema: NodeSchema) -> Result<Self> {
        validate_block(data, schema)?;
        Ok(Self {
            data,
            schema,
            _coord: PhantomData,
        })
    }

    fn header(&self) -> &NodeHeader {
        NodeHeader::from_bytes(self.data).unwrap()
    }

    pub fn block_type(&self) -> BlockType {
        self.header().block_type().unwrap()
    }

    pub fn is_leaf(&self) -> bool {
        self.block_type() == BlockType::Leaf
    }

    pub fn count(&self) -> usize {
        self.header().entry_count() as usize
    }

    pub fn self_offset(&self) -> u64 {
        self.header().self_offset()
    }

    pub fn capacity(&self) -> usize {
        self.schema.capacity(self.block_type())
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity()
    }

    fn slot_offset(&self, index: usize) -> usize {
        NODE_HEADER_SIZE + index * self.schema.slot_size(self.block_type())
    }

    /// Reads the MBR of slot `index` out of the block, by value.
    pub fn key_at(&self, index: usize) -> Mbr<C> {
        assert!(
            index < self.count(),
            "slot index {} out of bounds (count={})",
            index,
            self.count()
        );
        let offset = self.slot_offset(index);
        Mbr::read_from(&self.data[offset..], self.schema.dimensions)
    }

    /// Raw value bytes of slot `index`: the payload in a leaf, the packed
    /// child offset in an inner node.
    pub fn slot_value_at(&self, index: usize) -> &'a [u8] {
        assert!(
            index < self.count(),
            "slot index {} out of bounds (count={})",
            index,
            self.count()
        );
        let start = self.slot_offset(index) + self.schema.key_size;
        &self.data[start..start + self.schema.slot_value_size(self.block_type())]
    }

    /// Payload bytes of leaf slot `index`.
    pub fn value_at(&self, index: usize) -> &'a [u8] {
        assert!(self.is_leaf(), "value_at on inner node");
        self.slot_value_at(index)
    }

    /// Child block offset of inner slot `index`.
    pub fn child_at(&self, index: usize) -> u64 {
        assert!(!self.is_leaf(), "child_at on leaf node");
        let bytes = self.slot_value_at(index);
        let mut buf = [0u8; CHILD_PTR_SIZE];
        buf.copy_from_slice(bytes);
        u64::from_le_bytes(buf)
    }

    /// Axis-wise union of every key in this node. The node must hold at
    /// least one entry.
    pub fn covering_mbr(&self) -> Mbr<C> {
        assert!(self.count() > 0, "covering MBR of an empty node");
        let mut cover = self.key_at(0);
        for i in 1..self.count() {
            cover.enlarge(&self.key_at(i));
        }
        cover
    }
}

impl<'a, C: Coordinate> NodeMut<'a, C> {
    pub fn from_block(data: &'a mut [u8], schema: NodeSchema) -> Result<Self> {
        validate_block(data, schema)?;
        Ok(Self {
            data,
            schema,
            _coord: PhantomData,
        })
    }

    /// Writes a fresh empty-node header into the block and returns the
    /// write view. Stale slot bytes beyond the header are left alone;
    /// the entry count makes them unreachable.
    pub fn init(
        data: &'a mut [u8],
        schema: NodeSchema,
        block_type: BlockType,
        self_offset: u64,
    ) -> Result<Self> {
        ensure!(
            data.len() == schema.block_size,
            "invalid block size: {} != {}",
            data.len(),
            schema.block_size
        );

        let header = NodeHeader::new(block_type, 0, self_offset);
        data[..NODE_HEADER_SIZE].copy_from_slice(zerocopy::IntoBytes::as_bytes(&header));

        Ok(Self {
            data,
            schema,
            _coord: PhantomData,
        })
    }

    pub fn as_ref(&self) -> NodeRef<'_, C> {
        NodeRef {
            data: self.data,
            schema: self.schema,
            _coord: PhantomData,
        }
    }

    fn header_mut(&mut self) -> &mut NodeHeader {
        NodeHeader::from_bytes_mut(self.data).unwrap()
    }

    pub fn block_type(&self) -> BlockType {
        self.as_ref().block_type()
    }

    pub fn is_leaf(&self) -> bool {
        self.as_ref().is_leaf()
    }

    pub fn count(&self) -> usize {
        self.as_ref().count()
    }

    pub fn capacity(&self) -> usize {
        self.as_ref().capacity()
    }

    pub fn is_full(&self) -> bool {
        self.as_ref().is_full()
    }

    pub fn key_at(&self, index: usize) -> Mbr<C> {
        self.as_ref().key_at(index)
    }

    /// Overwrites the MBR of an existing slot.
    pub fn set_key_at(&mut self, index: usize, key: &Mbr<C>) {
        assert!(
            index < self.count(),
            "slot index {} out of bounds (count={})",
            index,
            self.count()
        );
        assert_eq!(key.dims(), self.schema.dimensions, "MBR dimension mismatch");
        let offset = NODE_HEADER_SIZE + index * self.schema.slot_size(self.block_type());
        key.write_to(&mut self.data[offset..offset + self.schema.key_size]);
    }

    /// Writes a new entry at slot `count` and increments the count. The
    /// node must not be full and the value must match the slot width.
    pub fn append_entry(&mut self, key: &Mbr<C>, value: &[u8]) {
        let block_type = self.block_type();
        let count = self.count();
        assert!(count < self.capacity(), "append to full node");
        assert_eq!(key.dims(), self.schema.dimensions, "MBR dimension mismatch");
        assert_eq!(
            value.len(),
            self.schema.slot_value_size(block_type),
            "slot value size mismatch"
        );

        let offset = NODE_HEADER_SIZE + count * self.schema.slot_size(block_type);
        key.write_to(&mut self.data[offset..offset + self.schema.key_size]);
        let value_start = offset + self.schema.key_size;
        self.data[value_start..value_start + value.len()].copy_from_slice(value);

        self.header_mut().set_entry_count(count as u64 + 1);
    }

    /// Appends a routing entry into an inner node.
    pub fn append_child(&mut self, key: &Mbr<C>, child_offset: u64) {
        assert!(!self.is_leaf(), "append_child on leaf node");
        self.append_entry(key, &child_offset.to_le_bytes());
    }

    /// Removes slot `index`, shifting the slots above it down by one.
    pub fn remove_at(&mut self, index: usize) {
        let count = self.count();
        assert!(
            index < count,
            "remove index {} out of bounds (count={})",
            index,
            count
        );

        let slot_size = self.schema.slot_size(self.block_type());
        let start = NODE_HEADER_SIZE + (index + 1) * slot_size;
        let end = NODE_HEADER_SIZE + count * slot_size;
        if start < end {
            self.data.copy_within(start..end, start - slot_size);
        }

        self.header_mut().set_entry_count(count as u64 - 1);
    }

    /// Drops all entries. Slot bytes stay in place but become
    /// unreachable.
    pub fn clear(&mut self) {
        self.header_mut().set_entry_count(0);
    }
}

fn validate_block(data: &[u8], schema: NodeSchema) -> Result<()> {
    ensure!(
        data.len() == schema.block_size,
        "invalid block size: {} != {}",
        data.len(),
        schema.block_size
    );

    let header = NodeHeader::from_bytes(data)?;
    let block_type = match header.block_type() {
        Some(bt) => bt,
        None => eyre::bail!("corrupt node header: unknown block type"),
    };

    ensure!(
        header.entry_count() as usize <= schema.capacity(block_type),
        "corrupt node header: entry count {} exceeds capacity {}",
        header.entry_count(),
        schema.capacity(block_type)
    );

    Ok(())
}
