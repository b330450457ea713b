//! # R-Tree Engine
//!
//! The tree proper: search, choose-leaf descent, insertion with quadratic
//! split and upward MBR propagation, root promotion, find-leaf and delete
//! with condensation of ancestor MBRs.
//!
//! ## Structure
//!
//! The tree stores block offsets rather than memory pointers, enabling
//! persistence and in-place mutation through the mmap layer:
//!
//! ```text
//!                  [Inner @8192]
//!                  /           \
//!        [Leaf @4096]       [Leaf @12288]
//! ```
//!
//! Every routing entry in an inner node carries the axis-wise union of all
//! MBRs stored in the subtree below it. Insertion and deletion restore
//! this invariant bottom-up along the descent path they recorded.
//!
//! ## Insert Algorithm
//!
//! ```text
//! 1. Empty tree: allocate a leaf, publish it as root, install the entry
//! 2. Descend from root, at each inner node choosing the entry whose key
//!    needs the least enlargement (ties: smaller area, then lowest index),
//!    recording (offset, entry index) frames
//! 3. Append into the leaf, or split it when full
//! 4. Walk the frames upward: refresh each routing key; install the split
//!    sibling, splitting the ancestor in turn when it is full
//! 5. If the split reaches the top, promote a new inner root over the two
//!    halves and publish it in the index header
//! ```
//!
//! ## Delete Algorithm
//!
//! Find-leaf descends into every routing entry containing the target key
//! and scans leaves for an exact match. After removing the slot, ancestor
//! covering keys are tightened bottom-up until one is already exact.
//! Orphan re-insertion and underflow merging are not performed; a leaf
//! emptied by deletion keeps its block and its (stale) routing entry.
//!
//! ## Read / Write Split
//!
//! `RTreeView` borrows the store immutably and carries every read-only
//! traversal; `RTree` borrows it mutably for insert and delete. Mutating
//! code re-resolves block addresses through the store on every step, so
//! nothing survives a grow-triggered remap.

use std::fmt::Write as _;

use eyre::{ensure, Result};
use smallvec::SmallVec;

use crate::rtree::key::{Coordinate, Mbr};
use crate::rtree::node::{NodeMut, NodeRef, NodeSchema};
use crate::rtree::split::{quadratic_partition, SplitEntry};
use crate::storage::{BlockType, IndexFileHeader, MmapStore, INVALID_ROOT_OFFSET};

/// Which predicate a search applies at the leaf level. Inner-level
/// pruning always uses overlap: a subtree can hold query-contained
/// entries only if its covering MBR overlaps the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Stored MBR intersects the query rectangle.
    Overlap,
    /// Stored MBR lies fully inside the query rectangle.
    Containment,
}

/// Read-only tree traversals over a shared store borrow.
pub struct RTreeView<'s, C: Coordinate> {
    store: &'s MmapStore,
    schema: NodeSchema,
    _coord: std::marker::PhantomData<C>,
}

/// Mutating tree operations over an exclusive store borrow.
pub struct RTree<'s, C: Coordinate> {
    store: &'s mut MmapStore,
    schema: NodeSchema,
    _coord: std::marker::PhantomData<C>,
}

impl<'s, C: Coordinate> RTreeView<'s, C> {
    pub fn new(store: &'s MmapStore, schema: NodeSchema) -> Self {
        Self {
            store,
            schema,
            _coord: std::marker::PhantomData,
        }
    }

    fn node(&self, offset: u64) -> Result<NodeRef<'s, C>> {
        NodeRef::from_block(self.store.block(offset)?, self.schema)
    }

    pub fn root_offset(&self) -> Result<u64> {
        Ok(IndexFileHeader::from_bytes(self.store.block(0)?)?.root_offset())
    }

    /// Collects every leaf entry matching the query under the given mode.
    /// Result order is unspecified.
    pub fn search(&self, query: &Mbr<C>, mode: SearchMode) -> Result<Vec<(Mbr<C>, Vec<u8>)>> {
        assert_eq!(query.dims(), self.schema.dimensions, "key dimension mismatch");

        let mut results = Vec::new();
        let root = self.root_offset()?;
        if root == INVALID_ROOT_OFFSET {
            return Ok(results);
        }
        self.collect(root, query, mode, &mut results)?;
        Ok(results)
    }

    fn collect(
        &self,
        offset: u64,
        query: &Mbr<C>,
        mode: SearchMode,
        out: &mut Vec<(Mbr<C>, Vec<u8>)>,
    ) -> Result<()> {
        let node = self.node(offset)?;

        if node.is_leaf() {
            for i in 0..node.count() {
                let key = node.key_at(i);
                let hit = match mode {
                    SearchMode::Overlap => key.overlaps(query),
                    SearchMode::Containment => query.contains(&key),
                };
                if hit {
                    out.push((key, node.value_at(i).to_vec()));
                }
            }
        } else {
            for i in 0..node.count() {
                if node.key_at(i).overlaps(query) {
                    self.collect(node.child_at(i), query, mode, out)?;
                }
            }
        }

        Ok(())
    }

    /// Every stored (key, value) pair, in traversal order.
    pub fn all_entries(&self) -> Result<Vec<(Mbr<C>, Vec<u8>)>> {
        let mut results = Vec::new();
        let root = self.root_offset()?;
        if root == INVALID_ROOT_OFFSET {
            return Ok(results);
        }
        self.collect_all(root, &mut results)?;
        Ok(results)
    }

    fn collect_all(&self, offset: u64, out: &mut Vec<(Mbr<C>, Vec<u8>)>) -> Result<()> {
        let node = self.node(offset)?;

        if node.is_leaf() {
            for i in 0..node.count() {
                out.push((node.key_at(i), node.value_at(i).to_vec()));
            }
        } else {
            for i in 0..node.count() {
                self.collect_all(node.child_at(i), out)?;
            }
        }

        Ok(())
    }

    /// Descends into every routing entry containing the target key and
    /// scans leaves for an exact key match. On success `path` holds the
    /// (offset, entry index) frames from the root down to the matching
    /// leaf slot.
    pub(crate) fn locate(
        &self,
        offset: u64,
        key: &Mbr<C>,
        path: &mut Vec<(u64, usize)>,
    ) -> Result<bool> {
        let node = self.node(offset)?;

        if node.is_leaf() {
            for i in 0..node.count() {
                if node.key_at(i) == *key {
                    path.push((offset, i));
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        for i in 0..node.count() {
            if node.key_at(i).contains(key) {
                path.push((offset, i));
                if self.locate(node.child_at(i), key, path)? {
                    return Ok(true);
                }
                path.pop();
            }
        }

        Ok(false)
    }

    /// Formatted per-level dump: each node's offset, entry count over
    /// capacity, and covering MBR.
    pub fn format_tree(&self) -> Result<String> {
        let mut out = String::new();
        let root = self.root_offset()?;
        if root == INVALID_ROOT_OFFSET {
            out.push_str("(empty tree)\n");
            return Ok(out);
        }

        let mut level = 0usize;
        let mut current = vec![root];
        while !current.is_empty() {
            let _ = writeln!(out, "level {}:", level);
            let mut next = Vec::new();
            for &offset in &current {
                let node = self.node(offset)?;
                let kind = if node.is_leaf() { "leaf" } else { "inner" };
                if node.count() == 0 {
                    let _ = writeln!(out, "  {} @{} 0/{}", kind, offset, node.capacity());
                } else {
                    let _ = writeln!(
                        out,
                        "  {} @{} {}/{} cover={}",
                        kind,
                        offset,
                        node.count(),
                        node.capacity(),
                        node.covering_mbr()
                    );
                }
                if !node.is_leaf() {
                    for i in 0..node.count() {
                        next.push(node.child_at(i));
                    }
                }
            }
            current = next;
            level += 1;
        }

        Ok(out)
    }

    /// Number of levels, counting the root. Zero for an empty tree.
    pub fn height(&self) -> Result<usize> {
        let root = self.root_offset()?;
        if root == INVALID_ROOT_OFFSET {
            return Ok(0);
        }
        let mut height = 1;
        let mut offset = root;
        loop {
            let node = self.node(offset)?;
            if node.is_leaf() || node.count() == 0 {
                return Ok(height);
            }
            offset = node.child_at(0);
            height += 1;
        }
    }

    /// Walks the whole tree checking structural invariants: entry counts
    /// within capacity, non-empty inner nodes, consistent leaf depth,
    /// accurate self offsets, and routing keys equal to their child's
    /// covering MBR. Leaves emptied by deletion are tolerated and their
    /// (stale) routing entry is skipped.
    pub fn validate(&self) -> Result<()> {
        let root = self.root_offset()?;
        if root == INVALID_ROOT_OFFSET {
            return Ok(());
        }
        self.check_subtree(root)?;
        Ok(())
    }

    fn check_subtree(&self, offset: u64) -> Result<(Option<Mbr<C>>, usize)> {
        let node = self.node(offset)?;

        ensure!(
            node.self_offset() == offset,
            "node at {} records self offset {}",
            offset,
            node.self_offset()
        );

        if node.is_leaf() {
            let cover = if node.count() > 0 {
                Some(node.covering_mbr())
            } else {
                None
            };
            return Ok((cover, 1));
        }

        ensure!(node.count() >= 1, "inner node at {} has no entries", offset);

        let mut height: Option<usize> = None;
        let mut cover: Option<Mbr<C>> = None;

        for i in 0..node.count() {
            let key = node.key_at(i);
            let (child_cover, child_height) = self.check_subtree(node.child_at(i))?;

            match height {
                None => height = Some(child_height),
                Some(h) => ensure!(
                    h == child_height,
                    "uneven leaf depth under inner node at {}",
                    offset
                ),
            }

            if let Some(child_cover) = child_cover {
                ensure!(
                    key == child_cover,
                    "routing key {} at node {} entry {} does not match child covering MBR {}",
                    key,
                    offset,
                    i,
                    child_cover
                );
            }

            cover = match cover {
                None => Some(key),
                Some(mut c) => {
                    c.enlarge(&key);
                    Some(c)
                }
            };
        }

        Ok((cover, height.unwrap_or(1) + 1))
    }
}

impl<'s, C: Coordinate> RTree<'s, C> {
    pub fn new(store: &'s mut MmapStore, schema: NodeSchema) -> Self {
        Self {
            store,
            schema,
            _coord: std::marker::PhantomData,
        }
    }

    fn view(&self) -> RTreeView<'_, C> {
        RTreeView::new(self.store, self.schema)
    }

    fn set_root_offset(&mut self, offset: u64) -> Result<()> {
        let data = self.store.block_mut(0)?;
        IndexFileHeader::from_bytes_mut(data)?.set_root_offset(offset);
        Ok(())
    }

    /// Appends a block and writes an empty node header into it.
    fn allocate_node(&mut self, block_type: BlockType) -> Result<u64> {
        let offset = self.store.allocate()?;
        let data = self.store.block_mut(offset)?;
        NodeMut::<C>::init(data, self.schema, block_type, offset)?;
        Ok(offset)
    }

    /// Inserts one (key, value) entry.
    pub fn insert(&mut self, key: &Mbr<C>, value: &[u8]) -> Result<()> {
        assert_eq!(key.dims(), self.schema.dimensions, "key dimension mismatch");

        let root = self.view().root_offset()?;

        if root == INVALID_ROOT_OFFSET {
            let offset = self.allocate_node(BlockType::Leaf)?;
            let data = self.store.block_mut(offset)?;
            let mut leaf = NodeMut::from_block(data, self.schema)?;
            leaf.append_entry(key, value);
            self.set_root_offset(offset)?;
            return Ok(());
        }

        // choose leaf, recording the descent path
        let mut path: SmallVec<[(u64, usize); 8]> = SmallVec::new();
        let mut current = root;
        loop {
            let view = self.view();
            let node = view.node(current)?;
            if node.is_leaf() {
                break;
            }
            let index = choose_subtree(&node, key);
            path.push((current, index));
            current = node.child_at(index);
        }
        let leaf_offset = current;

        // install at the leaf
        let mut pending: Option<(Mbr<C>, u64)> = None;
        let mut child_cover;
        let mut child_offset = leaf_offset;

        if self.view().node(leaf_offset)?.is_full() {
            let (orig_cover, new_cover, new_offset) = self.split_node(leaf_offset, key, value)?;
            child_cover = orig_cover;
            pending = Some((new_cover, new_offset));
        } else {
            let data = self.store.block_mut(leaf_offset)?;
            let mut leaf = NodeMut::from_block(data, self.schema)?;
            leaf.append_entry(key, value);
            child_cover = leaf.as_ref().covering_mbr();
        }

        // propagate covering MBRs (and any split sibling) up the path
        while let Some((ancestor_offset, entry_index)) = path.pop() {
            let changed = {
                let data = self.store.block_mut(ancestor_offset)?;
                let mut node = NodeMut::from_block(data, self.schema)?;
                let changed = node.key_at(entry_index) != child_cover;
                if changed {
                    node.set_key_at(entry_index, &child_cover);
                }
                changed
            };

            match pending.take() {
                Some((new_cover, new_offset)) => {
                    if self.view().node(ancestor_offset)?.is_full() {
                        let (orig_cover, split_cover, split_offset) = self.split_node(
                            ancestor_offset,
                            &new_cover,
                            &new_offset.to_le_bytes(),
                        )?;
                        child_cover = orig_cover;
                        pending = Some((split_cover, split_offset));
                    } else {
                        let data = self.store.block_mut(ancestor_offset)?;
                        let mut node = NodeMut::from_block(data, self.schema)?;
                        node.append_child(&new_cover, new_offset);
                        child_cover = node.as_ref().covering_mbr();
                    }
                }
                None => {
                    if !changed {
                        return Ok(());
                    }
                    child_cover = self.view().node(ancestor_offset)?.covering_mbr();
                }
            }

            child_offset = ancestor_offset;
        }

        // a split that ran off the top of the path means the root split
        if let Some((new_cover, new_offset)) = pending {
            let new_root = self.allocate_node(BlockType::Inner)?;
            let data = self.store.block_mut(new_root)?;
            let mut node = NodeMut::from_block(data, self.schema)?;
            node.append_child(&child_cover, child_offset);
            node.append_child(&new_cover, new_offset);
            self.set_root_offset(new_root)?;
        }

        Ok(())
    }

    /// Splits the full node at `offset`, folding in one new entry. The
    /// original block is rewritten with group 2 and a fresh block receives
    /// group 1. Returns (rewritten cover, new sibling cover, new sibling
    /// offset).
    fn split_node(
        &mut self,
        offset: u64,
        new_key: &Mbr<C>,
        new_value: &[u8],
    ) -> Result<(Mbr<C>, Mbr<C>, u64)> {
        let (block_type, mut entries) = {
            let view = self.view();
            let node = view.node(offset)?;
            let mut staged = Vec::with_capacity(node.count() + 1);
            for i in 0..node.count() {
                staged.push(SplitEntry::new(node.key_at(i), node.slot_value_at(i)));
            }
            (node.block_type(), staged)
        };
        entries.push(SplitEntry::new(new_key.clone(), new_value));

        let groups = quadratic_partition(entries);

        let new_offset = self.store.allocate()?;

        {
            let data = self.store.block_mut(offset)?;
            let mut node = NodeMut::<C>::init(data, self.schema, block_type, offset)?;
            for entry in &groups.group2 {
                node.append_entry(&entry.key, &entry.value);
            }
        }
        {
            let data = self.store.block_mut(new_offset)?;
            let mut node = NodeMut::<C>::init(data, self.schema, block_type, new_offset)?;
            for entry in &groups.group1 {
                node.append_entry(&entry.key, &entry.value);
            }
        }

        Ok((groups.mbr2, groups.mbr1, new_offset))
    }

    /// Removes the first entry whose key exactly equals `key`. Returns
    /// false, leaving the tree untouched, when no such entry exists.
    pub fn delete(&mut self, key: &Mbr<C>) -> Result<bool> {
        assert_eq!(key.dims(), self.schema.dimensions, "key dimension mismatch");

        let root = self.view().root_offset()?;
        if root == INVALID_ROOT_OFFSET {
            return Ok(false);
        }

        let path = {
            let view = self.view();
            let mut frames = Vec::new();
            if !view.locate(root, key, &mut frames)? {
                return Ok(false);
            }
            frames
        };

        let (leaf_offset, entry_index) = *path.last().unwrap();
        {
            let data = self.store.block_mut(leaf_offset)?;
            let mut leaf = NodeMut::<C>::from_block(data, self.schema)?;
            leaf.remove_at(entry_index);
        }

        // condense: tighten ancestor covering keys until one is already exact
        let mut child_offset = leaf_offset;
        for &(ancestor_offset, entry_index) in path[..path.len() - 1].iter().rev() {
            let cover = {
                let child = self.view().node(child_offset)?;
                if child.count() == 0 {
                    // emptied leaf keeps its block; its covering MBR is
                    // undefined, so the parent entry stays as it was
                    return Ok(true);
                }
                child.covering_mbr()
            };

            let data = self.store.block_mut(ancestor_offset)?;
            let mut node = NodeMut::from_block(data, self.schema)?;
            if node.key_at(entry_index) == cover {
                break;
            }
            node.set_key_at(entry_index, &cover);
            child_offset = ancestor_offset;
        }

        Ok(true)
    }
}

/// Picks the routing entry to descend into: least enlargement cost, ties
/// broken by smaller area, then by lowest index.
fn choose_subtree<C: Coordinate>(node: &NodeRef<'_, C>, key: &Mbr<C>) -> usize {
    let first = node.key_at(0);
    let mut best = 0;
    let mut best_cost = first.enlargement_cost(key);
    let mut best_area = first.area();

    for i in 1..node.count() {
        let entry = node.key_at(i);
        let cost = entry.enlargement_cost(key);
        if cost < best_cost || (cost == best_cost && entry.area() < best_area) {
            best = i;
            best_cost = cost;
            best_area = entry.area();
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const BLOCK_SIZE: usize = 4096;

    fn schema_2d() -> NodeSchema {
        NodeSchema {
            dimensions: 2,
            key_size: 32,
            value_size: 8,
            block_size: BLOCK_SIZE,
        }
    }

    fn create_store() -> (tempfile::TempDir, MmapStore) {
        let dir = tempdir().unwrap();
        let mut store = MmapStore::create(dir.path().join("test.index"), BLOCK_SIZE).unwrap();
        let header = IndexFileHeader::new(2, 32, 8, BLOCK_SIZE as u64);
        store.block_mut(0).unwrap()[..crate::storage::INDEX_HEADER_SIZE]
            .copy_from_slice(zerocopy::IntoBytes::as_bytes(&header));
        (dir, store)
    }

    fn mbr(coords: &[f64]) -> Mbr<f64> {
        Mbr::new(coords)
    }

    fn insert(store: &mut MmapStore, key: &Mbr<f64>, value: u64) {
        RTree::new(store, schema_2d())
            .insert(key, &value.to_le_bytes())
            .unwrap();
    }

    fn overlap(store: &MmapStore, query: &Mbr<f64>) -> Vec<(Mbr<f64>, u64)> {
        RTreeView::new(store, schema_2d())
            .search(query, SearchMode::Overlap)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k, u64::from_le_bytes(v.try_into().unwrap())))
            .collect()
    }

    #[test]
    fn empty_tree_searches_return_nothing() {
        let (_dir, store) = create_store();
        let view = RTreeView::<f64>::new(&store, schema_2d());

        let query = mbr(&[0.0, 0.0, 100.0, 100.0]);
        assert!(view.search(&query, SearchMode::Overlap).unwrap().is_empty());
        assert!(view
            .search(&query, SearchMode::Containment)
            .unwrap()
            .is_empty());
        assert!(view.all_entries().unwrap().is_empty());
        assert_eq!(view.height().unwrap(), 0);
    }

    #[test]
    fn first_insert_creates_leaf_root() {
        let (_dir, mut store) = create_store();

        insert(&mut store, &mbr(&[0.0, 0.0, 10.0, 10.0]), 1);

        let view = RTreeView::<f64>::new(&store, schema_2d());
        assert_eq!(view.root_offset().unwrap(), BLOCK_SIZE as u64);
        assert_eq!(view.height().unwrap(), 1);
        view.validate().unwrap();
    }

    #[test]
    fn overlap_search_finds_intersecting() {
        let (_dir, mut store) = create_store();

        insert(&mut store, &mbr(&[0.0, 0.0, 10.0, 10.0]), 1);
        insert(&mut store, &mbr(&[20.0, 20.0, 30.0, 30.0]), 2);
        insert(&mut store, &mbr(&[5.0, 5.0, 25.0, 25.0]), 3);

        let mut hits = overlap(&store, &mbr(&[8.0, 8.0, 22.0, 22.0]));
        hits.sort_by_key(|(_, v)| *v);

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], (mbr(&[0.0, 0.0, 10.0, 10.0]), 1));
        assert_eq!(hits[1], (mbr(&[20.0, 20.0, 30.0, 30.0]), 2));
        assert_eq!(hits[2], (mbr(&[5.0, 5.0, 25.0, 25.0]), 3));
    }

    #[test]
    fn containment_search_requires_full_inclusion() {
        let (_dir, mut store) = create_store();

        insert(&mut store, &mbr(&[0.0, 0.0, 10.0, 10.0]), 1);
        insert(&mut store, &mbr(&[20.0, 20.0, 30.0, 30.0]), 2);
        insert(&mut store, &mbr(&[5.0, 5.0, 25.0, 25.0]), 3);

        let view = RTreeView::<f64>::new(&store, schema_2d());
        let hits = view
            .search(&mbr(&[0.0, 0.0, 15.0, 15.0]), SearchMode::Containment)
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, mbr(&[0.0, 0.0, 10.0, 10.0]));
        assert_eq!(hits[0].1, 1u64.to_le_bytes());
    }

    #[test]
    fn delete_removes_exactly_one_entry() {
        let (_dir, mut store) = create_store();

        insert(&mut store, &mbr(&[0.0, 0.0, 10.0, 10.0]), 1);
        insert(&mut store, &mbr(&[20.0, 20.0, 30.0, 30.0]), 2);
        insert(&mut store, &mbr(&[5.0, 5.0, 25.0, 25.0]), 3);

        let deleted = RTree::new(&mut store, schema_2d())
            .delete(&mbr(&[5.0, 5.0, 25.0, 25.0]))
            .unwrap();
        assert!(deleted);

        let mut hits = overlap(&store, &mbr(&[8.0, 8.0, 22.0, 22.0]));
        hits.sort_by_key(|(_, v)| *v);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].1, 1);
        assert_eq!(hits[1].1, 2);

        RTreeView::<f64>::new(&store, schema_2d()).validate().unwrap();
    }

    #[test]
    fn delete_absent_key_returns_false() {
        let (_dir, mut store) = create_store();

        insert(&mut store, &mbr(&[0.0, 0.0, 10.0, 10.0]), 1);

        let mut tree = RTree::new(&mut store, schema_2d());
        assert!(!tree.delete(&mbr(&[1.0, 1.0, 2.0, 2.0])).unwrap());
        assert!(tree.delete(&mbr(&[0.0, 0.0, 10.0, 10.0])).unwrap());
        assert!(!tree.delete(&mbr(&[0.0, 0.0, 10.0, 10.0])).unwrap());
    }

    #[test]
    fn delete_on_empty_tree_returns_false() {
        let (_dir, mut store) = create_store();

        let deleted = RTree::new(&mut store, schema_2d())
            .delete(&mbr(&[0.0, 0.0, 1.0, 1.0]))
            .unwrap();

        assert!(!deleted);
    }

    #[test]
    fn delete_tightens_ancestor_covers() {
        let (_dir, mut store) = create_store();

        // overflow a leaf so the tree has inner routing entries
        for i in 0..150 {
            let c = i as f64;
            insert(&mut store, &mbr(&[c, c, c + 1.0, c + 1.0]), i);
        }

        // remove the extreme corner entry; every cover containing it must shrink
        let deleted = RTree::new(&mut store, schema_2d())
            .delete(&mbr(&[149.0, 149.0, 150.0, 150.0]))
            .unwrap();
        assert!(deleted);

        RTreeView::<f64>::new(&store, schema_2d()).validate().unwrap();
    }

    #[test]
    fn split_grows_tree_height() {
        let (_dir, mut store) = create_store();
        let capacity = schema_2d().capacity(BlockType::Leaf);

        for i in 0..=capacity {
            let c = (i % 50) as f64;
            let r = (i / 50) as f64;
            insert(&mut store, &mbr(&[c, r, c + 1.0, r + 1.0]), i as u64);
        }

        let view = RTreeView::<f64>::new(&store, schema_2d());
        assert_eq!(view.height().unwrap(), 2);
        view.validate().unwrap();

        let hits = overlap(&store, &mbr(&[-1.0, -1.0, 60.0, 60.0]));
        assert_eq!(hits.len(), capacity + 1);
    }

    #[test]
    fn repeated_splits_keep_every_entry_reachable() {
        let (_dir, mut store) = create_store();

        // deterministic pseudo-random rectangles in [0, 100)^2
        let mut state = 0x2545F491u64;
        let mut rects = Vec::new();
        for i in 0..400u64 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let x = (state >> 33) % 100;
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let y = (state >> 33) % 100;
            let key = mbr(&[x as f64, y as f64, (x + 3) as f64, (y + 3) as f64]);
            insert(&mut store, &key, i);
            rects.push(key);
        }

        let view = RTreeView::<f64>::new(&store, schema_2d());
        assert!(view.height().unwrap() >= 2);
        view.validate().unwrap();

        let hits = overlap(&store, &mbr(&[-10.0, -10.0, 200.0, 200.0]));
        assert_eq!(hits.len(), 400);

        let mut values: Vec<u64> = hits.into_iter().map(|(_, v)| v).collect();
        values.sort_unstable();
        assert_eq!(values, (0..400).collect::<Vec<_>>());
    }

    #[test]
    fn covering_invariant_holds_after_mixed_workload() {
        let (_dir, mut store) = create_store();

        for i in 0..250u64 {
            let c = (i * 13 % 97) as f64;
            insert(&mut store, &mbr(&[c, c, c + 2.0, c + 2.0]), i);
        }
        for i in (0..250u64).step_by(3) {
            let c = (i * 13 % 97) as f64;
            RTree::new(&mut store, schema_2d())
                .delete(&mbr(&[c, c, c + 2.0, c + 2.0]))
                .unwrap();
        }

        RTreeView::<f64>::new(&store, schema_2d()).validate().unwrap();
    }

    #[test]
    fn containment_descends_through_non_contained_covers() {
        let (_dir, mut store) = create_store();

        // force a multi-node tree whose covers exceed any small query
        for i in 0..150u64 {
            let c = i as f64;
            insert(&mut store, &mbr(&[c, c, c + 1.0, c + 1.0]), i);
        }

        // the query contains individual entries but no node cover
        let view = RTreeView::<f64>::new(&store, schema_2d());
        let hits = view
            .search(&mbr(&[10.0, 10.0, 14.0, 14.0]), SearchMode::Containment)
            .unwrap();

        let mut values: Vec<u64> = hits
            .into_iter()
            .map(|(_, v)| u64::from_le_bytes(v.try_into().unwrap()))
            .collect();
        values.sort_unstable();
        assert_eq!(values, vec![10, 11, 12, 13]);
    }

    #[test]
    fn format_tree_lists_levels() {
        let (_dir, mut store) = create_store();

        for i in 0..150u64 {
            let c = i as f64;
            insert(&mut store, &mbr(&[c, c, c + 1.0, c + 1.0]), i);
        }

        let dump = RTreeView::<f64>::new(&store, schema_2d())
            .format_tree()
            .unwrap();

        assert!(dump.contains("level 0:"));
        assert!(dump.contains("level 1:"));
        assert!(dump.contains("inner @"));
        assert!(dump.contains("leaf @"));
        assert!(dump.contains("cover=("));
    }

    #[test]
    fn format_tree_on_empty_tree() {
        let (_dir, store) = create_store();

        let dump = RTreeView::<f64>::new(&store, schema_2d())
            .format_tree()
            .unwrap();

        assert_eq!(dump, "(empty tree)\n");
    }

    #[test]
    fn choose_subtree_prefers_least_enlargement() {
        let (_dir, mut store) = create_store();
        let schema = schema_2d();

        let offset = store.allocate().unwrap();
        {
            let data = store.block_mut(offset).unwrap();
            let mut node =
                NodeMut::<f64>::init(data, schema, BlockType::Inner, offset).unwrap();
            node.append_child(&mbr(&[0.0, 0.0, 10.0, 10.0]), 4096);
            node.append_child(&mbr(&[50.0, 50.0, 60.0, 60.0]), 8192);
        }

        let view = RTreeView::<f64>::new(&store, schema);
        let node = view.node(offset).unwrap();

        assert_eq!(choose_subtree(&node, &mbr(&[52.0, 52.0, 55.0, 55.0])), 1);
        assert_eq!(choose_subtree(&node, &mbr(&[1.0, 1.0, 2.0, 2.0])), 0);
    }

    #[test]
    fn choose_subtree_tie_breaks_by_area_then_index() {
        let (_dir, mut store) = create_store();
        let schema = schema_2d();

        let offset = store.allocate().unwrap();
        {
            let data = store.block_mut(offset).unwrap();
            let mut node =
                NodeMut::<f64>::init(data, schema, BlockType::Inner, offset).unwrap();
            // both cover the probe with zero enlargement; the second is smaller
            node.append_child(&mbr(&[0.0, 0.0, 20.0, 20.0]), 4096);
            node.append_child(&mbr(&[0.0, 0.0, 10.0, 10.0]), 8192);
            // same cost and area as entry 1; index order keeps entry 1
            node.append_child(&mbr(&[0.0, 0.0, 10.0, 10.0]), 12288);
        }

        let view = RTreeView::<f64>::new(&store, schema);
        let node = view.node(offset).unwrap();

        assert_eq!(choose_subtree(&node, &mbr(&[1.0, 1.0, 2.0, 2.0])), 1);
    }
}
