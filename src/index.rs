//! # Index Façade
//!
//! `SpatialIndex` is the public handle over one index file: creation and
//! opening with schema validation, and the spatial operations themselves.
//!
//! ## Schema
//!
//! An index is parameterised by four values fixed at creation and
//! recorded in block 0: the number of dimensions D, the key byte size
//! (always 2·D·sizeof(coordinate)), the payload byte size, and the block
//! byte size. `open` compares all four against the file and refuses a
//! handle on any mismatch with a [`SchemaMismatch`] error, so a reader
//! can never misinterpret packed slots.
//!
//! ## Usage
//!
//! ```ignore
//! use spindex::{Mbr, SpatialIndex};
//!
//! let mut index: SpatialIndex<f64> =
//!     SpatialIndex::create(dir, "places.index", 32, 8, 4096, 2)?;
//!
//! index.insert(&Mbr::new(&[0.0, 0.0, 10.0, 10.0]), &1u64.to_le_bytes())?;
//! let hits = index.overlap_search(&Mbr::new(&[5.0, 5.0, 20.0, 20.0]))?;
//! ```
//!
//! A handle owns its file descriptor and mapping; both are released on
//! drop. Handles are single-threaded and exclusive per the storage
//! model; nothing locks the file against a second process.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use eyre::{ensure, Result};

use crate::rtree::{Coordinate, Mbr, NodeSchema, RTree, RTreeView, SearchMode};
use crate::storage::{BlockType, IndexFileHeader, MmapStore, INDEX_HEADER_SIZE};

/// Returned by [`SpatialIndex::open`] when the caller-supplied schema
/// disagrees with the on-disk header. Downcastable from the
/// `eyre::Report` the call surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub file_dimensions: u64,
    pub file_key_size: u64,
    pub file_value_size: u64,
    pub file_block_size: u64,
    pub caller_dimensions: u64,
    pub caller_key_size: u64,
    pub caller_value_size: u64,
    pub caller_block_size: u64,
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "schema mismatch: file has dimensions={} key_size={} value_size={} block_size={}, \
             caller supplied dimensions={} key_size={} value_size={} block_size={}",
            self.file_dimensions,
            self.file_key_size,
            self.file_value_size,
            self.file_block_size,
            self.caller_dimensions,
            self.caller_key_size,
            self.caller_value_size,
            self.caller_block_size
        )
    }
}

impl std::error::Error for SchemaMismatch {}

/// Handle over one disk-resident spatial index.
#[derive(Debug)]
pub struct SpatialIndex<C: Coordinate> {
    store: MmapStore,
    schema: NodeSchema,
    _coord: PhantomData<C>,
}

impl<C: Coordinate> SpatialIndex<C> {
    /// Creates a new index file under `dir`. Fails if the file already
    /// exists.
    pub fn create(
        dir: &Path,
        name: &str,
        key_size: usize,
        value_size: usize,
        block_size: usize,
        dimensions: usize,
    ) -> Result<Self> {
        let schema = validate_schema::<C>(key_size, value_size, block_size, dimensions)?;

        let mut store = MmapStore::create(dir.join(name), block_size)?;

        let header = IndexFileHeader::new(
            dimensions as u64,
            key_size as u64,
            value_size as u64,
            block_size as u64,
        );
        store.block_mut(0)?[..INDEX_HEADER_SIZE]
            .copy_from_slice(zerocopy::IntoBytes::as_bytes(&header));

        Ok(Self {
            store,
            schema,
            _coord: PhantomData,
        })
    }

    /// Opens an existing index file and validates that its on-disk schema
    /// matches the caller-supplied parameters.
    pub fn open(
        dir: &Path,
        name: &str,
        key_size: usize,
        value_size: usize,
        block_size: usize,
        dimensions: usize,
    ) -> Result<Self> {
        let schema = validate_schema::<C>(key_size, value_size, block_size, dimensions)?;

        let store = MmapStore::open(dir.join(name), block_size)?;

        let header = IndexFileHeader::from_bytes(store.block(0)?)?;
        let matches = header.dimensions() == dimensions as u64
            && header.key_size() == key_size as u64
            && header.value_size() == value_size as u64
            && header.block_size() == block_size as u64;
        if !matches {
            return Err(SchemaMismatch {
                file_dimensions: header.dimensions(),
                file_key_size: header.key_size(),
                file_value_size: header.value_size(),
                file_block_size: header.block_size(),
                caller_dimensions: dimensions as u64,
                caller_key_size: key_size as u64,
                caller_value_size: value_size as u64,
                caller_block_size: block_size as u64,
            }
            .into());
        }

        Ok(Self {
            store,
            schema,
            _coord: PhantomData,
        })
    }

    /// Stores one (key, value) entry. The key dimension and the payload
    /// size must match the schema.
    pub fn insert(&mut self, key: &Mbr<C>, value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        ensure!(
            value.len() == self.schema.value_size,
            "payload is {} bytes, schema says {}",
            value.len(),
            self.schema.value_size
        );

        RTree::new(&mut self.store, self.schema).insert(key, value)
    }

    /// Removes the first entry whose key exactly equals `key`. Returns
    /// false when no such entry exists; the tree is left unchanged.
    pub fn delete(&mut self, key: &Mbr<C>) -> Result<bool> {
        self.check_key(key)?;
        RTree::new(&mut self.store, self.schema).delete(key)
    }

    /// All entries whose MBR intersects the query rectangle.
    pub fn overlap_search(&self, key: &Mbr<C>) -> Result<Vec<(Mbr<C>, Vec<u8>)>> {
        self.check_key(key)?;
        self.view().search(key, SearchMode::Overlap)
    }

    /// All entries whose MBR lies fully inside the query rectangle.
    pub fn containment_search(&self, key: &Mbr<C>) -> Result<Vec<(Mbr<C>, Vec<u8>)>> {
        self.check_key(key)?;
        self.view().search(key, SearchMode::Containment)
    }

    /// Every stored entry.
    pub fn all_entries(&self) -> Result<Vec<(Mbr<C>, Vec<u8>)>> {
        self.view().all_entries()
    }

    /// Per-level dump of the tree structure.
    pub fn format_tree(&self) -> Result<String> {
        self.view().format_tree()
    }

    /// Prints the per-level dump to stdout.
    pub fn print_tree(&self) -> Result<()> {
        print!("{}", self.format_tree()?);
        Ok(())
    }

    /// Number of tree levels; zero when empty.
    pub fn height(&self) -> Result<usize> {
        self.view().height()
    }

    /// Walks the tree checking structural invariants. Intended for tests
    /// and diagnostics.
    pub fn validate(&self) -> Result<()> {
        self.view().validate()
    }

    /// Flushes the mapping to disk.
    pub fn sync(&self) -> Result<()> {
        self.store.sync()
    }

    fn view(&self) -> RTreeView<'_, C> {
        RTreeView::new(&self.store, self.schema)
    }

    fn check_key(&self, key: &Mbr<C>) -> Result<()> {
        ensure!(
            key.dims() == self.schema.dimensions,
            "key has {} dimensions, schema says {}",
            key.dims(),
            self.schema.dimensions
        );
        Ok(())
    }
}

fn validate_schema<C: Coordinate>(
    key_size: usize,
    value_size: usize,
    block_size: usize,
    dimensions: usize,
) -> Result<NodeSchema> {
    ensure!(dimensions > 0, "dimensions must be positive");
    ensure!(
        key_size == 2 * dimensions * C::SIZE,
        "key size {} does not match {} dimensions of {}-byte coordinates (expected {})",
        key_size,
        dimensions,
        C::SIZE,
        2 * dimensions * C::SIZE
    );
    ensure!(value_size > 0, "value size must be positive");

    let schema = NodeSchema {
        dimensions,
        key_size,
        value_size,
        block_size,
    };

    // a node that cannot hold two entries can never be split
    ensure!(
        block_size > INDEX_HEADER_SIZE
            && schema.capacity(BlockType::Leaf) >= 2
            && schema.capacity(BlockType::Inner) >= 2,
        "block size {} too small for at least two entries per node",
        block_size
    );

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mbr(coords: &[f64]) -> Mbr<f64> {
        Mbr::new(coords)
    }

    fn create_index(dir: &Path) -> SpatialIndex<f64> {
        SpatialIndex::create(dir, "test.index", 32, 8, 4096, 2).unwrap()
    }

    #[test]
    fn create_then_open_with_matching_schema() {
        let dir = tempdir().unwrap();

        {
            let mut index = create_index(dir.path());
            index
                .insert(&mbr(&[0.0, 0.0, 1.0, 1.0]), &1u64.to_le_bytes())
                .unwrap();
        }

        let index: SpatialIndex<f64> =
            SpatialIndex::open(dir.path(), "test.index", 32, 8, 4096, 2).unwrap();
        assert_eq!(index.all_entries().unwrap().len(), 1);
    }

    #[test]
    fn create_fails_on_existing_file() {
        let dir = tempdir().unwrap();

        create_index(dir.path());
        let result: Result<SpatialIndex<f64>> =
            SpatialIndex::create(dir.path(), "test.index", 32, 8, 4096, 2);

        assert!(result.is_err());
    }

    #[test]
    fn open_rejects_mismatched_schema() {
        let dir = tempdir().unwrap();
        create_index(dir.path());

        // wrong dimensions (and key size to match them)
        let result: Result<SpatialIndex<f64>> =
            SpatialIndex::open(dir.path(), "test.index", 48, 8, 4096, 3);
        assert!(result.unwrap_err().downcast_ref::<SchemaMismatch>().is_some());

        // wrong value size
        let result: Result<SpatialIndex<f64>> =
            SpatialIndex::open(dir.path(), "test.index", 32, 16, 4096, 2);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("schema mismatch"));

        let mismatch = err.downcast_ref::<SchemaMismatch>().unwrap();
        assert_eq!(mismatch.file_value_size, 8);
        assert_eq!(mismatch.caller_value_size, 16);
        assert_eq!(mismatch.file_dimensions, 2);
    }

    #[test]
    fn open_rejects_mismatched_block_size() {
        let dir = tempdir().unwrap();
        create_index(dir.path());

        let result: Result<SpatialIndex<f64>> =
            SpatialIndex::open(dir.path(), "test.index", 32, 8, 8192, 2);
        assert!(result.is_err());
    }

    #[test]
    fn create_rejects_inconsistent_key_size() {
        let dir = tempdir().unwrap();

        let result: Result<SpatialIndex<f64>> =
            SpatialIndex::create(dir.path(), "test.index", 16, 8, 4096, 2);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("key size"));
    }

    #[test]
    fn insert_rejects_wrong_payload_size() {
        let dir = tempdir().unwrap();
        let mut index = create_index(dir.path());

        let result = index.insert(&mbr(&[0.0, 0.0, 1.0, 1.0]), &[0u8; 4]);

        assert!(result.is_err());
    }

    #[test]
    fn operations_reject_wrong_key_dimension() {
        let dir = tempdir().unwrap();
        let mut index = create_index(dir.path());

        let key_3d: Mbr<f64> = Mbr::new(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);

        assert!(index.insert(&key_3d, &1u64.to_le_bytes()).is_err());
        assert!(index.delete(&key_3d).is_err());
        assert!(index.overlap_search(&key_3d).is_err());
        assert!(index.containment_search(&key_3d).is_err());
    }

    #[test]
    fn empty_index_behaves() {
        let dir = tempdir().unwrap();
        let index = create_index(dir.path());

        assert!(index.all_entries().unwrap().is_empty());
        assert!(index
            .overlap_search(&mbr(&[0.0, 0.0, 100.0, 100.0]))
            .unwrap()
            .is_empty());
        assert_eq!(index.height().unwrap(), 0);
        assert_eq!(index.format_tree().unwrap(), "(empty tree)\n");
        index.validate().unwrap();
    }

    #[test]
    fn insert_search_delete_cycle() {
        let dir = tempdir().unwrap();
        let mut index = create_index(dir.path());

        index
            .insert(&mbr(&[0.0, 0.0, 10.0, 10.0]), &42u64.to_le_bytes())
            .unwrap();

        let hits = index.overlap_search(&mbr(&[0.0, 0.0, 10.0, 10.0])).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 42u64.to_le_bytes());

        assert!(index.delete(&mbr(&[0.0, 0.0, 10.0, 10.0])).unwrap());
        assert!(index.all_entries().unwrap().is_empty());
    }

    #[test]
    fn works_with_integer_coordinates() {
        let dir = tempdir().unwrap();
        let mut index: SpatialIndex<i64> =
            SpatialIndex::create(dir.path(), "int.index", 32, 8, 4096, 2).unwrap();

        index
            .insert(&Mbr::new(&[0, 0, 10, 10]), &1u64.to_le_bytes())
            .unwrap();
        index
            .insert(&Mbr::new(&[20, 20, 30, 30]), &2u64.to_le_bytes())
            .unwrap();

        let hits = index.overlap_search(&Mbr::new(&[5, 5, 25, 25])).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn works_with_f32_coordinates() {
        let dir = tempdir().unwrap();
        let mut index: SpatialIndex<f32> =
            SpatialIndex::create(dir.path(), "f32.index", 16, 8, 4096, 2).unwrap();

        index
            .insert(&Mbr::new(&[0.0f32, 0.0, 5.0, 5.0]), &9u64.to_le_bytes())
            .unwrap();

        let hits = index
            .overlap_search(&Mbr::new(&[1.0f32, 1.0, 2.0, 2.0]))
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
