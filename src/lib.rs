//! # spindex - Disk-Resident Spatial Index
//!
//! spindex is an embedded R-tree mapping multi-dimensional minimum
//! bounding rectangles (MBRs) to opaque fixed-size payloads. The whole
//! index lives in a single file of fixed-size blocks accessed through a
//! memory mapping, so nodes are addressed by file offset and mutated in
//! place.
//!
//! ## Quick Start
//!
//! ```ignore
//! use spindex::{Mbr, SpatialIndex};
//!
//! let mut index: SpatialIndex<f64> =
//!     SpatialIndex::create(dir, "places.index", 32, 8, 4096, 2)?;
//!
//! index.insert(&Mbr::new(&[0.0, 0.0, 10.0, 10.0]), &1u64.to_le_bytes())?;
//!
//! // everything intersecting the query rectangle
//! let overlapping = index.overlap_search(&Mbr::new(&[5.0, 5.0, 20.0, 20.0]))?;
//! // everything fully inside the query rectangle
//! let contained = index.containment_search(&Mbr::new(&[0.0, 0.0, 50.0, 50.0]))?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     Public API (SpatialIndex)       │   create/open, schema checks
//! ├─────────────────────────────────────┤
//! │     R-Tree Engine (rtree::tree)     │   search, split, condense
//! ├─────────────────────────────────────┤
//! │  Node Views │ Key Algebra │ Split   │   packed slots, MBR math
//! ├─────────────────────────────────────┤
//! │   Block Store (storage::MmapStore)  │   mmap, append-only alloc
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! Block 0 holds a 40-byte schema header (dimensions, key size, value
//! size, block size, root offset); every further block is one tree node:
//! a 24-byte header plus packed (MBR, value) slots. All integers are
//! little-endian. Blocks are allocated append-only and never freed.
//!
//! ## Model
//!
//! Single-threaded and synchronous: one handle per file, operations
//! complete before returning, no internal locking. Deletion tightens
//! ancestor MBRs but performs no re-insertion or underflow merging.

pub mod index;
pub mod rtree;
pub mod storage;

pub use index::{SchemaMismatch, SpatialIndex};
pub use rtree::{Coordinate, Mbr, SearchMode};
