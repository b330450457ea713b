//! # R-Tree Module
//!
//! The spatial index core: MBR key algebra, node views over raw blocks,
//! the quadratic split heuristic, and the tree engine tying them
//! together.
//!
//! ## Module Organization
//!
//! - `key`: `Coordinate` trait and `Mbr` with area/union/overlap algebra
//! - `node`: `NodeRef`/`NodeMut` views interpreting one block as a node
//! - `split`: quadratic seed pick and group distribution
//! - `tree`: `RTree`/`RTreeView` search, insert, delete, traversals

pub mod key;
pub mod node;
pub mod split;
pub mod tree;

pub use key::{Coordinate, Mbr};
pub use node::{NodeMut, NodeRef, NodeSchema};
pub use split::{quadratic_partition, SplitEntry, SplitGroups};
pub use tree::{RTree, RTreeView, SearchMode};
