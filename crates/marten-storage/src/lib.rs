//! Storage engine for Marten.
//!
//! This crate provides:
//! - Disk manager for page-level I/O over named files
//! - Pager combining the disk manager with the buffer pool
//! - Heap pages and heap files for the base relation
//! - The clustered B+ tree index over an integer attribute

mod btree;
mod disk;
mod heap;
mod pager;

pub use btree::{
    split_inner, split_leaf, BTreeIndex, InnerNode, InnerSplit, LeafNode, LeafSplit, MetaNode,
    RangeOp, ScanBounds, DEFAULT_LEAF_CAPACITY, DEFAULT_NODE_CAPACITY, KEY_SENTINEL,
};
pub use disk::{DiskManager, DiskManagerConfig};
pub use heap::{HeapFile, HeapPage, HeapPageHeader, HeapScan, RecordSlot};
pub use pager::Pager;
