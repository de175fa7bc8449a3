//! Crio - a disk-oriented storage and indexing core in Rust
//!
//! This crate provides the buffer management and indexing layers of a
//! disk-oriented storage engine: a buffer pool backed by an LRU-K
//! replacement policy and an extendible hash directory, sitting on top of
//! a single-file disk manager, with a B+ tree index built on top.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): disk I/O and page organization
//!   - `DiskManager`: reads and writes fixed-size pages to/from a single file
//!   - `DiskScheduler`: background-threaded disk I/O scheduling
//!   - `HeaderPage`: the reserved page-0 metadata page
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: fetches pages from disk and caches them in memory
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `FrameHeader`: per-frame metadata and data storage
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards for thread-safe page access
//!
//! - **Hash** (`hash`): `ExtendibleHashTable`, the buffer pool's page table
//!
//! - **Index** (`index`): a disk-backed `BTreeIndex` over the buffer pool
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crio::buffer::BufferPoolManager;
//! use crio::storage::disk::DiskManager;
//! use crio::index::BTreeIndex;
//! use crio::common::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(100, 2, disk_manager));
//!
//! let index = BTreeIndex::new(bpm).unwrap();
//! index.insert(42, RecordId::new(PageId::new(7), SlotId::new(0))).unwrap();
//! assert!(index.get_value(42).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod hash;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{CrioError, PageId, RecordId, Result, SlotId};
