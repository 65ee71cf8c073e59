//! Slate - a single-file block storage engine in Rust
//!
//! This crate implements a fixed-size disk of numbered blocks, a bounded
//! in-memory buffer pool that caches those blocks, and the two access
//! methods built on top of them: linked chains of slotted record blocks
//! and B+ tree secondary indexes.
//!
//! # Architecture
//!
//! The system is organized into layers, leaves first:
//!
//! - **Storage** (`storage`): `FileBlockStore` reads and writes one
//!   fixed-size block by number against a single backing file.
//!
//! - **Buffer pool** (`buffer`): `BufferPool` maps blocks to a small fixed
//!   number of frames on demand, evicts the least recently used frame
//!   under pressure, tracks per-frame dirty bits, and owns block
//!   allocation through the global block-type map.
//!
//! - **Block codec** (`page`): `BlockHeader` plus the three payload views
//!   (`RecBlock`, `LeafBlock`, `InternalBlock`) interpret block bytes at
//!   fixed offsets. Views hold block numbers, never raw pointers, and
//!   re-pin through the pool on every access.
//!
//! - **Catalog** (`catalog`): `CatalogCache` is the open-relation table.
//!   It caches schema metadata from the two on-disk catalog relations and
//!   owns the persisted, resumable search cursors.
//!
//! - **Record access** (`record`): `BlockAccess` scans and extends a
//!   relation's record-block chain, and layers the catalog-maintenance
//!   operations (rename, whole-relation delete) on those primitives.
//!
//! - **Index** (`index`): `BPlusTree` maintains one B+ tree per indexed
//!   attribute, with resumable ordered/equality search, insertion with
//!   propagating splits, and recursive subtree destruction.
//!
//! # Example
//!
//! ```rust,no_run
//! use slate::common::{AttrType, AttrValue, CmpOp};
//! use slate::engine::Engine;
//!
//! let engine = Engine::open("test.db").unwrap();
//!
//! engine
//!     .create_relation("Employees", &[("Id", AttrType::Number), ("Name", AttrType::Text)])
//!     .unwrap();
//! let rel = engine.open_relation("Employees").unwrap();
//!
//! engine
//!     .insert(rel, &[AttrValue::Number(1.0), AttrValue::Text("Ada".into())])
//!     .unwrap();
//!
//! let record = engine
//!     .search(rel, "Id", &AttrValue::Number(1.0), CmpOp::Eq)
//!     .unwrap();
//! println!("{:?}", record);
//!
//! engine.close().unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod engine;
pub mod index;
pub mod page;
pub mod record;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{AttrType, AttrValue, CmpOp, RecId, Result, SlateError};
pub use engine::Engine;
