//! InterchangeDB - a concurrent page cache kernel and the B-tree contract
//! that exercises it.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          B-tree (btree/)                        │
//! │        table (varint key) and uuid (16-byte key) variants       │
//! │   lock-coupled descent, preemptive split, page compaction       │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │ fix / unfix / next
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Pager (pager/)                          │
//! │   directory: latched hash map, page id → frame, overflow chains │
//! │   ring: fixed frame array, CLOCK second-chance eviction         │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            Latch (latch/), codecs (codec/), UUIDv7 (uuid/)       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pages are anonymous memory frames here; on-disk persistence, recovery,
//! and transactions are external collaborators this crate does not model.
//!
//! # Modules
//! - [`common`] — page ids, the crate's unified error type, the error
//!   trace, and sizing constants
//! - [`latch`] — the non-reentrant spin reader/writer lock everything else
//!   is built from
//! - [`codec`] — the varint and blob wire formats B-tree cells use
//! - [`pager`] — the concurrent, fixed-capacity buffer pool
//! - [`btree`] — the ordered key/value map built on top of the pager
//! - [`uuid`] — UUIDv7 generation, for the uuid-keyed B-tree variant
//!
//! # Quick start
//! ```
//! use interchangedb::btree::{BTree, KeyKind};
//! use interchangedb::pager::Pager;
//!
//! let pager = Pager::open(256, 64).unwrap();
//! let tree = BTree::create(&pager, KeyKind::Table).unwrap();
//!
//! tree.table_insert(7, b"hello world").unwrap();
//! assert_eq!(tree.table_lookup(7).unwrap(), b"hello world");
//! ```

pub mod btree;
pub mod codec;
pub mod common;
pub mod latch;
pub mod pager;
pub mod uuid;

pub use common::{Error, PageId, Result};
