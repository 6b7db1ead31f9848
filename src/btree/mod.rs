//! An ordered key/value map over fixed-size pager pages: the storage
//! layer that exercises `fix`/`unfix`, shared vs. exclusive access, and
//! page splits.
//!
//! - [`node`] — byte-level page layout (header, cells, payloads)
//! - [`tree`] — the descent/insert/split algorithm built on [`crate::pager`]

mod node;
mod tree;

pub use tree::{BTree, KeyKind};
