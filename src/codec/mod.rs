//! Wire-level codecs used by B-tree cells.
//!
//! - [`varint`] — 1–9 byte unsigned integer encoding
//! - [`blob`] — length-prefixed byte strings built on [`varint`]

pub mod blob;
pub mod varint;
