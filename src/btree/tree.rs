//! The B-tree descent/insert/split algorithm.
//!
//! Grounded on `examples/original_source/src/btree.c`'s `btree_insert`,
//! `btree_insert_walk`, and `btree_lookup`: preemptive splitting on the
//! way down (never retry upward), lock-coupling (hold parent and child
//! together only across a possible split, release the parent otherwise),
//! and a root that may itself split into a fresh inner page.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use crate::codec::{blob, varint};
use crate::common::error::{Error, Result};
use crate::common::PageId;
use crate::pager::{Page, Pager};
use crate::traced;

use super::node::{self, FLAG_INDEX_UUID, FLAG_TABLE};

/// Which key family a [`BTree`] was built with: a varint-encoded `u64`
/// ("table" index) or a raw 16-byte UUID ("uuid" index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Table,
    Uuid,
}

impl KeyKind {
    fn type_flags(self) -> u16 {
        match self {
            KeyKind::Table => FLAG_TABLE,
            KeyKind::Uuid => FLAG_INDEX_UUID,
        }
    }
}

/// An ordered key/value map built on top of a [`Pager`].
///
/// Every operation fixes and unfixes pages through the pager it was built
/// on; it never touches page bytes except through the node-layout helpers
/// in [`super::node`].
pub struct BTree<'p> {
    pager: &'p Pager,
    root: AtomicU32,
    page_size: u16,
    type_flags: u16,
}

impl<'p> BTree<'p> {
    /// Allocate a fresh root leaf page and build a tree over it.
    pub fn create(pager: &'p Pager, kind: KeyKind) -> Result<Self> {
        let type_flags = kind.type_flags();
        let mut root = pager.next()?;
        node::init_leaf(root.data_mut(), pager.get_page_size(), type_flags);
        let root_id = root.id().0;
        drop(root);

        Ok(BTree {
            pager,
            root: AtomicU32::new(root_id),
            page_size: pager.get_page_size(),
            type_flags,
        })
    }

    /// Re-open a tree whose root page id is already known (e.g. recovered
    /// from an external catalog — the pager itself keeps no record of
    /// which pages are B-tree roots).
    pub fn open(pager: &'p Pager, root: u32, kind: KeyKind) -> Self {
        BTree {
            pager,
            root: AtomicU32::new(root),
            page_size: pager.get_page_size(),
            type_flags: kind.type_flags(),
        }
    }

    /// The current root page id.
    ///
    /// Stored as an `AtomicU32` rather than a plain field: the source this
    /// crate is grounded on updates `btree.root` with a plain, unsynchronized
    /// store when the root splits, which a concurrent reader could observe
    /// torn. Acquire/release on this field is the minimal fix the spec's
    /// own open question calls for — it does not by itself make concurrent
    /// root splits linearizable with concurrent descents past the root.
    pub fn root_id(&self) -> u32 {
        self.root.load(AtomicOrdering::Acquire)
    }

    /// Look up `key`, returning its exact value bytes, or `Error::NotFound`.
    ///
    /// Descends holding only one page latch at a time in shared mode:
    /// the parent is released as soon as the child is fixed.
    pub fn lookup(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut page = self.pager.fix(self.root_id(), false)?;

        loop {
            let flags = node::header_flags(page.data());
            if node::is_leaf(flags) {
                break;
            }
            let next = node::child_for_key(page.data(), flags, key);
            debug_assert_ne!(next, 0);
            // Old `page` drops here, releasing its latch, once `child`
            // has already been fixed.
            page = self.pager.fix(next, false)?;
        }

        let flags = node::header_flags(page.data());
        let (found, index) = node::page_find_pointer(page.data(), flags, key);
        if !found {
            return Err(traced!(Error::NotFound));
        }

        let payload = node::payload_at(page.data(), index);
        Ok(node::payload_value(flags, payload).to_vec())
    }

    /// Insert `key`/`value`, rejecting a duplicate key with
    /// `Error::KeyExists`.
    ///
    /// Splits preemptively on the way down: before descending into a
    /// child whose free space might not fit the pending payload, that
    /// child is split first and the parent updated, so the tree never
    /// needs to propagate a split back upward.
    ///
    /// A failed allocation partway through a split can leave the newly
    /// allocated sibling page unreferenced by any tree — a known, documented
    /// leak inherited from the source this is grounded on (see DESIGN.md);
    /// this crate does not attempt to journal or roll back a partial split.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut root = self.pager.fix(self.root_id(), true)?;

        let flags = node::header_flags(root.data());
        let header = node::NodeHeader::read(root.data());
        let needed = node::payload_put_len(flags, key, value);

        let mut current = if (header.free_space as usize) < needed {
            let mut split = self.pager.next()?;
            let split_id = split.id().0;
            let split_index = node::page_split(root.data_mut(), split.data_mut(), self.page_size, split_id);
            let split_key = node::payload_key_owned(flags, root.data(), split_index.saturating_sub(1));

            let root_id = root.id().0;
            let mut new_root = self.pager.next()?;
            node::init_inner_root(new_root.data_mut(), self.page_size, self.type_flags, root_id, &split_key, split_id);
            self.root.store(new_root.id().0, AtomicOrdering::Release);
            drop(new_root);

            if node::key_compare(flags, key, &split_key) == Ordering::Less {
                drop(split);
                root
            } else {
                drop(root);
                split
            }
        } else {
            root
        };

        let flags = node::header_flags(current.data());
        if node::is_leaf(flags) {
            node::page_insert_leaf(current.data_mut(), self.page_size, flags, key, value)
        } else {
            self.insert_walk(current, key, value)
        }
    }

    /// Descend one level past an inner `parent`, splitting the child it
    /// points to if necessary, then recurse or insert at a leaf.
    fn insert_walk(&self, mut parent: Page<'_>, key: &[u8], value: &[u8]) -> Result<()> {
        let parent_flags = node::header_flags(parent.data());
        debug_assert!(node::is_inner(parent_flags));

        let mut child = {
            let (found, index) = node::page_find_pointer(parent.data(), parent_flags, key);
            if found {
                return Err(traced!(Error::KeyExists));
            }

            let parent_header = node::NodeHeader::read(parent.data());
            let next_id = if index == parent_header.cell_count {
                parent_header.right
            } else {
                node::payload_child_id(parent.data(), index)
            };
            debug_assert_ne!(next_id, 0);

            let mut child = self.pager.fix(next_id, true)?;

            let child_flags = node::header_flags(child.data());
            let child_header = node::NodeHeader::read(child.data());
            let needed = node::payload_put_len(child_flags, key, value);

            if (child_header.free_space as usize) < needed {
                let mut split = self.pager.next()?;
                let split_id = split.id().0;
                let split_index = node::page_split(child.data_mut(), split.data_mut(), self.page_size, split_id);
                let split_key = node::payload_key_owned(child_flags, child.data(), split_index.saturating_sub(1));

                node::page_insert_inner(parent.data_mut(), self.page_size, index, &split_key, split.id().0);

                if node::key_compare(child_flags, key, &split_key) == Ordering::Less {
                    drop(split);
                } else {
                    drop(child);
                    child = split;
                }
            }

            child
        };

        drop(parent);

        let flags = node::header_flags(child.data());
        if node::is_leaf(flags) {
            node::page_insert_leaf(child.data_mut(), self.page_size, flags, key, value)
        } else {
            self.insert_walk(child, key, value)
        }
    }

    /// Insert under a varint-encoded `u64` key. Only meaningful on a tree
    /// created with [`KeyKind::Table`].
    pub fn table_insert(&self, id: u64, value: &[u8]) -> Result<()> {
        let mut key_buf = [0u8; 9];
        let key_len = varint::put(&mut key_buf, id);

        let mut value_buf = vec![0u8; blob::put_len(value)];
        blob::put(&mut value_buf, value);

        self.insert(&key_buf[..key_len], &value_buf)
    }

    /// Look up a varint-encoded `u64` key, decoding the stored blob.
    pub fn table_lookup(&self, id: u64) -> Result<Vec<u8>> {
        let mut key_buf = [0u8; 9];
        let key_len = varint::put(&mut key_buf, id);

        let encoded = self.lookup(&key_buf[..key_len])?;
        let (value, _) = blob::get(&encoded);
        Ok(value.to_vec())
    }

    /// Insert a 16-byte UUID key mapped to a page id. Only meaningful on a
    /// tree created with [`KeyKind::Uuid`].
    pub fn uuid_insert(&self, key: &[u8; 16], page_id: PageId) -> Result<()> {
        self.insert(key, &page_id.0.to_le_bytes())
    }

    /// Look up a 16-byte UUID key, returning the page id it maps to.
    pub fn uuid_lookup(&self, key: &[u8; 16]) -> Result<PageId> {
        let value = self.lookup(key)?;
        let bytes: [u8; 4] = value[..4].try_into().expect("uuid leaf value is always 4 bytes");
        Ok(PageId::new(u32::from_le_bytes(bytes)))
    }
}
