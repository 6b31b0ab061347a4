//! Inode management for the FUSE filesystem.
//!
//! Inode numbers are not allocated here: they are the resolver's node
//! identifiers, with the root's identifier 0 moved to the FUSE root inode 1.
//! No other identifier can be 0 or 1, so the mapping is a bijection and the
//! same remote entity always comes back under the same inode.
//!
//! The table only remembers which node snapshot each live inode refers to,
//! counted the way the kernel counts lookups, so `getattr`/`readdir` on an
//! inode can reach its node again.

use dashmap::DashMap;
use ghfs_core::{Node, NodeId, ROOT_ID};
use std::sync::atomic::{AtomicU64, Ordering};

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// Inode number of a node identifier.
pub fn ino_of(id: NodeId) -> u64 {
    if id.is_root() { ROOT_INODE } else { id.as_u64() }
}

/// Node identifier of an inode number.
pub fn id_of(ino: u64) -> NodeId {
    if ino == ROOT_INODE {
        ROOT_ID
    } else {
        NodeId::from_raw(ino)
    }
}

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    /// Latest snapshot of the node.
    pub node: Node,
    /// Lookup count for proper `forget()` handling.
    nlookup: AtomicU64,
}

impl InodeEntry {
    fn new(node: Node) -> Self {
        Self {
            node,
            nlookup: AtomicU64::new(1),
        }
    }

    /// Increments the lookup count and returns the new value.
    pub fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrements the lookup count by the given amount and returns the new value.
    /// Returns `None` if the count would go negative.
    pub fn dec_nlookup(&self, count: u64) -> Option<u64> {
        let old = self.nlookup.fetch_sub(count, Ordering::SeqCst);
        if old < count {
            self.nlookup.fetch_add(count, Ordering::SeqCst);
            None
        } else {
            Some(old - count)
        }
    }

    /// Returns the current lookup count.
    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::SeqCst)
    }
}

/// Thread-safe table of the inodes the kernel currently knows about.
pub struct InodeTable {
    entries: DashMap<u64, InodeEntry>,
}

impl InodeTable {
    /// Creates a table holding only the root.
    pub fn new() -> Self {
        let entries = DashMap::new();
        entries.insert(ROOT_INODE, InodeEntry::new(Node::root()));
        Self { entries }
    }

    /// Records a lookup of `node` and returns its inode.
    ///
    /// A known inode gets its count bumped and its snapshot replaced with the
    /// fresher one.
    pub fn remember(&self, node: Node) -> u64 {
        let ino = ino_of(node.id);
        self.entries
            .entry(ino)
            .and_modify(|entry| {
                entry.inc_nlookup();
                entry.node = node.clone();
            })
            .or_insert_with(|| InodeEntry::new(node));
        ino
    }

    /// The node an inode refers to.
    pub fn node(&self, ino: u64) -> Option<Node> {
        self.entries.get(&ino).map(|entry| entry.node.clone())
    }

    /// Looks up an entry by inode number.
    pub fn get(&self, ino: u64) -> Option<dashmap::mapref::one::Ref<'_, u64, InodeEntry>> {
        self.entries.get(&ino)
    }

    /// Decrements the lookup count for an inode.
    /// Returns `true` if the inode was evicted.
    pub fn forget(&self, ino: u64, nlookup: u64) -> bool {
        if ino == ROOT_INODE {
            return false;
        }
        self.entries
            .remove_if(&ino, |_, entry| entry.dec_nlookup(nlookup) == Some(0))
            .is_some()
    }

    /// Returns the number of inodes currently in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table only contains the root inode.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
