//! Attribute synthesis.
//!
//! The remote has no notion of modes, inode numbers or per-path timestamps,
//! so everything here is derived from what was captured when the node was
//! resolved. Everything under a repository shares the repository's push and
//! update times.

use crate::identity::NodeId;
use crate::model::{Node, NodeKind};
use std::time::SystemTime;

/// Owner read, nothing else. Applied to every node kind.
pub const READ_ONLY_PERM: u16 = 0o400;

/// Bits that must never appear in a synthesized mode.
pub const WRITE_OR_EXECUTE_BITS: u16 = 0o333;

/// How a node is presented to the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    /// A directory.
    Directory,
    /// A regular file.
    File,
}

/// Synthesized POSIX-like attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRecord {
    /// Stable node identifier.
    pub identifier: NodeId,
    /// Directory or file.
    pub kind: AttrKind,
    /// Permission bits (always [`READ_ONLY_PERM`]).
    pub permission_bits: u16,
    /// Byte size; 0 for directories.
    pub size_bytes: u64,
    /// Last modification time (repository push time).
    pub modified_time: SystemTime,
    /// Last status change time (repository update time).
    pub changed_time: SystemTime,
}

/// Builds the attribute record for `node`.
///
/// `size` is the byte length for file-kind nodes; it is ignored for
/// directory-kind nodes, which always report 0.
pub fn synthesize(node: &Node, size: u64) -> AttributeRecord {
    let kind = node.attr_kind();
    let (modified_time, changed_time) = match node.repository() {
        Some(repo) => (
            SystemTime::from(repo.pushed_at),
            SystemTime::from(repo.updated_at),
        ),
        None => (SystemTime::UNIX_EPOCH, SystemTime::UNIX_EPOCH),
    };

    AttributeRecord {
        identifier: node.id,
        kind,
        permission_bits: READ_ONLY_PERM,
        size_bytes: match kind {
            AttrKind::Directory => 0,
            AttrKind::File => size,
        },
        modified_time,
        changed_time,
    }
}

/// The size already captured on the node, if any. Directory-kind nodes
/// always have one (0).
pub fn captured_size(node: &Node) -> Option<u64> {
    match &node.kind {
        NodeKind::Entry(entry) if !entry.kind.is_container() => entry.size,
        _ => Some(0),
    }
}
