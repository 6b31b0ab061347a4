//! Values the resolver hands to the filesystem adapter.
//!
//! All of these are immutable snapshots of what the remote reported at
//! resolution time. A new lookup always builds a fresh value.

use crate::attributes::AttrKind;
use crate::identity::{NodeId, ROOT_ID};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A user or organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Login name; unique and case-insensitive remotely.
    pub login: String,
    /// Native numeric id, when the query that produced this value returned it.
    pub remote_id: Option<u64>,
}

impl Account {
    /// Creates an account value.
    pub fn new(login: impl Into<String>, remote_id: Option<u64>) -> Self {
        Self {
            login: login.into(),
            remote_id,
        }
    }
}

/// A repository and the metadata every path inside it shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Repository name (without owner).
    pub name: String,
    /// Owning account.
    pub owner: Account,
    /// Native numeric id, when available.
    pub remote_id: Option<u64>,
    /// Last push; used as mtime for everything in the repository.
    pub pushed_at: DateTime<Utc>,
    /// Last metadata update; used as ctime.
    pub updated_at: DateTime<Utc>,
    /// Branch all tree queries are resolved against.
    pub default_branch: String,
}

impl Repository {
    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner.login, self.name)
    }
}

/// What a path inside a repository turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A tree.
    Directory,
    /// A blob.
    RegularFile,
    /// A blob recorded with the symlink mode.
    Symlink,
    /// Something the filesystem does not model, such as a submodule.
    Unrepresentable,
}

impl EntryKind {
    /// Returns true if the entry can hold children.
    pub fn is_container(self) -> bool {
        matches!(self, EntryKind::Directory)
    }

    /// The attribute kind this entry is presented as.
    pub fn attr_kind(self) -> AttrKind {
        match self {
            EntryKind::Directory => AttrKind::Directory,
            EntryKind::RegularFile | EntryKind::Symlink | EntryKind::Unrepresentable => {
                AttrKind::File
            }
        }
    }
}

/// A directory or file inside a repository's default-branch tree.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Path from the repository root, without a leading slash. Empty for the
    /// repository root itself.
    pub relative_path: String,
    /// Owning repository, shared with every other entry under it.
    pub repository: Arc<Repository>,
    /// Resolved kind.
    pub kind: EntryKind,
    /// Byte size, if the lookup that produced this entry reported it.
    pub size: Option<u64>,
}

impl TreeEntry {
    /// The last path component, or the repository name for the root.
    pub fn name(&self) -> &str {
        match self.relative_path.rsplit_once('/') {
            Some((_, name)) => name,
            None if self.relative_path.is_empty() => &self.repository.name,
            None => &self.relative_path,
        }
    }
}

/// File content, fetched on demand and never kept on the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// Raw bytes.
    pub bytes: Bytes,
}

impl FileContent {
    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true for empty content.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What kind of position a node occupies in the namespace.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The mount root.
    Root,
    /// `/<login>`.
    Account(Account),
    /// `/<login>/<repo>`; behaves exactly like a directory at `""`.
    Repository(Arc<Repository>),
    /// Anything below a repository.
    Entry(TreeEntry),
}

/// One resolved position in the namespace.
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable identifier.
    pub id: NodeId,
    /// What the node is.
    pub kind: NodeKind,
}

impl Node {
    /// The root node.
    pub fn root() -> Self {
        Self {
            id: ROOT_ID,
            kind: NodeKind::Root,
        }
    }

    /// Returns true if `lookup` and `list` are defined on this node.
    pub fn is_container(&self) -> bool {
        match &self.kind {
            NodeKind::Root | NodeKind::Account(_) | NodeKind::Repository(_) => true,
            NodeKind::Entry(entry) => entry.kind.is_container(),
        }
    }

    /// The attribute kind this node is presented as.
    pub fn attr_kind(&self) -> AttrKind {
        match &self.kind {
            NodeKind::Root | NodeKind::Account(_) | NodeKind::Repository(_) => {
                AttrKind::Directory
            }
            NodeKind::Entry(entry) => entry.kind.attr_kind(),
        }
    }

    /// The repository this node lives in, if any.
    pub fn repository(&self) -> Option<&Arc<Repository>> {
        match &self.kind {
            NodeKind::Repository(repo) => Some(repo),
            NodeKind::Entry(entry) => Some(&entry.repository),
            NodeKind::Root | NodeKind::Account(_) => None,
        }
    }

    /// Human-readable absolute path, used in errors and logs.
    pub fn display_path(&self) -> String {
        match &self.kind {
            NodeKind::Root => "/".to_string(),
            NodeKind::Account(account) => format!("/{}", account.login),
            NodeKind::Repository(repo) => format!("/{}", repo.full_name()),
            NodeKind::Entry(entry) if entry.relative_path.is_empty() => {
                format!("/{}", entry.repository.full_name())
            }
            NodeKind::Entry(entry) => {
                format!("/{}/{}", entry.repository.full_name(), entry.relative_path)
            }
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    /// Child name.
    pub name: String,
    /// How the child is presented.
    pub kind: AttrKind,
    /// The child's identifier, equal to what `lookup` of the same name yields.
    pub id: NodeId,
}
