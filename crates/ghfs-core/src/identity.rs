//! Stable node identifiers.
//!
//! Identifiers are 64-bit values laid out as a 4-bit namespace tag in the top
//! bits and a 60-bit payload below it:
//!
//! ```text
//!  63    60 59                                                   0
//! +--------+------------------------------------------------------+
//! |  tag   |  native remote id  /  truncated SHA-256 of the key   |
//! +--------+------------------------------------------------------+
//! ```
//!
//! Tag 0 is only ever used by [`ROOT_ID`], so no other identifier can be 0
//! (or 1, the FUSE root inode). Accounts and repositories get separate tags
//! because the remote numbers them independently.
//!
//! The allocator memoizes every key it has handed an identifier to for the
//! lifetime of the mount. The first sighting of an entity decides its
//! identifier: the native id when the query supplied one, a hash of the
//! qualified path otherwise. Later sightings return the memoized value even if
//! they carry different information, so a root listing and a direct lookup of
//! the same account agree.
//!
//! Hash-derived identifiers are checked against the set of identifiers already
//! handed out; a collision with a different key is re-derived with an
//! incrementing salt. Within one session two distinct keys therefore never
//! share an identifier. Across sessions nothing is promised.
//!
//! Nothing is ever evicted, `forget` included: the kernel may look an inode
//! up again after forgetting it and must get the same number back. Memory
//! therefore grows with every distinct entity the mount has seen. Each one
//! costs its qualified key twice (once per direction) plus two map slots,
//! roughly `2 * (path length + 40)` bytes, so browsing a repository with a
//! million files keeps on the order of 100 MB alive until unmount.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sha2::{Digest, Sha256};
use std::fmt;

/// Bit position of the namespace tag.
const TAG_SHIFT: u32 = 60;

/// Mask selecting the 60-bit payload.
const PAYLOAD_MASK: u64 = (1 << TAG_SHIFT) - 1;

/// Namespace tags for the top four bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
enum Namespace {
    Account = 1,
    Repository = 2,
    Synthesized = 3,
}

/// Identifier of a node in the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// The reserved identifier of the root node.
pub const ROOT_ID: NodeId = NodeId(0);

impl NodeId {
    /// Returns the raw 64-bit value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reconstructs an identifier from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns true for the root identifier.
    pub const fn is_root(self) -> bool {
        self.0 == ROOT_ID.0
    }

    fn tagged(namespace: Namespace, payload: u64) -> Self {
        Self(((namespace as u64) << TAG_SHIFT) | (payload & PAYLOAD_MASK))
    }

    /// Builds a native identifier, or `None` if the remote id does not fit
    /// in the payload.
    fn native(namespace: Namespace, remote_id: u64) -> Option<Self> {
        (remote_id <= PAYLOAD_MASK).then(|| Self::tagged(namespace, remote_id))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

type KeyHasher = fn(&str, u32) -> u64;

fn sha256_hasher(key: &str, salt: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(salt.to_le_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Hands out stable identifiers for remote entities.
///
/// Thread-safe; one allocator is shared by all concurrent operations of a
/// mount.
pub struct IdentityAllocator {
    /// Qualified key -> identifier.
    by_key: DashMap<String, NodeId>,
    /// Identifier -> qualified key that owns it.
    owners: DashMap<NodeId, String>,
    hasher: KeyHasher,
}

impl IdentityAllocator {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self::with_hasher(sha256_hasher)
    }

    fn with_hasher(hasher: KeyHasher) -> Self {
        Self {
            by_key: DashMap::new(),
            owners: DashMap::new(),
            hasher,
        }
    }

    /// Identifier of an account. Logins are case-insensitive remotely, so the
    /// key is case-folded.
    pub fn account(&self, login: &str, remote_id: Option<u64>) -> NodeId {
        let key = format!("account:{}", login.to_lowercase());
        let native = remote_id.and_then(|id| NodeId::native(Namespace::Account, id));
        self.assign(key, native)
    }

    /// Identifier of a repository, keyed by `owner/name` (case-folded).
    pub fn repository(&self, owner: &str, name: &str, remote_id: Option<u64>) -> NodeId {
        let key = format!("repo:{}/{}", owner.to_lowercase(), name.to_lowercase());
        let native = remote_id.and_then(|id| NodeId::native(Namespace::Repository, id));
        self.assign(key, native)
    }

    /// Identifier of a path inside a repository. Paths are case-sensitive.
    pub fn entry(&self, repository: NodeId, relative_path: &str) -> NodeId {
        let key = format!("entry:{:016x}:{relative_path}", repository.as_u64());
        self.assign(key, None)
    }

    /// Number of keys that have been assigned an identifier.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Returns true if nothing has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    fn assign(&self, key: String, native: Option<NodeId>) -> NodeId {
        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }

        match self.by_key.entry(key) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(slot) => {
                let id = match native {
                    Some(id) => {
                        self.owners.entry(id).or_insert_with(|| slot.key().clone());
                        id
                    }
                    None => self.derive(slot.key()),
                };
                slot.insert(id);
                id
            }
        }
    }

    fn derive(&self, key: &str) -> NodeId {
        let mut salt = 0u32;
        loop {
            let candidate = NodeId::tagged(Namespace::Synthesized, (self.hasher)(key, salt));
            match self.owners.entry(candidate) {
                Entry::Vacant(slot) => {
                    slot.insert(key.to_string());
                    return candidate;
                }
                Entry::Occupied(owner) if owner.get() == key => return candidate,
                Entry::Occupied(owner) => {
                    tracing::debug!(
                        key,
                        other = %owner.get(),
                        id = %candidate,
                        salt,
                        "identifier collision, re-deriving"
                    );
                    salt += 1;
                }
            }
        }
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
