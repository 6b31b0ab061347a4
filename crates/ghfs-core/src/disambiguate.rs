//! Classification of remote content payloads.
//!
//! The two backends describe tree entries differently:
//!
//! - REST `contents` responses are either an array (the path is a directory)
//!   or an object whose `type` is `dir`, `file`, `symlink` or `submodule`.
//!   Submodules show up as `file` inside directory listings and are only
//!   recognizable by their `submodule_git_url`.
//! - GraphQL tree entries carry a git object `type` (`tree`, `blob`,
//!   `commit`) and a numeric git `mode`; symlinks are blobs with mode
//!   `0o120000`.
//!
//! [`classify`] folds both vocabularies into an [`EntryKind`]. A payload it
//! cannot place is an error, never a guess.

use crate::model::EntryKind;
use thiserror::Error;

/// Git mode of a symbolic link.
pub const GIT_MODE_SYMLINK: u32 = 0o120_000;

/// Git mode of a submodule (gitlink).
pub const GIT_MODE_GITLINK: u32 = 0o160_000;

/// Git mode of a tree.
pub const GIT_MODE_TREE: u32 = 0o040_000;

/// What a backend reported about one path, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPayload {
    /// The remote answered with a collection of children, which only
    /// directories do.
    Listing,
    /// The remote answered with a single typed object.
    Object {
        /// The `type` string as reported.
        type_name: String,
        /// Git file mode, when the backend exposes one.
        mode: Option<u32>,
        /// Byte size, when reported alongside the type.
        size: Option<u64>,
        /// True if the payload carries submodule metadata.
        submodule: bool,
    },
}

impl EntryPayload {
    /// A typed object with no mode, size or submodule information.
    pub fn typed(type_name: impl Into<String>) -> Self {
        EntryPayload::Object {
            type_name: type_name.into(),
            mode: None,
            size: None,
            submodule: false,
        }
    }

    /// Byte size carried by the payload, if any.
    pub fn size(&self) -> Option<u64> {
        match self {
            EntryPayload::Listing => None,
            EntryPayload::Object { size, .. } => *size,
        }
    }
}

/// A payload whose type is not one of the known vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized entry type {type_name:?} (mode {mode:?})")]
pub struct UnknownEntryType {
    /// The offending type string.
    pub type_name: String,
    /// The accompanying mode, if any.
    pub mode: Option<u32>,
}

/// Decides what kind of entry a payload denotes.
pub fn classify(payload: &EntryPayload) -> Result<EntryKind, UnknownEntryType> {
    let EntryPayload::Object {
        type_name,
        mode,
        submodule,
        ..
    } = payload
    else {
        return Ok(EntryKind::Directory);
    };

    if *submodule || *mode == Some(GIT_MODE_GITLINK) {
        return Ok(EntryKind::Unrepresentable);
    }

    match type_name.as_str() {
        "dir" | "tree" => Ok(EntryKind::Directory),
        "symlink" => Ok(EntryKind::Symlink),
        "file" | "blob" if *mode == Some(GIT_MODE_SYMLINK) => Ok(EntryKind::Symlink),
        "file" | "blob" => Ok(EntryKind::RegularFile),
        "submodule" | "commit" => Ok(EntryKind::Unrepresentable),
        _ => Err(UnknownEntryType {
            type_name: type_name.clone(),
            mode: *mode,
        }),
    }
}

/// Parses a git mode as GraphQL reports it (a decimal integer of the octal
/// bits, e.g. `40960` for `0o120000`).
pub fn parse_git_mode(raw: u64) -> Option<u32> {
    u32::try_from(raw).ok()
}

/// Parses a git mode as the REST trees endpoint reports it (octal text,
/// e.g. `"120000"`).
pub fn parse_octal_git_mode(raw: &str) -> Option<u32> {
    u32::from_str_radix(raw, 8).ok()
}
