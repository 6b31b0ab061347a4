//! Namespace-mapping engine for GitHub-as-a-filesystem.
//!
//! This crate turns a remote, paginated, query-only hierarchy (accounts,
//! their repositories, and the default-branch tree of each repository) into
//! the synchronous node model a filesystem adapter expects.
//!
//! # Components
//!
//! - [`resolver::Resolver`] - resolves `lookup`/`list`/`attributes`/`read`
//!   for any node, generic over the wired-in [`remote::RemoteSource`]
//! - [`pagination`] - drains offset- or cursor-paged collections
//! - [`disambiguate`] - classifies remote content payloads into entry kinds
//! - [`attributes`] - synthesizes POSIX-like attributes
//! - [`identity::IdentityAllocator`] - stable node identifiers
//!
//! Two remote backends are provided: [`remote::RestSource`] over any
//! [`remote::KeyedFetch`] and [`remote::GraphQlSource`] over any
//! [`remote::StructuredQuery`]. [`remote::HttpClient`] implements both
//! collaborator shapes against the real API.
//!
//! # Usage
//!
//! ```ignore
//! use ghfs_core::config::RemoteConfig;
//! use ghfs_core::remote::{HttpClient, RestSource, http::resolve_token};
//! use ghfs_core::Resolver;
//! use std::sync::Arc;
//!
//! let config = RemoteConfig::load(None)?;
//! let token = resolve_token(&config).await?;
//! let client = HttpClient::new(&config, &token)?;
//! let resolver = Resolver::new(Arc::new(RestSource::new(client)));
//! let root = resolver.root();
//! let alice = resolver.lookup(&root, "alice").await?;
//! ```

pub mod attributes;
pub mod config;
pub mod disambiguate;
pub mod error;
pub mod identity;
pub mod model;
pub mod pagination;
pub mod remote;
pub mod resolver;

pub use attributes::{AttrKind, AttributeRecord, READ_ONLY_PERM};
pub use error::{FsError, FsResult, RemoteError, RemoteResult};
pub use identity::{IdentityAllocator, NodeId, ROOT_ID};
pub use model::{Account, Dirent, EntryKind, FileContent, Node, NodeKind, Repository, TreeEntry};
pub use resolver::Resolver;
