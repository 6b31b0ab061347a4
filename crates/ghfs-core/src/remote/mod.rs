//! Remote collaborators.
//!
//! Two layers:
//!
//! - Wire shapes: [`KeyedFetch`] (REST-style `GET path?params -> JSON`) and
//!   [`StructuredQuery`] (GraphQL-style `operation + variables -> data`).
//!   [`HttpClient`] implements both against the real API; tests substitute
//!   the stubs in [`crate::remote::testing`].
//! - Domain shape: [`RemoteSource`], the only thing the resolver depends on.
//!   [`RestSource`] adapts any `KeyedFetch`, [`GraphQlSource`] adapts any
//!   `StructuredQuery`.

pub mod graphql;
pub mod http;
pub mod rest;
pub mod testing;

pub use graphql::GraphQlSource;
pub use http::HttpClient;
pub use rest::RestSource;

use crate::disambiguate::EntryPayload;
use crate::error::RemoteResult;
use crate::model::{Account, Repository};
use crate::pagination::{Page, PageToken};
use bytes::Bytes;
use serde_json::Value;
use std::future::Future;

/// REST-style keyed fetch.
///
/// `resource_path` is relative to the API root with unescaped `/`-separated
/// segments (`users/alice`, `repos/alice/project/contents/src/lib.rs`); the
/// implementation escapes each segment. A missing resource must be reported
/// as [`RemoteError::NotFound`](crate::RemoteError::NotFound).
pub trait KeyedFetch: Send + Sync + 'static {
    /// Fetches one resource or one page of a collection.
    fn get(
        &self,
        resource_path: &str,
        params: &[(&str, String)],
    ) -> impl Future<Output = RemoteResult<Value>> + Send;
}

/// A named GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Operation name, as declared in `document`.
    pub name: &'static str,
    /// Full query document, fragments included.
    pub document: &'static str,
}

/// GraphQL-style structured query.
///
/// Returns the `data` member of the response. A missing entity reported in
/// the `errors` member must map to
/// [`RemoteError::NotFound`](crate::RemoteError::NotFound).
pub trait StructuredQuery: Send + Sync + 'static {
    /// Executes `operation` with `variables`.
    fn query(
        &self,
        operation: &Operation,
        variables: Value,
    ) -> impl Future<Output = RemoteResult<Value>> + Send;
}

/// One child reported by a tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    /// Child name.
    pub name: String,
    /// What the remote said about it.
    pub payload: EntryPayload,
}

/// Everything the resolver asks of the remote.
///
/// Paths inside a repository are relative to its root and resolved against
/// its default branch. `""` is the repository root.
pub trait RemoteSource: Send + Sync + 'static {
    /// Token of the first page of every collection this backend serves.
    fn first_page(&self) -> PageToken;

    /// The authenticated account.
    fn viewer(&self) -> impl Future<Output = RemoteResult<Account>> + Send;

    /// One page of the accounts the viewer follows.
    fn following_page(
        &self,
        token: PageToken,
    ) -> impl Future<Output = RemoteResult<Page<Account>>> + Send;

    /// The account called `login`.
    fn account(&self, login: &str) -> impl Future<Output = RemoteResult<Account>> + Send;

    /// One page of the repositories owned by `owner`.
    fn repositories_page(
        &self,
        owner: &Account,
        token: PageToken,
    ) -> impl Future<Output = RemoteResult<Page<Repository>>> + Send;

    /// The repository `owner/name`.
    fn repository(
        &self,
        owner: &Account,
        name: &str,
    ) -> impl Future<Output = RemoteResult<Repository>> + Send;

    /// What exists at `path`.
    fn entry(
        &self,
        repo: &Repository,
        path: &str,
    ) -> impl Future<Output = RemoteResult<EntryPayload>> + Send;

    /// One page of the children of the directory at `path`.
    fn tree_page(
        &self,
        repo: &Repository,
        path: &str,
        token: PageToken,
    ) -> impl Future<Output = RemoteResult<Page<ListedEntry>>> + Send;

    /// Full content of the file at `path`.
    fn blob(&self, repo: &Repository, path: &str) -> impl Future<Output = RemoteResult<Bytes>> + Send;

    /// Byte size of the file at `path`.
    fn blob_size(&self, repo: &Repository, path: &str)
    -> impl Future<Output = RemoteResult<u64>> + Send;
}

/// Joins a repository-relative directory path and a child name.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
