//! GraphQL backend.
//!
//! Collections use cursor pagination (`first`/`after` plus `pageInfo`). Tree
//! objects are addressed with git revision expressions (`<branch>:<path>`).
//! Tree entries carry their git object type and mode but no size, so file
//! sizes are fetched separately when asked for.

use super::{ListedEntry, Operation, RemoteSource, StructuredQuery};
use crate::disambiguate::{EntryPayload, parse_git_mode};
use crate::error::{RemoteError, RemoteResult};
use crate::model::{Account, Repository};
use crate::pagination::{DEFAULT_PER_PAGE, Page, PageToken};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

macro_rules! repository_fields {
    () => {
        "fragment RepositoryFields on Repository {
  name
  databaseId
  pushedAt
  updatedAt
  owner { login ...OwnerId }
  defaultBranchRef { name }
}
fragment OwnerId on RepositoryOwner {
  ... on User { databaseId }
  ... on Organization { databaseId }
}"
    };
}

pub const VIEWER: Operation = Operation {
    name: "Viewer",
    document: "query Viewer { viewer { login databaseId } }",
};

pub const FOLLOWING: Operation = Operation {
    name: "Following",
    document: "query Following($first: Int!, $after: String) {
  viewer {
    following(first: $first, after: $after) {
      nodes { login databaseId }
      pageInfo { hasNextPage endCursor }
    }
  }
}",
};

pub const ACCOUNT: Operation = Operation {
    name: "Account",
    document: "query Account($login: String!) {
  repositoryOwner(login: $login) {
    login
    ... on User { databaseId }
    ... on Organization { databaseId }
  }
}",
};

pub const REPOSITORIES: Operation = Operation {
    name: "Repositories",
    document: concat!(
        "query Repositories($login: String!, $first: Int!, $after: String) {
  repositoryOwner(login: $login) {
    repositories(first: $first, after: $after, ownerAffiliations: OWNER, orderBy: {field: NAME, direction: ASC}) {
      nodes { ...RepositoryFields }
      pageInfo { hasNextPage endCursor }
    }
  }
}
",
        repository_fields!()
    ),
};

pub const REPOSITORY: Operation = Operation {
    name: "Repository",
    document: concat!(
        "query Repository($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) { ...RepositoryFields }
}
",
        repository_fields!()
    ),
};

pub const TREE: Operation = Operation {
    name: "Tree",
    document: "query Tree($owner: String!, $name: String!, $expression: String!) {
  repository(owner: $owner, name: $name) {
    object(expression: $expression) {
      __typename
      ... on Tree { entries { name type mode } }
    }
  }
}",
};

pub const BLOB: Operation = Operation {
    name: "Blob",
    document: "query Blob($owner: String!, $name: String!, $expression: String!) {
  repository(owner: $owner, name: $name) {
    object(expression: $expression) {
      __typename
      ... on Blob { byteSize isBinary isTruncated text }
    }
  }
}",
};

pub const BLOB_SIZE: Operation = Operation {
    name: "BlobSize",
    document: "query BlobSize($owner: String!, $name: String!, $expression: String!) {
  repository(owner: $owner, name: $name) {
    object(expression: $expression) {
      __typename
      ... on Blob { byteSize }
    }
  }
}",
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerJson {
    login: String,
    database_id: Option<u64>,
}

impl From<OwnerJson> for Account {
    fn from(owner: OwnerJson) -> Self {
        Account::new(owner.login, owner.database_id)
    }
}

#[derive(Debug, Deserialize)]
struct BranchRefJson {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryJson {
    name: String,
    database_id: Option<u64>,
    pushed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    owner: OwnerJson,
    default_branch_ref: Option<BranchRefJson>,
}

impl From<RepositoryJson> for Repository {
    fn from(repo: RepositoryJson) -> Self {
        Repository {
            name: repo.name,
            owner: repo.owner.into(),
            remote_id: repo.database_id,
            pushed_at: repo.pushed_at.unwrap_or(repo.updated_at),
            updated_at: repo.updated_at,
            default_branch: repo
                .default_branch_ref
                .map_or_else(|| "HEAD".to_string(), |b| b.name),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfoJson {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionJson<T> {
    nodes: Vec<T>,
    page_info: PageInfoJson,
}

impl<T> ConnectionJson<T> {
    fn into_page(self) -> Page<T> {
        Page::cursor(self.nodes, self.page_info.has_next_page, self.page_info.end_cursor)
    }
}

#[derive(Debug, Deserialize)]
struct TreeEntryJson {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    mode: u64,
}

impl TreeEntryJson {
    fn payload(&self) -> EntryPayload {
        EntryPayload::Object {
            type_name: self.kind.clone(),
            mode: parse_git_mode(self.mode),
            size: None,
            submodule: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum GitObjectJson {
    Tree {
        entries: Option<Vec<TreeEntryJson>>,
    },
    #[serde(rename_all = "camelCase")]
    Blob {
        byte_size: u64,
        #[serde(default)]
        is_binary: Option<bool>,
        #[serde(default)]
        is_truncated: Option<bool>,
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// [`RemoteSource`] over a GraphQL-style [`StructuredQuery`].
pub struct GraphQlSource<Q> {
    query: Q,
    per_page: u32,
}

impl<Q: StructuredQuery> GraphQlSource<Q> {
    /// Wraps `query` with the default page size.
    pub fn new(query: Q) -> Self {
        Self {
            query,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    /// Overrides the page size, clamped to what the API will serve. A larger
    /// request would come back capped and read as the final short page.
    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, DEFAULT_PER_PAGE);
        self
    }

    /// The underlying query executor.
    pub fn executor(&self) -> &Q {
        &self.query
    }

    /// Runs `operation` and decodes the member at `pointer` of its data. A
    /// null along the way means the entity does not exist.
    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &Operation,
        variables: Value,
        pointer: &str,
    ) -> RemoteResult<T> {
        let data = self.query.query(operation, variables).await?;
        let member = data.pointer(pointer).ok_or_else(|| {
            RemoteError::Malformed(format!("{} response has no {pointer}", operation.name))
        })?;
        if member.is_null() {
            return Err(RemoteError::NotFound);
        }
        Ok(T::deserialize(member)?)
    }

    fn cursor(token: PageToken) -> RemoteResult<Option<String>> {
        match token {
            PageToken::Cursor(after) => Ok(after),
            PageToken::Offset(_) => Err(RemoteError::Malformed(
                "offset token passed to a cursor-paged backend".to_string(),
            )),
        }
    }

    async fn object(
        &self,
        operation: &Operation,
        repo: &Repository,
        path: &str,
    ) -> RemoteResult<GitObjectJson> {
        let variables = json!({
            "owner": repo.owner.login,
            "name": repo.name,
            "expression": format!("{}:{path}", repo.default_branch),
        });
        self.fetch(operation, variables, "/repository/object").await
    }

    async fn tree_entries(&self, repo: &Repository, path: &str) -> RemoteResult<Vec<TreeEntryJson>> {
        match self.object(&TREE, repo, path).await? {
            GitObjectJson::Tree { entries } => Ok(entries.unwrap_or_default()),
            _ => Err(RemoteError::Malformed(format!(
                "{}:{path} is not a tree",
                repo.full_name()
            ))),
        }
    }
}

impl<Q: StructuredQuery> RemoteSource for GraphQlSource<Q> {
    fn first_page(&self) -> PageToken {
        PageToken::FIRST_CURSOR
    }

    async fn viewer(&self) -> RemoteResult<Account> {
        let owner: OwnerJson = self.fetch(&VIEWER, json!({}), "/viewer").await?;
        Ok(owner.into())
    }

    async fn following_page(&self, token: PageToken) -> RemoteResult<Page<Account>> {
        let after = Self::cursor(token)?;
        let variables = json!({ "first": self.per_page, "after": after });
        let connection: ConnectionJson<OwnerJson> = self
            .fetch(&FOLLOWING, variables, "/viewer/following")
            .await?;
        debug!(count = connection.nodes.len(), "fetched following page");
        Ok(connection.into_page().map(Account::from))
    }

    async fn account(&self, login: &str) -> RemoteResult<Account> {
        let owner: OwnerJson = self
            .fetch(&ACCOUNT, json!({ "login": login }), "/repositoryOwner")
            .await?;
        Ok(owner.into())
    }

    async fn repositories_page(
        &self,
        owner: &Account,
        token: PageToken,
    ) -> RemoteResult<Page<Repository>> {
        let after = Self::cursor(token)?;
        let variables = json!({ "login": owner.login, "first": self.per_page, "after": after });
        let data = self.query.query(&REPOSITORIES, variables).await?;
        let repositories = data
            .pointer("/repositoryOwner/repositories")
            .filter(|v| !v.is_null())
            .ok_or(RemoteError::NotFound)?;
        let connection = ConnectionJson::<RepositoryJson>::deserialize(repositories)?;
        debug!(owner = %owner.login, count = connection.nodes.len(), "fetched repositories page");
        Ok(connection.into_page().map(Repository::from))
    }

    async fn repository(&self, owner: &Account, name: &str) -> RemoteResult<Repository> {
        let variables = json!({ "owner": owner.login, "name": name });
        let repo: RepositoryJson = self.fetch(&REPOSITORY, variables, "/repository").await?;
        Ok(repo.into())
    }

    async fn entry(&self, repo: &Repository, path: &str) -> RemoteResult<EntryPayload> {
        let Some((parent, name)) = split_parent(path) else {
            // The repository root is always a tree.
            return Ok(EntryPayload::Listing);
        };
        let entries = self.tree_entries(repo, parent).await?;
        entries
            .iter()
            .find(|e| e.name == name)
            .map(TreeEntryJson::payload)
            .ok_or(RemoteError::NotFound)
    }

    async fn tree_page(
        &self,
        repo: &Repository,
        path: &str,
        token: PageToken,
    ) -> RemoteResult<Page<ListedEntry>> {
        // Tree entries are returned whole; there is no cursor to follow.
        Self::cursor(token)?;
        let entries = self.tree_entries(repo, path).await?;
        Ok(Page::last(
            entries
                .into_iter()
                .map(|e| ListedEntry {
                    payload: e.payload(),
                    name: e.name,
                })
                .collect(),
        ))
    }

    async fn blob(&self, repo: &Repository, path: &str) -> RemoteResult<Bytes> {
        match self.object(&BLOB, repo, path).await? {
            GitObjectJson::Blob {
                is_binary: Some(true),
                ..
            } => Err(RemoteError::BinaryContent),
            GitObjectJson::Blob {
                is_truncated: Some(true),
                byte_size,
                ..
            } => Err(RemoteError::Malformed(format!(
                "text of {path} ({byte_size} bytes) was truncated"
            ))),
            GitObjectJson::Blob {
                text: Some(text), ..
            } => Ok(Bytes::from(text)),
            GitObjectJson::Blob { byte_size: 0, .. } => Ok(Bytes::new()),
            GitObjectJson::Blob { .. } => Err(RemoteError::BinaryContent),
            _ => Err(RemoteError::Malformed(format!(
                "{}:{path} is not a blob",
                repo.full_name()
            ))),
        }
    }

    async fn blob_size(&self, repo: &Repository, path: &str) -> RemoteResult<u64> {
        match self.object(&BLOB_SIZE, repo, path).await? {
            GitObjectJson::Blob { byte_size, .. } => Ok(byte_size),
            _ => Err(RemoteError::Malformed(format!(
                "{}:{path} is not a blob",
                repo.full_name()
            ))),
        }
    }
}

/// Splits `a/b/c` into `("a/b", "c")` and `c` into `("", "c")`. `None` for
/// the repository root.
fn split_parent(path: &str) -> Option<(&str, &str)> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').unwrap_or(("", path)))
}
