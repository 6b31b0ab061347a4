//! REST backend.
//!
//! Collections use offset pagination (`per_page`/`page`). Repository trees
//! come from the `contents` endpoint, which answers a directory path with an
//! array and anything else with a typed object. That endpoint is not
//! paginated and stops at [`CONTENTS_LISTING_CAP`] entries; a directory that
//! reaches the cap is listed again through the git trees endpoint.

use super::{KeyedFetch, ListedEntry, RemoteSource};
use crate::disambiguate::{EntryPayload, parse_octal_git_mode};
use crate::error::{RemoteError, RemoteResult};
use crate::model::{Account, Repository};
use crate::pagination::{DEFAULT_PER_PAGE, Page, PageToken};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Most entries the contents endpoint returns for one directory.
pub const CONTENTS_LISTING_CAP: usize = 1000;

#[derive(Debug, Deserialize)]
struct UserJson {
    login: String,
    id: Option<u64>,
}

impl From<UserJson> for Account {
    fn from(user: UserJson) -> Self {
        Account::new(user.login, user.id)
    }
}

#[derive(Debug, Deserialize)]
struct RepoJson {
    name: String,
    id: Option<u64>,
    owner: UserJson,
    pushed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    default_branch: Option<String>,
}

impl From<RepoJson> for Repository {
    fn from(repo: RepoJson) -> Self {
        Repository {
            name: repo.name,
            owner: repo.owner.into(),
            remote_id: repo.id,
            pushed_at: repo.pushed_at.unwrap_or(repo.updated_at),
            updated_at: repo.updated_at,
            default_branch: repo.default_branch.unwrap_or_else(|| "HEAD".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentJson {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    size: Option<u64>,
    sha: Option<String>,
    content: Option<String>,
    encoding: Option<String>,
    submodule_git_url: Option<String>,
}

impl ContentJson {
    fn payload(&self) -> EntryPayload {
        EntryPayload::Object {
            type_name: self.kind.clone(),
            mode: None,
            size: self.size,
            submodule: self.submodule_git_url.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitTreeJson {
    tree: Vec<GitTreeEntryJson>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GitTreeEntryJson {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
}

impl GitTreeEntryJson {
    fn payload(&self) -> EntryPayload {
        EntryPayload::Object {
            type_name: self.kind.clone(),
            mode: parse_octal_git_mode(&self.mode),
            size: self.size,
            submodule: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitBlobJson {
    content: String,
    encoding: String,
}

/// Decodes the base64 bodies the API wraps at 60 columns.
fn decode_base64(encoded: &str) -> RemoteResult<Bytes> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map(Bytes::from)
        .map_err(|e| RemoteError::Malformed(format!("invalid base64 content: {e}")))
}

/// [`RemoteSource`] over a REST-style [`KeyedFetch`].
pub struct RestSource<F> {
    fetch: F,
    per_page: u32,
}

impl<F: KeyedFetch> RestSource<F> {
    /// Wraps `fetch` with the default page size.
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
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

    /// The underlying fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetch
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> RemoteResult<T> {
        let value = self.fetch.get(path, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    fn page_number(token: &PageToken) -> RemoteResult<u32> {
        match token {
            PageToken::Offset(page) => Ok(*page),
            PageToken::Cursor(_) => Err(RemoteError::Malformed(
                "cursor token passed to an offset-paged backend".to_string(),
            )),
        }
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &PageToken,
    ) -> RemoteResult<Page<T>> {
        let page = Self::page_number(token)?;
        let params = [
            ("per_page", self.per_page.to_string()),
            ("page", page.to_string()),
        ];
        let items: Vec<T> = self.get_json(path, &params).await?;
        debug!(path, page, count = items.len(), "fetched page");
        Ok(Page::offset(items, page, self.per_page))
    }

    fn contents_path(repo: &Repository, path: &str) -> String {
        let base = format!("repos/{}/{}/contents", repo.owner.login, repo.name);
        if path.is_empty() {
            base
        } else {
            format!("{base}/{path}")
        }
    }

    async fn contents(&self, repo: &Repository, path: &str) -> RemoteResult<Value> {
        let params = [("ref", repo.default_branch.clone())];
        self.fetch
            .get(&Self::contents_path(repo, path), &params)
            .await
    }

    /// Lists a directory through the git trees endpoint, which is not bound
    /// by [`CONTENTS_LISTING_CAP`].
    async fn git_tree(&self, repo: &Repository, path: &str) -> RemoteResult<Vec<ListedEntry>> {
        let tree_path = format!(
            "repos/{}/{}/git/trees/{}:{path}",
            repo.owner.login, repo.name, repo.default_branch
        );
        let tree: GitTreeJson = self.get_json(&tree_path, &[]).await?;
        if tree.truncated {
            warn!(
                repo = %repo.full_name(),
                path,
                count = tree.tree.len(),
                "tree listing truncated by the remote"
            );
        }
        Ok(tree
            .tree
            .into_iter()
            .map(|entry| ListedEntry {
                payload: entry.payload(),
                name: entry.path,
            })
            .collect())
    }

    async fn file_contents(&self, repo: &Repository, path: &str) -> RemoteResult<ContentJson> {
        let value = self.contents(repo, path).await?;
        if value.is_array() {
            return Err(RemoteError::Malformed(format!(
                "expected a file at {path}, found a directory listing"
            )));
        }
        Ok(serde_json::from_value(value)?)
    }
}

impl<F: KeyedFetch> RemoteSource for RestSource<F> {
    fn first_page(&self) -> PageToken {
        PageToken::FIRST_OFFSET
    }

    async fn viewer(&self) -> RemoteResult<Account> {
        let user: UserJson = self.get_json("user", &[]).await?;
        Ok(user.into())
    }

    async fn following_page(&self, token: PageToken) -> RemoteResult<Page<Account>> {
        let page: Page<UserJson> = self.get_page("user/following", &token).await?;
        Ok(page.map(Account::from))
    }

    async fn account(&self, login: &str) -> RemoteResult<Account> {
        let user: UserJson = self.get_json(&format!("users/{login}"), &[]).await?;
        Ok(user.into())
    }

    async fn repositories_page(
        &self,
        owner: &Account,
        token: PageToken,
    ) -> RemoteResult<Page<Repository>> {
        let path = format!("users/{}/repos", owner.login);
        let page: Page<RepoJson> = self.get_page(&path, &token).await?;
        Ok(page.map(Repository::from))
    }

    async fn repository(&self, owner: &Account, name: &str) -> RemoteResult<Repository> {
        let repo: RepoJson = self
            .get_json(&format!("repos/{}/{name}", owner.login), &[])
            .await?;
        Ok(repo.into())
    }

    async fn entry(&self, repo: &Repository, path: &str) -> RemoteResult<EntryPayload> {
        let value = self.contents(repo, path).await?;
        if value.is_array() {
            return Ok(EntryPayload::Listing);
        }
        let content: ContentJson = serde_json::from_value(value)?;
        Ok(content.payload())
    }

    async fn tree_page(
        &self,
        repo: &Repository,
        path: &str,
        token: PageToken,
    ) -> RemoteResult<Page<ListedEntry>> {
        Self::page_number(&token)?;
        let value = self.contents(repo, path).await?;
        if !value.is_array() {
            return Err(RemoteError::Malformed(format!(
                "expected a directory listing at {path:?}"
            )));
        }
        let contents: Vec<ContentJson> = serde_json::from_value(value)?;
        if contents.len() >= CONTENTS_LISTING_CAP {
            debug!(repo = %repo.full_name(), path, "contents listing capped, reading git tree");
            return self.git_tree(repo, path).await.map(Page::last);
        }
        let entries = contents
            .into_iter()
            .map(|c| ListedEntry {
                payload: c.payload(),
                name: c.name,
            })
            .collect();
        Ok(Page::last(entries))
    }

    async fn blob(&self, repo: &Repository, path: &str) -> RemoteResult<Bytes> {
        let file = self.file_contents(repo, path).await?;

        match (file.encoding.as_deref(), file.content.as_deref()) {
            (Some("base64"), Some(content)) if !content.is_empty() => decode_base64(content),
            _ if file.size == Some(0) => Ok(Bytes::new()),
            _ => {
                // Too large for the contents endpoint; go through the git blob.
                let sha = file.sha.ok_or_else(|| {
                    RemoteError::Malformed(format!("no content and no sha for {path}"))
                })?;
                debug!(path, sha = %sha, size = ?file.size, "fetching large file via git blob");
                let blob_path = format!("repos/{}/{}/git/blobs/{sha}", repo.owner.login, repo.name);
                let blob: GitBlobJson = self.get_json(&blob_path, &[]).await?;
                if blob.encoding != "base64" {
                    return Err(RemoteError::Malformed(format!(
                        "unexpected blob encoding {:?}",
                        blob.encoding
                    )));
                }
                decode_base64(&blob.content)
            }
        }
    }

    async fn blob_size(&self, repo: &Repository, path: &str) -> RemoteResult<u64> {
        let file = self.file_contents(repo, path).await?;
        file.size
            .ok_or_else(|| RemoteError::Malformed(format!("no size reported for {path}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disambiguate::classify;
    use crate::model::EntryKind;
    use crate::remote::testing::StubFetch;
    use serde_json::json;

    fn repo() -> Repository {
        Repository {
            name: "repo1".to_string(),
            owner: Account::new("bob", Some(2)),
            remote_id: Some(10),
            pushed_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            default_branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn test_repository_json_mapping() {
        let stub = StubFetch::new().with(
            "repos/bob/repo1",
            json!({
                "name": "repo1",
                "id": 10,
                "owner": {"login": "bob", "id": 2},
                "pushed_at": null,
                "updated_at": "2024-03-02T12:00:00Z",
                "default_branch": "trunk"
            }),
        );
        let source = RestSource::new(stub);
        let repo = source
            .repository(&Account::new("bob", None), "repo1")
            .await
            .unwrap();

        assert_eq!(repo.remote_id, Some(10));
        assert_eq!(repo.owner, Account::new("bob", Some(2)));
        assert_eq!(repo.default_branch, "trunk");
        // No push yet: falls back to the update time.
        assert_eq!(repo.pushed_at, repo.updated_at);
    }

    #[tokio::test]
    async fn test_page_params() {
        let stub = StubFetch::new().with_page(
            "user/following",
            2,
            json!([{"login": "carol", "id": 3}]),
        );
        let source = RestSource::new(stub).with_per_page(1);
        let page = source.following_page(PageToken::Offset(2)).await.unwrap();

        assert_eq!(page.items, vec![Account::new("carol", Some(3))]);
        assert_eq!(page.next, Some(PageToken::Offset(3)));
        assert_eq!(
            source.fetcher().requests(),
            vec!["user/following?per_page=1&page=2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_oversized_page_request_is_clamped() {
        let stub = StubFetch::new().with_page("user/following", 1, json!([]));
        let source = RestSource::new(stub).with_per_page(150);
        source.following_page(PageToken::FIRST_OFFSET).await.unwrap();

        assert_eq!(
            source.fetcher().requests(),
            vec!["user/following?per_page=100&page=1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cursor_token_rejected() {
        let source = RestSource::new(StubFetch::new());
        let err = source
            .following_page(PageToken::FIRST_CURSOR)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_entry_listing_vs_object() {
        let stub = StubFetch::new()
            .with("repos/bob/repo1/contents/src", json!([]))
            .with(
                "repos/bob/repo1/contents/README.md",
                json!({"type": "file", "name": "README.md", "path": "README.md", "size": 5}),
            )
            .with(
                "repos/bob/repo1/contents/vendor/lib",
                json!({
                    "type": "submodule",
                    "name": "lib",
                    "path": "vendor/lib",
                    "size": 0,
                    "submodule_git_url": "git://example.com/lib.git"
                }),
            );
        let source = RestSource::new(stub);
        let repo = repo();

        assert_eq!(source.entry(&repo, "src").await.unwrap(), EntryPayload::Listing);
        assert_eq!(source.entry(&repo, "README.md").await.unwrap().size(), Some(5));

        let EntryPayload::Object { submodule, .. } = source.entry(&repo, "vendor/lib").await.unwrap()
        else {
            panic!("expected object payload");
        };
        assert!(submodule);

        // Contents requests are pinned to the default branch.
        assert!(
            source
                .fetcher()
                .requests()
                .iter()
                .all(|r| r.ends_with("?ref=main"))
        );
    }

    #[tokio::test]
    async fn test_capped_listing_reads_git_tree() {
        let capped: Vec<Value> = (0..CONTENTS_LISTING_CAP)
            .map(|i| json!({"type": "file", "name": format!("f{i:04}"), "size": 1}))
            .collect();
        let stub = StubFetch::new()
            .with("repos/bob/repo1/contents/big", Value::Array(capped))
            .with(
                "repos/bob/repo1/git/trees/main:big",
                json!({"sha": "abc", "truncated": false, "tree": [
                    {"path": "a.txt", "mode": "100644", "type": "blob", "size": 3},
                    {"path": "link", "mode": "120000", "type": "blob", "size": 5},
                    {"path": "sub", "mode": "040000", "type": "tree"},
                    {"path": "vendor", "mode": "160000", "type": "commit"}
                ]}),
            );
        let source = RestSource::new(stub);

        let page = source
            .tree_page(&repo(), "big", PageToken::FIRST_OFFSET)
            .await
            .unwrap();

        assert_eq!(page.next, None);
        let kinds: Vec<(String, Result<EntryKind, _>)> = page
            .items
            .iter()
            .map(|e| (e.name.clone(), classify(&e.payload)))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a.txt".to_string(), Ok(EntryKind::RegularFile)),
                ("link".to_string(), Ok(EntryKind::Symlink)),
                ("sub".to_string(), Ok(EntryKind::Directory)),
                ("vendor".to_string(), Ok(EntryKind::Unrepresentable)),
            ]
        );
        assert_eq!(page.items[0].payload.size(), Some(3));
        assert_eq!(source.fetcher().calls_to("repos/bob/repo1/git/trees/main:big"), 1);
    }

    #[tokio::test]
    async fn test_short_listing_stays_on_contents() {
        let stub = StubFetch::new().with(
            "repos/bob/repo1/contents",
            json!([{"type": "file", "name": "a.txt", "size": 1}]),
        );
        let source = RestSource::new(stub);

        let page = source
            .tree_page(&repo(), "", PageToken::FIRST_OFFSET)
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(source.fetcher().calls(), 1);
    }

    #[tokio::test]
    async fn test_blob_base64_with_line_breaks() {
        let stub = StubFetch::new().with(
            "repos/bob/repo1/contents/README.md",
            json!({
                "type": "file",
                "name": "README.md",
                "size": 5,
                "encoding": "base64",
                "content": "aGVs\nbG8=\n"
            }),
        );
        let source = RestSource::new(stub);
        let bytes = source.blob(&repo(), "README.md").await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_large_blob_via_git_blobs() {
        let stub = StubFetch::new()
            .with(
                "repos/bob/repo1/contents/big.bin",
                json!({
                    "type": "file",
                    "name": "big.bin",
                    "size": 3,
                    "sha": "abc123",
                    "encoding": "none",
                    "content": ""
                }),
            )
            .with(
                "repos/bob/repo1/git/blobs/abc123",
                json!({"content": "AAEC", "encoding": "base64"}),
            );
        let source = RestSource::new(stub);
        let bytes = source.blob(&repo(), "big.bin").await.unwrap();
        assert_eq!(&bytes[..], &[0u8, 1, 2]);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let stub = StubFetch::new().with(
            "repos/bob/repo1/contents/empty",
            json!({"type": "file", "name": "empty", "size": 0, "encoding": "base64", "content": ""}),
        );
        let source = RestSource::new(stub);
        assert!(source.blob(&repo(), "empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blob_on_directory_is_malformed() {
        let stub = StubFetch::new().with("repos/bob/repo1/contents/src", json!([]));
        let source = RestSource::new(stub);
        let err = source.blob(&repo(), "src").await.unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_invalid_base64() {
        assert!(matches!(decode_base64("!!!"), Err(RemoteError::Malformed(_))));
    }
}
