//! Shared fixtures for resolver integration tests.
//!
//! Both backends are wired to the same small world:
//!
//! ```text
//! alice (viewer)  follows bob
//! bob/repo1       README.md ("hello"), src/, src/lib.rs, link -> README.md,
//!                 vendor (submodule)
//! bob/empty       no commits
//! ```

#![allow(dead_code)]

use ghfs_core::remote::testing::{StubFetch, StubQuery, var_eq};
use ghfs_core::remote::{GraphQlSource, RemoteSource, RestSource};
use ghfs_core::{FsResult, Node, Resolver};
use serde_json::{Value, json};
use std::sync::Arc;

pub const README: &str = "hello";
pub const LIB_RS: &str = "pub fn answer() -> u32 { 42 }\n";

pub type RestResolver = Resolver<RestSource<StubFetch>>;
pub type GraphQlResolver = Resolver<GraphQlSource<StubQuery>>;

// ============================================================================
// REST world
// ============================================================================

fn rest_repo(name: &str, id: u64, pushed: Option<&str>, branch: Option<&str>) -> Value {
    json!({
        "name": name,
        "id": id,
        "owner": {"login": "bob", "id": 2},
        "pushed_at": pushed,
        "updated_at": "2024-03-02T12:00:00Z",
        "default_branch": branch
    })
}

fn rest_file(name: &str, path: &str, content: &str) -> Value {
    use base64::Engine;
    json!({
        "type": "file",
        "name": name,
        "path": path,
        "size": content.len(),
        "encoding": "base64",
        "content": base64::engine::general_purpose::STANDARD.encode(content)
    })
}

pub fn rest_world() -> StubFetch {
    StubFetch::new()
        .with("user", json!({"login": "alice", "id": 1}))
        .with_page("user/following", 1, json!([{"login": "bob", "id": 2}]))
        .with("users/alice", json!({"login": "alice", "id": 1}))
        .with("users/bob", json!({"login": "bob", "id": 2}))
        .with_page(
            "users/bob/repos",
            1,
            json!([
                rest_repo("empty", 11, None, None),
                rest_repo("repo1", 10, Some("2024-03-01T12:00:00Z"), Some("main"))
            ]),
        )
        .with_page("users/alice/repos", 1, json!([]))
        .with(
            "repos/bob/repo1",
            rest_repo("repo1", 10, Some("2024-03-01T12:00:00Z"), Some("main")),
        )
        .with("repos/bob/empty", rest_repo("empty", 11, None, None))
        .with(
            "repos/bob/repo1/contents",
            json!([
                {"type": "file", "name": "README.md", "path": "README.md", "size": README.len()},
                {"type": "dir", "name": "src", "path": "src", "size": 0},
                {"type": "symlink", "name": "link", "path": "link", "size": 9},
                {"type": "file", "name": "vendor", "path": "vendor", "size": 0,
                 "submodule_git_url": "https://example.com/vendor.git"}
            ]),
        )
        .with("repos/bob/repo1/contents/README.md", rest_file("README.md", "README.md", README))
        .with(
            "repos/bob/repo1/contents/src",
            json!([{"type": "file", "name": "lib.rs", "path": "src/lib.rs", "size": LIB_RS.len()}]),
        )
        .with("repos/bob/repo1/contents/src/lib.rs", rest_file("lib.rs", "src/lib.rs", LIB_RS))
        .with(
            "repos/bob/repo1/contents/link",
            json!({"type": "symlink", "name": "link", "path": "link", "size": 9, "target": "README.md"}),
        )
        .with(
            "repos/bob/repo1/contents/vendor",
            json!({"type": "submodule", "name": "vendor", "path": "vendor", "size": 0,
                   "submodule_git_url": "https://example.com/vendor.git"}),
        )
}

pub fn rest_resolver(world: StubFetch) -> RestResolver {
    Resolver::new(Arc::new(RestSource::new(world)))
}

// ============================================================================
// GraphQL world
// ============================================================================

fn gql_repo(name: &str, id: u64, pushed: Option<&str>, branch: Option<&str>) -> Value {
    json!({
        "name": name,
        "databaseId": id,
        "pushedAt": pushed,
        "updatedAt": "2024-03-02T12:00:00Z",
        "owner": {"login": "bob", "databaseId": 2},
        "defaultBranchRef": branch.map(|b| json!({"name": b}))
    })
}

fn gql_tree(entries: Value) -> Value {
    json!({"repository": {"object": {"__typename": "Tree", "entries": entries}}})
}

fn gql_blob(text: &str) -> Value {
    json!({"repository": {"object": {
        "__typename": "Blob",
        "byteSize": text.len(),
        "isBinary": false,
        "isTruncated": false,
        "text": text
    }}})
}

fn gql_blob_size(size: usize) -> Value {
    json!({"repository": {"object": {"__typename": "Blob", "byteSize": size}}})
}

pub fn graphql_world() -> StubQuery {
    StubQuery::new()
        .always("Viewer", json!({"viewer": {"login": "alice", "databaseId": 1}}))
        .always(
            "Following",
            json!({"viewer": {"following": {
                "nodes": [{"login": "bob", "databaseId": 2}],
                "pageInfo": {"hasNextPage": false, "endCursor": "Y3Vyc29yOjE="}
            }}}),
        )
        .on(
            "Account",
            var_eq("login", "alice"),
            json!({"repositoryOwner": {"login": "alice", "databaseId": 1}}),
        )
        .on(
            "Account",
            var_eq("login", "bob"),
            json!({"repositoryOwner": {"login": "bob", "databaseId": 2}}),
        )
        .on("Account", |_| true, json!({"repositoryOwner": null}))
        .on(
            "Repositories",
            var_eq("login", "bob"),
            json!({"repositoryOwner": {"repositories": {
                "nodes": [
                    gql_repo("empty", 11, None, None),
                    gql_repo("repo1", 10, Some("2024-03-01T12:00:00Z"), Some("main"))
                ],
                "pageInfo": {"hasNextPage": false, "endCursor": null}
            }}}),
        )
        .on(
            "Repository",
            var_eq("name", "repo1"),
            json!({"repository": gql_repo("repo1", 10, Some("2024-03-01T12:00:00Z"), Some("main"))}),
        )
        .on(
            "Repository",
            var_eq("name", "empty"),
            json!({"repository": gql_repo("empty", 11, None, None)}),
        )
        .on("Repository", |_| true, json!({"repository": null}))
        .on(
            "Tree",
            var_eq("expression", "main:"),
            gql_tree(json!([
                {"name": "README.md", "type": "blob", "mode": 33188},
                {"name": "src", "type": "tree", "mode": 16384},
                {"name": "link", "type": "blob", "mode": 40960},
                {"name": "vendor", "type": "commit", "mode": 57344}
            ])),
        )
        .on(
            "Tree",
            var_eq("expression", "main:src"),
            gql_tree(json!([{"name": "lib.rs", "type": "blob", "mode": 33188}])),
        )
        .on("Tree", |_| true, json!({"repository": {"object": null}}))
        .on("Blob", var_eq("expression", "main:README.md"), gql_blob(README))
        .on("Blob", var_eq("expression", "main:src/lib.rs"), gql_blob(LIB_RS))
        .on(
            "BlobSize",
            var_eq("expression", "main:README.md"),
            gql_blob_size(README.len()),
        )
        .on(
            "BlobSize",
            var_eq("expression", "main:src/lib.rs"),
            gql_blob_size(LIB_RS.len()),
        )
}

pub fn graphql_resolver(world: StubQuery) -> GraphQlResolver {
    Resolver::new(Arc::new(GraphQlSource::new(world)))
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolves an absolute path one segment at a time, as the kernel would.
pub async fn walk<R: RemoteSource>(resolver: &Resolver<R>, path: &str) -> FsResult<Node> {
    let mut node = resolver.root();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        node = resolver.lookup(&node, segment).await?;
    }
    Ok(node)
}

/// Names of the children of `path`.
pub async fn names<R: RemoteSource>(resolver: &Resolver<R>, path: &str) -> Vec<String> {
    let node = walk(resolver, path).await.expect("walk failed");
    resolver
        .list(&node)
        .await
        .expect("list failed")
        .into_iter()
        .map(|d| d.name)
        .collect()
}
