//! Namespace resolution.
//!
//! The namespace is three levels of remote entities followed by a repository
//! tree:
//!
//! ```text
//! /                       Root        (viewer + followed accounts)
//! /<login>                Account     (owned repositories)
//! /<login>/<repo>         Repository  (tree root of the default branch)
//! /<login>/<repo>/<path>  Entry       (directory, file, symlink)
//! ```
//!
//! Nodes carry no parent pointers; each one holds what it needs to query its
//! children (the owner for an account, the shared repository and relative
//! path for an entry). Every node is freshly built from the remote's answer
//! and gets its identifier from the session's [`IdentityAllocator`], so a
//! node reached by listing and the same node reached by lookup agree.

use crate::attributes::{self, AttributeRecord};
use crate::disambiguate::classify;
use crate::error::{FsError, FsResult, RemoteError};
use crate::identity::{IdentityAllocator, NodeId, ROOT_ID};
use crate::model::{Account, Dirent, EntryKind, FileContent, Node, NodeKind, Repository, TreeEntry};
use crate::pagination::drain;
use crate::remote::{ListedEntry, RemoteSource, join_path};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Returns true if `name` can denote a child at all.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}

/// Display path of the child `name` of `parent`.
fn child_path(parent: &Node, name: &str) -> String {
    match parent.display_path().as_str() {
        "/" => format!("/{name}"),
        dir => format!("{dir}/{name}"),
    }
}

/// Maps lookups and listings onto remote queries.
pub struct Resolver<R> {
    remote: Arc<R>,
    ids: IdentityAllocator,
}

impl<R: RemoteSource> Resolver<R> {
    /// Creates a resolver with a fresh identity session.
    pub fn new(remote: Arc<R>) -> Self {
        Self {
            remote,
            ids: IdentityAllocator::new(),
        }
    }

    /// The shared remote handle.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// The identity session.
    pub fn identities(&self) -> &IdentityAllocator {
        &self.ids
    }

    /// The root node.
    pub fn root(&self) -> Node {
        Node::root()
    }

    /// Identifier of the directory containing `node`. The root is its own
    /// parent.
    pub fn parent_id(&self, node: &Node) -> NodeId {
        match &node.kind {
            NodeKind::Root | NodeKind::Account(_) => ROOT_ID,
            NodeKind::Repository(repo) => self.ids.account(&repo.owner.login, repo.owner.remote_id),
            NodeKind::Entry(entry) => {
                let repo_id = self.repository_id(&entry.repository);
                match entry.relative_path.rsplit_once('/') {
                    Some((dir, _)) => self.ids.entry(repo_id, dir),
                    None => repo_id,
                }
            }
        }
    }

    /// Resolves the authenticated account. Used to check credentials before
    /// mounting.
    pub async fn viewer(&self) -> FsResult<Account> {
        Ok(self.remote.viewer().await?)
    }

    /// Resolves the child `name` of `parent`.
    #[instrument(level = "debug", skip(self, parent), fields(parent = %parent.display_path()))]
    pub async fn lookup(&self, parent: &Node, name: &str) -> FsResult<Node> {
        if !parent.is_container() {
            return Err(FsError::NotADirectory {
                path: parent.display_path(),
            });
        }
        if !is_valid_name(name) {
            return Err(FsError::NotFound {
                path: child_path(parent, name),
            });
        }

        match &parent.kind {
            NodeKind::Root => {
                let account = self
                    .remote
                    .account(name)
                    .await
                    .map_err(|e| FsError::from_remote(e, child_path(parent, name)))?;
                Ok(self.account_node(account))
            }
            NodeKind::Account(owner) => {
                let repo = self
                    .remote
                    .repository(owner, name)
                    .await
                    .map_err(|e| FsError::from_remote(e, child_path(parent, name)))?;
                Ok(self.repository_node(repo))
            }
            NodeKind::Repository(repo) => self.lookup_entry(repo, "", name).await,
            NodeKind::Entry(dir) => {
                self.lookup_entry(&dir.repository, &dir.relative_path, name)
                    .await
            }
        }
    }

    async fn lookup_entry(
        &self,
        repo: &Arc<Repository>,
        dir: &str,
        name: &str,
    ) -> FsResult<Node> {
        let path = join_path(dir, name);
        let shown = format!("/{}/{path}", repo.full_name());

        let payload = self
            .remote
            .entry(repo, &path)
            .await
            .map_err(|e| FsError::from_remote(e, shown.clone()))?;
        let kind = classify(&payload)
            .map_err(|e| FsError::Transport(RemoteError::Malformed(format!("{shown}: {e}"))))?;

        if kind == EntryKind::Unrepresentable {
            return Err(FsError::Unrepresentable { path: shown });
        }

        debug!(path = %shown, ?kind, "resolved entry");
        Ok(self.entry_node(repo, path, kind, payload.size()))
    }

    /// Lists every child of `node`, draining all pages.
    #[instrument(level = "debug", skip(self, node), fields(node = %node.display_path()))]
    pub async fn list(&self, node: &Node) -> FsResult<Vec<Dirent>> {
        let path = node.display_path();
        let entries = match &node.kind {
            NodeKind::Root => self.list_root().await,
            NodeKind::Account(owner) => self.list_repositories(owner).await,
            NodeKind::Repository(repo) => self.list_tree(repo, "").await,
            NodeKind::Entry(dir) if dir.kind.is_container() => {
                self.list_tree(&dir.repository, &dir.relative_path).await
            }
            NodeKind::Entry(_) => return Err(FsError::NotADirectory { path }),
        }
        .map_err(|e| FsError::from_remote(e, path.clone()))?;

        debug!(path = %path, count = entries.len(), "listed");
        Ok(entries)
    }

    async fn list_root(&self) -> Result<Vec<Dirent>, RemoteError> {
        let viewer = self.remote.viewer().await?;
        let following = drain(self.remote.first_page(), |token| {
            self.remote.following_page(token)
        })
        .await?;

        let mut seen = HashSet::new();
        Ok(std::iter::once(viewer)
            .chain(following)
            .filter(|account| seen.insert(account.login.to_lowercase()))
            .map(|account| Dirent {
                id: self.ids.account(&account.login, account.remote_id),
                kind: attributes::AttrKind::Directory,
                name: account.login,
            })
            .collect())
    }

    async fn list_repositories(&self, owner: &Account) -> Result<Vec<Dirent>, RemoteError> {
        let repos = drain(self.remote.first_page(), |token| {
            self.remote.repositories_page(owner, token)
        })
        .await?;

        let mut seen = HashSet::new();
        Ok(repos
            .into_iter()
            .filter(|repo| seen.insert(repo.name.clone()))
            .map(|repo| Dirent {
                id: self.ids.repository(&repo.owner.login, &repo.name, repo.remote_id),
                kind: attributes::AttrKind::Directory,
                name: repo.name,
            })
            .collect())
    }

    async fn list_tree(&self, repo: &Repository, dir: &str) -> Result<Vec<Dirent>, RemoteError> {
        let listed = match drain(self.remote.first_page(), |token| {
            self.remote.tree_page(repo, dir, token)
        })
        .await
        {
            Ok(listed) => listed,
            // A repository without commits has no tree at all.
            Err(RemoteError::NotFound) if dir.is_empty() => {
                debug!(repo = %repo.full_name(), "repository has no tree");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let repo_id = self.repository_id(repo);
        let mut seen = HashSet::new();
        Ok(listed
            .into_iter()
            .filter(|entry| seen.insert(entry.name.clone()))
            .filter_map(|ListedEntry { name, payload }| match classify(&payload) {
                Ok(EntryKind::Unrepresentable) => {
                    debug!(repo = %repo.full_name(), dir, name, "skipping unrepresentable entry");
                    None
                }
                Ok(kind) => Some(Dirent {
                    id: self.ids.entry(repo_id, &join_path(dir, &name)),
                    kind: kind.attr_kind(),
                    name,
                }),
                Err(e) => {
                    warn!(repo = %repo.full_name(), dir, name, error = %e, "skipping entry");
                    None
                }
            })
            .collect())
    }

    /// Synthesizes the attributes of `node`, asking the remote for the size
    /// of a file whose lookup did not report one.
    pub async fn attributes(&self, node: &Node) -> FsResult<AttributeRecord> {
        let size = match (attributes::captured_size(node), &node.kind) {
            (Some(size), _) => size,
            (None, NodeKind::Entry(entry)) => {
                self.remote
                    .blob_size(&entry.repository, &entry.relative_path)
                    .await?
            }
            (None, _) => 0,
        };
        Ok(attributes::synthesize(node, size))
    }

    /// Fetches the full content of a regular file.
    pub async fn read(&self, node: &Node) -> FsResult<FileContent> {
        let path = node.display_path();
        match &node.kind {
            NodeKind::Entry(entry) if entry.kind == EntryKind::RegularFile => {
                let bytes = self
                    .remote
                    .blob(&entry.repository, &entry.relative_path)
                    .await
                    .map_err(|e| FsError::from_remote(e, path))?;
                Ok(FileContent::new(bytes))
            }
            NodeKind::Entry(entry) if !entry.kind.is_container() => Err(FsError::NotAFile { path }),
            _ => Err(FsError::IsADirectory { path }),
        }
    }

    fn account_node(&self, account: Account) -> Node {
        Node {
            id: self.ids.account(&account.login, account.remote_id),
            kind: NodeKind::Account(account),
        }
    }

    fn repository_node(&self, repo: Repository) -> Node {
        Node {
            id: self.repository_id(&repo),
            kind: NodeKind::Repository(Arc::new(repo)),
        }
    }

    fn repository_id(&self, repo: &Repository) -> NodeId {
        self.ids
            .repository(&repo.owner.login, &repo.name, repo.remote_id)
    }

    fn entry_node(
        &self,
        repo: &Arc<Repository>,
        relative_path: String,
        kind: EntryKind,
        size: Option<u64>,
    ) -> Node {
        Node {
            id: self.ids.entry(self.repository_id(repo), &relative_path),
            kind: NodeKind::Entry(TreeEntry {
                relative_path,
                repository: Arc::clone(repo),
                kind,
                size,
            }),
        }
    }
}
