//! FUSE filesystem over the GitHub namespace.
//!
//! [`GithubFS`] implements the fuser `Filesystem` trait. Callbacks that need
//! the remote (`lookup`, `getattr`, `open`, `opendir`) are handed to
//! [`async_bridge::dispatch`] and reply from the runtime, so a slow listing
//! never holds up an unrelated `stat`. Callbacks served from local state
//! (`read`, `readdir`, `release*`, `forget`, `statfs`, `access`) reply
//! immediately.
//!
//! Every mutating callback fails with `EROFS`.
//!
//! | Operation | Source |
//! |-----------|--------|
//! | lookup | `Resolver::lookup` + `Resolver::attributes` |
//! | getattr | `Resolver::attributes` |
//! | open/read/release | `Resolver::read` once per open, then the handle |
//! | opendir/readdir/releasedir | `Resolver::list` once per open, then the handle |
//! | forget/batch_forget | inode table |
//! | statfs/access | local |

use crate::async_bridge::{self, BridgeStats};
use crate::config::MountConfig;
use crate::error::{FuseError, FuseResult};
use crate::handles::{DirRow, FuseHandle, FuseHandleTable};
use crate::inode::{InodeTable, ino_of};
use bytes::Bytes;
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use ghfs_core::remote::RemoteSource;
use ghfs_core::{AttrKind, AttributeRecord, Node, Resolver};
use libc::c_int;
use std::ffi::OsStr;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use tokio::runtime::Handle;
use tracing::{debug, info, trace};

/// Block size reported by `getattr` and `statfs`.
const BLOCK_SIZE: u32 = 4096;

/// Longest name `statfs` advertises.
const NAME_MAX: u32 = 255;

/// Kernel file type of an attribute kind.
pub fn file_type(kind: AttrKind) -> FileType {
    match kind {
        AttrKind::Directory => FileType::Directory,
        AttrKind::File => FileType::RegularFile,
    }
}

/// Converts a synthesized attribute record into the kernel's form.
pub fn file_attr(record: &AttributeRecord, uid: u32, gid: u32) -> FileAttr {
    let kind = file_type(record.kind);
    FileAttr {
        ino: ino_of(record.identifier),
        size: record.size_bytes,
        blocks: record.size_bytes.div_ceil(512),
        atime: record.modified_time,
        mtime: record.modified_time,
        ctime: record.changed_time,
        crtime: record.modified_time,
        kind,
        perm: record.permission_bits,
        nlink: if kind == FileType::Directory { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// Returns true if `open` flags ask for anything beyond reading.
pub fn is_write_request(flags: i32) -> bool {
    flags & libc::O_ACCMODE != libc::O_RDONLY || flags & libc::O_TRUNC != 0
}

/// State shared between the session thread and in-flight operations.
pub struct FsCore<R> {
    resolver: Arc<Resolver<R>>,
    inodes: InodeTable,
    handles: FuseHandleTable,
    uid: u32,
    gid: u32,
}

impl<R: RemoteSource> FsCore<R> {
    /// Creates the shared state; files are owned by `uid:gid`.
    pub fn new(resolver: Arc<Resolver<R>>, uid: u32, gid: u32) -> Self {
        Self {
            resolver,
            inodes: InodeTable::new(),
            handles: FuseHandleTable::new(),
            uid,
            gid,
        }
    }

    /// The inode table.
    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    /// The open handle table.
    pub fn handles(&self) -> &FuseHandleTable {
        &self.handles
    }

    fn node(&self, ino: u64) -> FuseResult<Node> {
        self.inodes.node(ino).ok_or(FuseError::InvalidInode(ino))
    }

    fn attr(&self, record: &AttributeRecord) -> FileAttr {
        file_attr(record, self.uid, self.gid)
    }

    /// Resolves `name` under `parent`. The child is only counted as looked
    /// up once its attributes are known.
    pub async fn lookup(&self, parent: u64, name: &str) -> FuseResult<FileAttr> {
        let parent = self.node(parent)?;
        let node = self.resolver.lookup(&parent, name).await?;
        let record = self.resolver.attributes(&node).await?;
        self.inodes.remember(node);
        Ok(self.attr(&record))
    }

    /// Attributes of a known inode.
    pub async fn getattr(&self, ino: u64) -> FuseResult<FileAttr> {
        let node = self.node(ino)?;
        let record = self.resolver.attributes(&node).await?;
        Ok(self.attr(&record))
    }

    /// Fetches the file content and opens a handle on it.
    pub async fn open(&self, ino: u64, flags: i32) -> FuseResult<u64> {
        if is_write_request(flags) {
            return Err(FuseError::ReadOnly);
        }
        let node = self.node(ino)?;
        let content = self.resolver.read(&node).await?;
        Ok(self.handles.insert_auto(FuseHandle::File(content.bytes)))
    }

    /// Lists the directory and opens a handle on the snapshot.
    pub async fn opendir(&self, ino: u64) -> FuseResult<u64> {
        let node = self.node(ino)?;
        let entries = self.resolver.list(&node).await?;

        let mut rows = Vec::with_capacity(entries.len() + 2);
        rows.push(DirRow {
            ino,
            kind: FileType::Directory,
            name: ".".to_string(),
        });
        rows.push(DirRow {
            ino: ino_of(self.resolver.parent_id(&node)),
            kind: FileType::Directory,
            name: "..".to_string(),
        });
        rows.extend(entries.into_iter().map(|d| DirRow {
            ino: ino_of(d.id),
            kind: file_type(d.kind),
            name: d.name,
        }));
        Ok(self.handles.insert_auto(FuseHandle::Dir(rows)))
    }

    /// Bytes of an open file.
    pub fn read(&self, fh: u64, offset: i64, size: u32) -> FuseResult<Bytes> {
        let offset = u64::try_from(offset).map_err(|_| FuseError::InvalidOffset(offset))?;
        let handle = self.handles.get(fh).ok_or(FuseError::InvalidHandle(fh))?;
        handle.read_at(offset, size).ok_or(FuseError::WrongHandleType)
    }

    /// Rows of an open directory from `offset` on.
    pub fn readdir(&self, fh: u64, offset: i64) -> FuseResult<Vec<DirRow>> {
        let skip = usize::try_from(offset).map_err(|_| FuseError::InvalidOffset(offset))?;
        let handle = self.handles.get(fh).ok_or(FuseError::InvalidHandle(fh))?;
        let rows = handle.as_dir().ok_or(FuseError::WrongHandleType)?;
        Ok(rows.iter().skip(skip).cloned().collect())
    }

    /// Closes a handle of either kind.
    pub fn release(&self, fh: u64) -> FuseResult<()> {
        self.handles
            .remove(fh)
            .map(drop)
            .ok_or(FuseError::InvalidHandle(fh))
    }

    /// Permission check: anything asking for write access is refused.
    pub fn access(&self, ino: u64, mask: i32) -> FuseResult<()> {
        self.node(ino)?;
        if mask & libc::W_OK != 0 {
            return Err(FuseError::ReadOnly);
        }
        Ok(())
    }
}

/// Read-only FUSE filesystem presenting accounts, repositories and trees.
pub struct GithubFS<R> {
    /// Runtime every remote-bound operation is spawned on.
    handle: Handle,
    config: MountConfig,
    stats: Arc<BridgeStats>,
    core: Arc<FsCore<R>>,
    /// Called once when the kernel tears the mount down.
    on_destroy: Option<Box<dyn FnOnce() + Send>>,
}

impl<R: RemoteSource> GithubFS<R> {
    /// Creates a filesystem over `resolver`. Files are owned by the mounting
    /// user.
    pub fn new(resolver: Arc<Resolver<R>>, handle: Handle, config: MountConfig) -> Self {
        // SAFETY: getuid/getgid cannot fail and have no preconditions.
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        Self {
            handle,
            config,
            stats: BridgeStats::new(),
            core: Arc::new(FsCore::new(resolver, uid, gid)),
            on_destroy: None,
        }
    }

    /// Runs `callback` when the session ends, whether the process asked for
    /// it or the mountpoint was unmounted from outside.
    #[must_use]
    pub fn on_destroy(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_destroy = Some(Box::new(callback));
        self
    }

    /// Statistics of remote-bound operations.
    pub fn stats(&self) -> &Arc<BridgeStats> {
        &self.stats
    }

    /// Runs `future` on the runtime and hands its result to `complete`,
    /// folding a timeout into the same error type.
    fn spawn<T, F, C>(&self, future: F, complete: C)
    where
        F: Future<Output = FuseResult<T>> + Send + 'static,
        T: Send + 'static,
        C: FnOnce(FuseResult<T>) + Send + 'static,
    {
        async_bridge::dispatch(
            &self.handle,
            self.config.io_timeout,
            Arc::clone(&self.stats),
            future,
            move |outcome| complete(outcome.unwrap_or_else(|e| Err(FuseError::from(e)))),
        );
    }
}

impl<R: RemoteSource> Filesystem for GithubFS<R> {
    fn init(&mut self, _req: &Request<'_>, config: &mut KernelConfig) -> Result<(), c_int> {
        info!("FUSE filesystem initialized");
        // Concurrent reads of one file are served from the same handle.
        config.add_capabilities(fuser::consts::FUSE_ASYNC_READ).ok();
        Ok(())
    }

    fn destroy(&mut self) {
        info!(
            started = self.stats.operations_started.load(Ordering::Relaxed),
            completed = self.stats.operations_completed.load(Ordering::Relaxed),
            timed_out = self.stats.operations_timed_out.load(Ordering::Relaxed),
            "FUSE filesystem destroyed"
        );
        if let Some(callback) = self.on_destroy.take() {
            callback();
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        // Remote names are UTF-8; anything else cannot exist.
        let Some(name) = name.to_str().map(str::to_owned) else {
            reply.error(libc::ENOENT);
            return;
        };
        trace!(parent, child = %name, "lookup");

        let core = Arc::clone(&self.core);
        let ttl = self.config.entry_ttl;
        self.spawn(
            async move { core.lookup(parent, &name).await },
            move |result| match result {
                Ok(attr) => reply.entry(&ttl, &attr, 0),
                Err(e) => {
                    debug!(parent, error = %e, "lookup failed");
                    reply.error(e.to_errno());
                }
            },
        );
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(inode = ino, nlookup, "forget");
        self.core.inodes.forget(ino, nlookup);
    }

    fn batch_forget(&mut self, _req: &Request<'_>, nodes: &[fuser::fuse_forget_one]) {
        trace!(count = nodes.len(), "batch_forget");
        for node in nodes {
            self.core.inodes.forget(node.nodeid, node.nlookup);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");
        let core = Arc::clone(&self.core);
        let ttl = self.config.attr_ttl;
        self.spawn(
            async move { core.getattr(ino).await },
            move |result| match result {
                Ok(attr) => reply.attr(&ttl, &attr),
                Err(e) => {
                    debug!(inode = ino, error = %e, "getattr failed");
                    reply.error(e.to_errno());
                }
            },
        );
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, flags, "open");
        let core = Arc::clone(&self.core);
        self.spawn(
            async move { core.open(ino, flags).await },
            move |result| match result {
                Ok(fh) => reply.opened(fh, fuser::consts::FOPEN_KEEP_CACHE),
                Err(e) => {
                    debug!(inode = ino, error = %e, "open failed");
                    reply.error(e.to_errno());
                }
            },
        );
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, fh, offset, size, "read");
        match self.core.read(fh, offset, size) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.core.release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, "opendir");
        let core = Arc::clone(&self.core);
        self.spawn(
            async move { core.opendir(ino).await },
            move |result| match result {
                Ok(fh) => reply.opened(fh, 0),
                Err(e) => {
                    debug!(inode = ino, error = %e, "opendir failed");
                    reply.error(e.to_errno());
                }
            },
        );
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, fh, offset, "readdir");
        let rows = match self.core.readdir(fh, offset) {
            Ok(rows) => rows,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };

        for (index, row) in (offset..).zip(rows) {
            // The offset handed back is that of the next entry.
            if reply.add(row.ino, index + 1, row.kind, &row.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        match self.core.release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let files = u64::try_from(self.core.inodes.len()).unwrap_or(u64::MAX);
        reply.statfs(0, 0, 0, files, 0, BLOCK_SIZE, NAME_MAX, BLOCK_SIZE);
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        match self.core.access(ino, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    // Everything below would modify the namespace.

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        reply.error(libc::EROFS);
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(libc::EROFS);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(libc::EROFS);
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::EROFS);
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::EROFS);
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _link_name: &OsStr,
        _target: &Path,
        reply: ReplyEntry,
    ) {
        reply.error(libc::EROFS);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(libc::EROFS);
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(libc::EROFS);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(libc::EROFS);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(libc::EROFS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::ROOT_INODE;
    use ghfs_core::remote::RestSource;
    use ghfs_core::remote::testing::StubFetch;
    use ghfs_core::{NodeId, READ_ONLY_PERM, RemoteError};
    use serde_json::json;
    use std::time::Duration;

    fn world() -> StubFetch {
        StubFetch::new()
            .with("user", json!({"login": "alice", "id": 1}))
            .with_page("user/following", 1, json!([{"login": "bob", "id": 2}]))
            .with("users/bob", json!({"login": "bob", "id": 2}))
            .with(
                "repos/bob/repo1",
                json!({
                    "name": "repo1", "id": 10, "owner": {"login": "bob", "id": 2},
                    "pushed_at": "2024-03-01T12:00:00Z",
                    "updated_at": "2024-03-02T12:00:00Z",
                    "default_branch": "main"
                }),
            )
            .with(
                "repos/bob/repo1/contents",
                json!([{"type": "file", "name": "README.md", "path": "README.md", "size": 5}]),
            )
            .with(
                "repos/bob/repo1/contents/README.md",
                json!({"type": "file", "name": "README.md", "path": "README.md", "size": 5,
                       "encoding": "base64", "content": "aGVsbG8="}),
            )
    }

    fn core(stub: StubFetch) -> FsCore<RestSource<StubFetch>> {
        FsCore::new(Arc::new(Resolver::new(Arc::new(RestSource::new(stub)))), 1000, 1000)
    }

    async fn walk(core: &FsCore<RestSource<StubFetch>>, path: &[&str]) -> FileAttr {
        let mut attr = core.getattr(ROOT_INODE).await.unwrap();
        for name in path {
            attr = core.lookup(attr.ino, name).await.unwrap();
        }
        attr
    }

    #[test]
    fn test_file_attr_conversion() {
        let record = AttributeRecord {
            identifier: NodeId::from_raw(0x3000_0000_0000_0042),
            kind: AttrKind::File,
            permission_bits: READ_ONLY_PERM,
            size_bytes: 4097,
            modified_time: SystemTime::UNIX_EPOCH + Duration::from_secs(100),
            changed_time: SystemTime::UNIX_EPOCH + Duration::from_secs(200),
        };
        let attr = file_attr(&record, 501, 20);
        assert_eq!(attr.ino, 0x3000_0000_0000_0042);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o400);
        assert_eq!(attr.nlink, 1);
        assert_eq!(attr.blocks, 9);
        assert_eq!(attr.mtime, record.modified_time);
        assert_eq!(attr.ctime, record.changed_time);
        assert_eq!((attr.uid, attr.gid), (501, 20));

        let dir = AttributeRecord {
            kind: AttrKind::Directory,
            size_bytes: 0,
            identifier: ghfs_core::ROOT_ID,
            ..record
        };
        let attr = file_attr(&dir, 501, 20);
        assert_eq!(attr.ino, ROOT_INODE);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn test_write_flags_are_detected() {
        assert!(!is_write_request(libc::O_RDONLY));
        assert!(!is_write_request(libc::O_RDONLY | libc::O_NONBLOCK));
        assert!(is_write_request(libc::O_WRONLY));
        assert!(is_write_request(libc::O_RDWR));
        assert!(is_write_request(libc::O_RDONLY | libc::O_TRUNC));
    }

    #[tokio::test]
    async fn test_lookup_registers_inode() {
        let core = core(world());
        let readme = walk(&core, &["bob", "repo1", "README.md"]).await;
        assert_eq!(readme.kind, FileType::RegularFile);
        assert_eq!(readme.size, 5);
        assert!(core.inodes().node(readme.ino).is_some());

        // Same entity, same inode.
        let again = walk(&core, &["bob", "repo1", "README.md"]).await;
        assert_eq!(again.ino, readme.ino);
    }

    #[tokio::test]
    async fn test_failed_lookup_registers_nothing() {
        let core = core(world());
        let before = core.inodes().len();
        let err = core.lookup(ROOT_INODE, "ghost").await.unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
        assert_eq!(core.inodes().len(), before);
    }

    #[tokio::test]
    async fn test_unknown_inode() {
        let core = core(world());
        let err = core.getattr(0xdead).await.unwrap_err();
        assert!(matches!(err, FuseError::InvalidInode(0xdead)));
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[tokio::test]
    async fn test_open_read_release() {
        let core = core(world());
        let readme = walk(&core, &["bob", "repo1", "README.md"]).await;

        let fh = core.open(readme.ino, libc::O_RDONLY).await.unwrap();
        assert_eq!(&core.read(fh, 0, 4096).unwrap()[..], b"hello");
        assert_eq!(&core.read(fh, 3, 4096).unwrap()[..], b"lo");
        assert!(matches!(core.read(fh, -1, 1), Err(FuseError::InvalidOffset(-1))));

        core.release(fh).unwrap();
        assert!(matches!(core.read(fh, 0, 1), Err(FuseError::InvalidHandle(_))));
        assert!(core.handles().is_empty());
    }

    #[tokio::test]
    async fn test_open_for_write_is_refused() {
        let core = core(world());
        let readme = walk(&core, &["bob", "repo1", "README.md"]).await;
        let err = core.open(readme.ino, libc::O_RDWR).await.unwrap_err();
        assert_eq!(err.to_errno(), libc::EROFS);
        assert_eq!(core.access(readme.ino, libc::W_OK).unwrap_err().to_errno(), libc::EROFS);
        assert!(core.access(readme.ino, libc::R_OK).is_ok());
    }

    #[tokio::test]
    async fn test_open_directory_is_refused() {
        let core = core(world());
        let repo = walk(&core, &["bob", "repo1"]).await;
        let err = core.open(repo.ino, libc::O_RDONLY).await.unwrap_err();
        assert_eq!(err.to_errno(), libc::EISDIR);
    }

    #[tokio::test]
    async fn test_opendir_snapshot() {
        let core = core(world());
        let bob = walk(&core, &["bob"]).await;
        let repo = walk(&core, &["bob", "repo1"]).await;

        let fh = core.opendir(repo.ino).await.unwrap();
        let rows = core.readdir(fh, 0).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "README.md"]);
        assert_eq!(rows[0].ino, repo.ino);
        assert_eq!(rows[1].ino, bob.ino);
        assert_eq!(rows[2].kind, FileType::RegularFile);

        // Resuming from an offset continues the same snapshot.
        assert_eq!(core.readdir(fh, 2).unwrap(), rows[2..].to_vec());
        assert!(core.readdir(fh, 3).unwrap().is_empty());
        core.release(fh).unwrap();
    }

    #[tokio::test]
    async fn test_root_listing_parent_is_root() {
        let core = core(world());
        let fh = core.opendir(ROOT_INODE).await.unwrap();
        let rows = core.readdir(fh, 0).unwrap();
        assert_eq!(rows[1].ino, ROOT_INODE);
        assert_eq!(
            rows.iter().skip(2).map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["alice", "bob"]
        );
    }

    #[tokio::test]
    async fn test_readdir_on_file_handle() {
        let core = core(world());
        let readme = walk(&core, &["bob", "repo1", "README.md"]).await;
        let fh = core.open(readme.ino, libc::O_RDONLY).await.unwrap();
        assert!(matches!(core.readdir(fh, 0), Err(FuseError::WrongHandleType)));
    }

    #[tokio::test]
    async fn test_transport_errors_reach_errno() {
        let stub = world().with_failure("users/carol", || RemoteError::RateLimited { reset: None });
        let core = core(stub);
        let err = core.lookup(ROOT_INODE, "carol").await.unwrap_err();
        assert_eq!(err.to_errno(), libc::EAGAIN);
    }

    #[tokio::test]
    async fn test_destroy_notifies_once() {
        let (tx, rx) = std::sync::mpsc::channel();
        let resolver = Arc::new(Resolver::new(Arc::new(RestSource::new(world()))));
        let mut fs = GithubFS::new(resolver, Handle::current(), MountConfig::default())
            .on_destroy(move || {
                let _ = tx.send(());
            });

        fs.destroy();
        assert!(rx.try_recv().is_ok());

        // The callback is spent; the sender went with it.
        fs.destroy();
        assert_eq!(rx.try_recv(), Err(std::sync::mpsc::TryRecvError::Disconnected));
    }
}
