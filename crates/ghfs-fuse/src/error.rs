//! Error handling and mapping for the FUSE filesystem.
//!
//! Converts resolver and transport errors into the POSIX error codes FUSE
//! hands back to the kernel.

use crate::async_bridge::BridgeError;
use ghfs_core::{FsError, RemoteError};
use thiserror::Error;

/// FUSE-specific errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FuseError {
    /// Namespace operation failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// The operation did not finish in time.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Inode unknown to the table (never looked up, or forgotten).
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// Invalid file handle.
    #[error("Invalid file handle: {0}")]
    InvalidHandle(u64),

    /// Wrong handle type (e.g., readdir on a file handle).
    #[error("Wrong handle type for operation")]
    WrongHandleType,

    /// Negative read offset.
    #[error("Invalid offset: {0}")]
    InvalidOffset(i64),

    /// Any attempt to modify the filesystem.
    #[error("Read-only filesystem")]
    ReadOnly,
}

impl FuseError {
    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        match self {
            FuseError::Fs(e) => fs_error_to_errno(e),
            FuseError::Bridge(e) => e.to_errno(),
            FuseError::InvalidInode(_) => libc::ENOENT,
            FuseError::InvalidHandle(_) | FuseError::WrongHandleType => libc::EBADF,
            FuseError::InvalidOffset(_) => libc::EINVAL,
            FuseError::ReadOnly => libc::EROFS,
        }
    }
}

impl From<RemoteError> for FuseError {
    fn from(e: RemoteError) -> Self {
        FuseError::Fs(FsError::Transport(e))
    }
}

/// Converts a namespace error to a libc error code.
pub fn fs_error_to_errno(e: &FsError) -> i32 {
    match e {
        FsError::NotFound { .. } => libc::ENOENT,
        FsError::NotADirectory { .. } => libc::ENOTDIR,
        FsError::IsADirectory { .. } => libc::EISDIR,
        FsError::NotAFile { .. } => libc::EINVAL,
        FsError::Unrepresentable { .. } => libc::ENOTSUP,
        FsError::Transport(e) => remote_error_to_errno(e),
    }
}

/// Converts a transport error to a libc error code.
pub fn remote_error_to_errno(e: &RemoteError) -> i32 {
    match e {
        RemoteError::NotFound => libc::ENOENT,
        RemoteError::Unauthorized => libc::EACCES,
        RemoteError::RateLimited { .. } => libc::EAGAIN,
        RemoteError::Http { .. }
        | RemoteError::Network(_)
        | RemoteError::Decode(_)
        | RemoteError::Malformed(_)
        | RemoteError::GraphQl(_)
        | RemoteError::BinaryContent
        | RemoteError::Auth(_) => libc::EIO,
    }
}

/// Result type for FUSE operations.
pub type FuseResult<T> = Result<T, FuseError>;

/// Extension trait to convert errors to errno.
pub trait ToErrno {
    /// Converts this error to a libc error code.
    fn to_errno(&self) -> i32;
}

impl ToErrno for FsError {
    fn to_errno(&self) -> i32 {
        fs_error_to_errno(self)
    }
}

impl ToErrno for RemoteError {
    fn to_errno(&self) -> i32 {
        remote_error_to_errno(self)
    }
}
