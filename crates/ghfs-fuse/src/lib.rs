//! FUSE filesystem presenting GitHub as a read-only directory tree.
//!
//! This crate mounts a [`ghfs_core::Resolver`] through the kernel:
//!
//! ```text
//! /                       viewer and followed accounts
//! /<login>/               repositories owned by the account
//! /<login>/<repo>/...     default-branch tree
//! ```
//!
//! Inode numbers are the resolver's node identifiers, so an entity keeps its
//! inode for the life of the mount no matter which path reached it.
//!
//! # Usage
//!
//! ```ignore
//! use ghfs_fuse::{GithubFS, MountConfig};
//!
//! let fs = GithubFS::new(resolver, runtime.handle().clone(), MountConfig::default());
//! let session = fuser::spawn_mount2(fs, mountpoint, &options)?;
//! ```

pub mod async_bridge;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod handles;
pub mod inode;

pub use async_bridge::{BridgeError, BridgeStats};
pub use config::MountConfig;
pub use error::{FuseError, FuseResult, ToErrno};
pub use filesystem::{FsCore, GithubFS};
pub use handles::{DirRow, FuseHandle, FuseHandleTable, HandleTable};
pub use inode::{InodeEntry, InodeTable, ROOT_INODE};
