//! Mount configuration for the FUSE filesystem.
//!
//! The kernel caches attributes and lookups for as long as each reply says.
//! Remote state changes slowly relative to a browsing session, so the
//! defaults lean on those TTLs rather than re-querying on every `stat`.

use std::time::Duration;

/// Default kernel TTL for attributes and lookups.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default I/O timeout; large listings drain several pages.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration options for the FUSE filesystem.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Time-to-live for attributes handed back by `getattr`.
    ///
    /// Default: 30 seconds.
    pub attr_ttl: Duration,

    /// Time-to-live for name lookups handed back by `lookup`.
    ///
    /// Default: 30 seconds.
    pub entry_ttl: Duration,

    /// Timeout for one remote-bound operation, page drains included.
    ///
    /// Operations that exceed it fail with ETIMEDOUT and are cancelled.
    /// Default: 60 seconds.
    pub io_timeout: Duration,

    /// Let users other than the mounter access the filesystem.
    pub allow_other: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_TTL,
            entry_ttl: DEFAULT_TTL,
            io_timeout: DEFAULT_IO_TIMEOUT,
            allow_other: false,
        }
    }
}

impl MountConfig {
    /// Sets the attribute TTL.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Sets the lookup TTL.
    #[must_use]
    pub fn entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Sets the I/O timeout for individual operations.
    #[must_use]
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Allows access by other users.
    #[must_use]
    pub fn allow_other(mut self, allow: bool) -> Self {
        self.allow_other = allow;
        self
    }
}
