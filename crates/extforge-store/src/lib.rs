//! Persistent state for extforge: command locks and the snapshot cache.
//!
//! Everything lives under the project's cache directory (`.extforge` by
//! default). `CacheLayout` names the files, `LockService` provides
//! cross-process mutual exclusion keyed by command id, and `SnapshotCache`
//! decides whether the tracked inputs changed since the last committed build.

pub mod layout;
pub mod locks;
pub mod snapshot;

pub use layout::{CacheLayout, CACHE_FORMAT_VERSION};
pub use locks::{LockGuard, LockRecord, LockService};
pub use snapshot::{Fingerprint, Snapshot, SnapshotCache, SnapshotDiff, TrackedFile};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("invalid lock id '{0}': use letters, digits, '-' or '_'")]
    InvalidLockId(String),
    #[error("cache format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
