//! Change-detection gate over the tracked input files.
//!
//! A [`Snapshot`] maps every tracked file to a cheap fingerprint (size and
//! modification time). [`SnapshotCache::lock`] compares a fresh snapshot with
//! the last committed one and holds the fresh one as pending until the run
//! either commits it or discards it.

use crate::layout::CacheLayout;
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Size plus modification time. Identical values across a real edit are an
/// accepted miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub modified_ns: u64,
}

impl Fingerprint {
    pub fn of(metadata: &fs::Metadata) -> Self {
        let modified_ns = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos() as u64);
        Self {
            size: metadata.len(),
            modified_ns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub path: String,
    pub fingerprint: Fingerprint,
}

/// Fingerprints keyed by `/`-separated path relative to the project root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    entries: BTreeMap<String, Fingerprint>,
}

impl Snapshot {
    pub fn from_files(files: impl IntoIterator<Item = TrackedFile>) -> Self {
        Self {
            entries: files
                .into_iter()
                .map(|f| (f.path, f.fingerprint))
                .collect(),
        }
    }

    /// Fingerprint everything under `tracked` (files or directories),
    /// skipping anything under `excluded`. Missing roots contribute nothing.
    pub fn capture(
        root: &Path,
        tracked: &[PathBuf],
        excluded: &[PathBuf],
    ) -> Result<Self, StoreError> {
        let mut entries = BTreeMap::new();
        for path in tracked {
            collect(root, path, excluded, &mut entries)?;
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<Fingerprint> {
        self.entries.get(path).copied()
    }

    pub fn files(&self) -> impl Iterator<Item = TrackedFile> + '_ {
        self.entries.iter().map(|(path, fingerprint)| TrackedFile {
            path: path.clone(),
            fingerprint: *fingerprint,
        })
    }

    /// Entry-by-entry comparison against an older snapshot.
    pub fn diff_from(&self, older: &Snapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();
        for (path, fingerprint) in &self.entries {
            match older.entries.get(path) {
                None => diff.added.push(path.clone()),
                Some(old) if old != fingerprint => diff.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in older.entries.keys() {
            if !self.entries.contains_key(path) {
                diff.removed.push(path.clone());
            }
        }
        diff
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

fn collect(
    root: &Path,
    path: &Path,
    excluded: &[PathBuf],
    entries: &mut BTreeMap<String, Fingerprint>,
) -> Result<(), StoreError> {
    if excluded.iter().any(|ex| path.starts_with(ex)) {
        return Ok(());
    }
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            collect(root, &entry?.path(), excluded, entries)?;
        }
    } else if metadata.is_file() {
        entries.insert(relative_key(root, path), Fingerprint::of(&metadata));
    }
    Ok(())
}

fn relative_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    format_version: u32,
    snapshot: Snapshot,
    /// blake3 over the file content with this field unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

impl SnapshotFile {
    fn compute_checksum(&self) -> Result<String, StoreError> {
        let copy = SnapshotFile {
            format_version: self.format_version,
            snapshot: self.snapshot.clone(),
            checksum: None,
        };
        let json = serde_json::to_string(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

/// The persisted gate deciding whether a rebuild has anything to do.
#[derive(Debug)]
pub struct SnapshotCache {
    layout: CacheLayout,
    root: PathBuf,
    tracked: Vec<PathBuf>,
    excluded: Vec<PathBuf>,
    pending: Option<Snapshot>,
    last_diff: Option<SnapshotDiff>,
}

impl SnapshotCache {
    /// `tracked` paths are absolute or relative to `root`; keys are stored relative to `root`.
    pub fn new(layout: CacheLayout, root: impl Into<PathBuf>, tracked: Vec<PathBuf>) -> Self {
        let root = root.into();
        let tracked = tracked.into_iter().map(|p| root.join(p)).collect();
        let excluded = vec![layout.root().to_path_buf()];
        Self {
            layout,
            root,
            tracked,
            excluded,
            pending: None,
            last_diff: None,
        }
    }

    /// Never fingerprint anything under `path` (output directories, for instance).
    #[must_use]
    pub fn exclude(mut self, path: impl AsRef<Path>) -> Self {
        self.excluded.push(self.root.join(path));
        self
    }

    pub fn capture(&self) -> Result<Snapshot, StoreError> {
        Snapshot::capture(&self.root, &self.tracked, &self.excluded)
    }

    /// The last committed snapshot. A missing, unreadable, outdated, or
    /// corrupted file reads as `None`, which forces the next run.
    pub fn committed(&self) -> Result<Option<Snapshot>, StoreError> {
        let path = self.layout.snapshot_file();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: SnapshotFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!("ignoring unreadable snapshot {}: {e}", path.display());
                return Ok(None);
            }
        };
        if file.format_version != SNAPSHOT_FORMAT_VERSION {
            debug!(
                "snapshot format {} != {SNAPSHOT_FORMAT_VERSION}, ignoring",
                file.format_version
            );
            return Ok(None);
        }
        if let Some(ref expected) = file.checksum {
            let actual = file.compute_checksum()?;
            if actual != *expected {
                warn!("snapshot checksum mismatch, forcing rebuild");
                return Ok(None);
            }
        }
        Ok(Some(file.snapshot))
    }

    /// Capture a fresh snapshot and hold it as pending. Returns `true` when
    /// there is work to do: no committed snapshot yet, or any entry was added,
    /// removed, or changed.
    pub fn lock(&mut self) -> Result<bool, StoreError> {
        let fresh = self.capture()?;
        let proceed = match self.committed()? {
            None => {
                debug!("no committed snapshot, {} files tracked", fresh.len());
                self.last_diff = None;
                true
            }
            Some(committed) => {
                let diff = fresh.diff_from(&committed);
                debug!(
                    "snapshot diff: {} added, {} modified, {} removed",
                    diff.added.len(),
                    diff.modified.len(),
                    diff.removed.len()
                );
                let changed = !diff.is_empty();
                self.last_diff = Some(diff);
                changed
            }
        };
        self.pending = Some(fresh);
        Ok(proceed)
    }

    /// Drop the pending snapshot; the committed baseline is untouched.
    pub fn unlock(&mut self) {
        self.pending = None;
    }

    /// Promote the pending snapshot to committed. No-op without a pending snapshot.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        let Some(snapshot) = self.pending.take() else {
            return Ok(());
        };
        let mut file = SnapshotFile {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot,
            checksum: None,
        };
        file.checksum = Some(file.compute_checksum()?);
        let content = serde_json::to_string_pretty(&file)?;

        let dir = self.layout.root();
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.layout.snapshot_file())
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(dir)?;
        debug!("committed snapshot of {} files", file.snapshot.len());
        Ok(())
    }

    /// Forget the committed snapshot so the next [`lock`](Self::lock) returns `true`.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(self.layout.snapshot_file()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-fingerprint the pending snapshot's entries under `dir`, so files a
    /// run wrote there itself are part of the baseline it commits. Entries
    /// outside `dir` keep the values captured by [`lock`](Self::lock).
    pub fn absorb(&mut self, dir: impl AsRef<Path>) -> Result<(), StoreError> {
        let dir = self.root.join(dir);
        let Some(pending) = self.pending.as_mut() else {
            return Ok(());
        };
        let fresh = Snapshot::capture(&self.root, std::slice::from_ref(&dir), &self.excluded)?;
        let root = &self.root;
        pending
            .entries
            .retain(|key, _| !root.join(key).starts_with(&dir));
        pending.entries.extend(fresh.entries);
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The diff computed by the last `lock`, when a committed baseline existed.
    pub fn last_diff(&self) -> Option<&SnapshotDiff> {
        self.last_diff.as_ref()
    }
}
