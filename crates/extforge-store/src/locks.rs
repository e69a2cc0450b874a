//! Cross-process command locks.
//!
//! One record file per command id under `locks/`. Creating the file with
//! `create_new` is the acquisition; removing it is the release. Cooperating
//! processes hold an `fs2` exclusive lock on `locks/.guard` while they inspect
//! or reclaim a record, so the check-then-reclaim step cannot interleave.

use crate::layout::CacheLayout;
use crate::StoreError;
use extforge_schema::CommandId;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Who holds a command lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockRecord {
    pub id: CommandId,
    pub pid: u32,
    /// Kernel start time of the holder, used to detect pid reuse.
    #[serde(default)]
    pub start_ticks: Option<u64>,
    pub acquired_at: String,
}

impl LockRecord {
    fn for_current_process(id: &CommandId) -> Self {
        let pid = std::process::id();
        Self {
            id: id.clone(),
            pid,
            start_ticks: process_start_ticks(pid),
            acquired_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// False only when the holder is provably gone.
    pub fn holder_alive(&self) -> bool {
        if !pid_alive(self.pid) {
            return false;
        }
        match (self.start_ticks, process_start_ticks(self.pid)) {
            (Some(recorded), Some(current)) => recorded == current,
            _ => true,
        }
    }

    /// True when this record was written by the running process.
    pub fn owned_by_current_process(&self) -> bool {
        let me = std::process::id();
        if self.pid != me {
            return false;
        }
        match (self.start_ticks, process_start_ticks(me)) {
            (Some(recorded), Some(current)) => recorded == current,
            _ => true,
        }
    }
}

/// Persistent named mutual exclusion keyed by [`CommandId`].
#[derive(Debug, Clone)]
pub struct LockService {
    layout: CacheLayout,
}

impl LockService {
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }

    /// Create the lock record for `id`. Returns `false` without waiting when a
    /// live holder already owns it. Records left by dead holders are reclaimed.
    pub fn try_acquire(&self, id: &CommandId) -> Result<bool, StoreError> {
        validate_lock_id(id)?;
        let _guard = GuardFile::lock(&self.layout)?;
        self.acquire_unguarded(id)
    }

    /// All-or-nothing acquisition: if any id is held, the ids acquired by
    /// this call are released again (in reverse order) and `false` is returned.
    pub fn try_acquire_all(&self, ids: &[CommandId]) -> Result<bool, StoreError> {
        for id in ids {
            validate_lock_id(id)?;
        }
        let _guard = GuardFile::lock(&self.layout)?;

        let mut acquired: Vec<&CommandId> = Vec::with_capacity(ids.len());
        for id in ids {
            match self.acquire_unguarded(id) {
                Ok(true) => acquired.push(id),
                Ok(false) => {
                    self.rollback(&acquired);
                    return Ok(false);
                }
                Err(e) => {
                    self.rollback(&acquired);
                    return Err(e);
                }
            }
        }
        Ok(true)
    }

    /// Acquire `ids` and return a guard that releases them on drop.
    pub fn acquire_guard(&self, ids: &[CommandId]) -> Result<Option<LockGuard>, StoreError> {
        if self.try_acquire_all(ids)? {
            Ok(Some(LockGuard {
                service: self.clone(),
                ids: ids.to_vec(),
            }))
        } else {
            Ok(None)
        }
    }

    /// Remove the lock record for `id`. Releasing an absent lock is not an error.
    pub fn release(&self, id: &CommandId) -> Result<(), StoreError> {
        validate_lock_id(id)?;
        let _guard = GuardFile::lock(&self.layout)?;
        remove_if_present(&self.layout.lock_path(id))
    }

    /// Remove the record for `id` only if this process wrote it. A record
    /// taken over by another process in the meantime is left alone.
    /// Returns whether a record was removed.
    pub fn release_owned(&self, id: &CommandId) -> Result<bool, StoreError> {
        validate_lock_id(id)?;
        let _guard = GuardFile::lock(&self.layout)?;
        let path = self.layout.lock_path(id);
        match read_record(&path)? {
            Some(record) if record.owned_by_current_process() => {
                remove_if_present(&path)?;
                debug!("released lock '{id}'");
                Ok(true)
            }
            Some(record) => {
                debug!("lock '{id}' now belongs to pid {}, leaving it", record.pid);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// The current record for `id`, if any. An unreadable record has no
    /// known holder and reads as `None`.
    pub fn holder(&self, id: &CommandId) -> Result<Option<LockRecord>, StoreError> {
        validate_lock_id(id)?;
        read_record(&self.layout.lock_path(id))
    }

    /// Whether any record file exists for `id`, readable or not.
    pub fn is_recorded(&self, id: &CommandId) -> Result<bool, StoreError> {
        validate_lock_id(id)?;
        Ok(self.layout.lock_path(id).exists())
    }

    fn acquire_unguarded(&self, id: &CommandId) -> Result<bool, StoreError> {
        let path = self.layout.lock_path(id);
        match create_record(&path, id) {
            Ok(()) => {
                debug!("acquired lock '{id}'");
                return Ok(true);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let existing = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<LockRecord>(&content).ok());
        match existing {
            Some(record) if record.holder_alive() => {
                debug!("lock '{id}' is held by pid {}", record.pid);
                Ok(false)
            }
            Some(record) => {
                warn!(
                    "reclaiming lock '{id}' from pid {} which is no longer running",
                    record.pid
                );
                remove_if_present(&path)?;
                create_record(&path, id)?;
                Ok(true)
            }
            None => {
                warn!("reclaiming lock '{id}' with an unreadable record");
                remove_if_present(&path)?;
                create_record(&path, id)?;
                Ok(true)
            }
        }
    }

    fn rollback(&self, acquired: &[&CommandId]) {
        for id in acquired.iter().rev() {
            if let Err(e) = remove_if_present(&self.layout.lock_path(id)) {
                warn!("failed to roll back lock '{id}': {e}");
            }
        }
    }
}

/// Releases its command locks when dropped.
#[derive(Debug)]
pub struct LockGuard {
    service: LockService,
    ids: Vec<CommandId>,
}

impl LockGuard {
    pub fn ids(&self) -> &[CommandId] {
        &self.ids
    }

    /// Let go of `id` early. The guard no longer releases it on drop.
    pub fn release(&mut self, id: &CommandId) -> Result<(), StoreError> {
        self.ids.retain(|held| held != id);
        self.service.release_owned(id).map(|_| ())
    }

    /// Take `id` back after [`LockGuard::release`]. Returns `false` when
    /// another process holds it now.
    pub fn reacquire(&mut self, id: &CommandId) -> Result<bool, StoreError> {
        if !self.service.try_acquire(id)? {
            return Ok(false);
        }
        if !self.ids.contains(id) {
            self.ids.push(id.clone());
        }
        Ok(true)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        for id in self.ids.iter().rev() {
            if let Err(e) = self.service.release_owned(id) {
                warn!("failed to release lock '{id}': {e}");
            }
        }
    }
}

/// Exclusive `fs2` lock on the guard file, released on drop.
struct GuardFile {
    file: File,
}

impl GuardFile {
    fn lock(layout: &CacheLayout) -> Result<Self, StoreError> {
        fs::create_dir_all(layout.locks_dir())?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(layout.locks_guard_file())?;
        file.lock_exclusive()
            .map_err(|e| StoreError::LockFailed(format!("locks guard: {e}")))?;
        Ok(Self { file })
    }
}

impl Drop for GuardFile {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Ids become file names, so they must be plain `[a-zA-Z0-9_-]` words.
fn validate_lock_id(id: &CommandId) -> Result<(), StoreError> {
    if id.is_empty()
        || id.len() > 64
        || !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(StoreError::InvalidLockId(id.to_string()));
    }
    Ok(())
}

fn create_record(path: &Path, id: &CommandId) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let record = LockRecord::for_current_process(id);
    let written = serde_json::to_vec_pretty(&record)
        .map_err(std::io::Error::other)
        .and_then(|content| file.write_all(&content))
        .and_then(|()| file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

fn read_record(path: &Path) -> Result<Option<LockRecord>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str(&content) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!("unreadable lock record {}: {e}", path.display());
            Ok(None)
        }
    }
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[allow(unsafe_code)]
fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission check.
    let ret = unsafe { libc::kill(pid, 0) };
    if ret == 0 {
        return true;
    }
    // EPERM means the process exists but belongs to someone else.
    std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

/// Field 22 of `/proc/<pid>/stat`. `None` where procfs is unavailable.
fn process_start_ticks(pid: u32) -> Option<u64> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // The command name may contain spaces and parentheses; fields resume after the last ')'.
    let rest = stat.get(stat.rfind(')')? + 1..)?;
    rest.split_whitespace().nth(19)?.parse().ok()
}
