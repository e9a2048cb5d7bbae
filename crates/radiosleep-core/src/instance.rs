//! Single-instance record.
//!
//! The record is a plain-text file holding the owning daemon's pid followed
//! by a newline. A record whose pid no longer names a live process is stale
//! and is treated as absent.
//!
//! Every check-and-modify of the record happens under an exclusive `flock`
//! on a sibling `.lock` file, and a claim publishes a fully written temp file
//! with `hard_link`. Readers never see a partially written record, and a
//! stale-record removal cannot delete a claim made after its check.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Errors from claiming or releasing the instance record.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("another instance is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("failed to write instance record {path}: {source}")]
    RecordWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove instance record {path}: {source}")]
    RecordRemove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to lock instance record {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Existence probe: signal 0 to `pid`.
///
/// `EPERM` means the process exists but belongs to another user, which for
/// our purposes is not an instance we own, so it reads as not alive.
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    kill(Pid::from_raw(raw), None).is_ok()
}

/// Read the pid stored at `path`. Missing or unparsable records read as `None`.
pub fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse().ok()
}

/// What the record at a path currently says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstanceStatus {
    Running { pid: u32 },
    Stale { pid: u32 },
    NotRunning,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Running { pid } => write!(f, "running (pid {pid})"),
            InstanceStatus::Stale { pid } => write!(f, "not running (stale record for pid {pid})"),
            InstanceStatus::NotRunning => write!(f, "not running"),
        }
    }
}

/// Combine "record exists" with a liveness probe of the recorded pid.
pub fn probe(path: &Path) -> InstanceStatus {
    match read_pid(path) {
        Some(pid) if is_alive(pid) => InstanceStatus::Running { pid },
        Some(pid) => InstanceStatus::Stale { pid },
        None => InstanceStatus::NotRunning,
    }
}

/// Remove the record at `path` if it is stale. Returns the status observed
/// before any removal.
pub fn clear_stale(path: &Path) -> Result<InstanceStatus, InstanceError> {
    let status = probe(path);
    if !matches!(status, InstanceStatus::Stale { .. }) {
        return Ok(status);
    }

    let _lock = lock_record(path)?;
    // A claimant may have replaced the record since the unlocked probe.
    let status = probe(path);
    if let InstanceStatus::Stale { pid } = status {
        remove_record(path)?;
        info!(pid = %pid, path = %path.display(), "Removed stale instance record");
    }
    Ok(status)
}

/// Remove the record at `path` only if it still names `pid`. Returns whether
/// a record was removed.
pub fn remove_if_recorded(path: &Path, pid: u32) -> Result<bool, InstanceError> {
    if read_pid(path) != Some(pid) {
        return Ok(false);
    }

    let _lock = lock_record(path)?;
    if read_pid(path) != Some(pid) {
        return Ok(false);
    }
    remove_record(path)?;
    Ok(true)
}

fn remove_record(path: &Path) -> Result<(), InstanceError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(InstanceError::RecordRemove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Take the exclusive lock that serializes changes to the record at `path`.
/// Blocks while another process holds it. The lock file itself is never
/// removed.
fn lock_record(path: &Path) -> Result<Flock<File>, InstanceError> {
    let lock_path = sibling(path, ".lock");
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| InstanceError::Lock {
            path: lock_path.clone(),
            source,
        })?;
    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| InstanceError::Lock {
        path: lock_path,
        source: io::Error::from(errno),
    })
}

/// Write `pid` to a private temp file, then link it into place. Fails with
/// `AlreadyExists` if a record is present.
fn publish_record(path: &Path, pid: u32) -> io::Result<()> {
    let tmp = sibling(path, &format!(".{pid}.tmp"));
    let result = write_and_link(&tmp, path, pid);
    let _ = fs::remove_file(&tmp);
    result
}

fn write_and_link(tmp: &Path, path: &Path, pid: u32) -> io::Result<()> {
    let mut file = File::create(tmp)?;
    writeln!(file, "{pid}")?;
    file.sync_all()?;
    fs::hard_link(tmp, path)
}

/// The claimed instance record, held for the daemon's lifetime.
///
/// Dropping the lock removes the record on a best-effort basis; call
/// [`InstanceLock::release`] to observe removal errors.
#[derive(Debug)]
pub struct InstanceLock {
    pid: u32,
    path: PathBuf,
    started_at: SystemTime,
    released: bool,
}

impl InstanceLock {
    /// Claim `path` for the current process.
    ///
    /// A live recorded pid fails with [`InstanceError::AlreadyRunning`] and
    /// leaves the record untouched. A stale or unreadable record is replaced.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, InstanceError> {
        let path = path.into();
        let pid = std::process::id();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| InstanceError::RecordWrite {
                path: path.clone(),
                source,
            })?;
        }

        let _lock = lock_record(&path)?;
        match read_pid(&path) {
            Some(existing) if existing != pid && is_alive(existing) => {
                warn!(pid = %existing, path = %path.display(), "Live instance detected");
                return Err(InstanceError::AlreadyRunning { pid: existing });
            }
            recorded if path.exists() => {
                debug!(recorded = ?recorded, path = %path.display(), "Replacing stale instance record");
                remove_record(&path)?;
            }
            _ => {}
        }

        if let Err(source) = publish_record(&path, pid) {
            return Err(InstanceError::RecordWrite { path, source });
        }
        info!(pid = %pid, path = %path.display(), "Instance record written");
        Ok(Self {
            pid,
            path,
            started_at: SystemTime::now(),
            released: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Remove the record, unless another process has since claimed it.
    pub fn release(mut self) -> Result<(), InstanceError> {
        self.released = true;
        self.remove_if_owned()
    }

    fn remove_if_owned(&self) -> Result<(), InstanceError> {
        if remove_if_recorded(&self.path, self.pid)? {
            info!(path = %self.path.display(), "Instance record removed");
        } else {
            match read_pid(&self.path) {
                Some(other) => {
                    warn!(pid = %other, path = %self.path.display(), "Instance record owned by another process, leaving it");
                }
                None => debug!(path = %self.path.display(), "Instance record already gone"),
            }
        }
        Ok(())
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.remove_if_owned()
        {
            warn!(error = %e, "Failed to remove instance record on drop");
        }
    }
}
