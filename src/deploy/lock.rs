// ABOUTME: Run lock preventing concurrent runs against the same project.
// ABOUTME: Uses atomic hard-link creation with lock info stored in the state directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostics, Warning};
use crate::types::ComponentName;

use super::DeployError;

/// Information about who holds a run lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Command the holder is running.
    pub command: String,
    /// Distinguishes acquisitions made by one process.
    #[serde(default)]
    pub token: usize,
}

static ATTEMPT: AtomicUsize = AtomicUsize::new(0);

/// A lock-break guard older than this was left by a crashed run.
const BREAK_GUARD_TTL: Duration = Duration::from_secs(60);

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(command: &str) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            command: command.to_string(),
            token: ATTEMPT.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    /// Path to the lock file for a project.
    pub fn lock_path(state_dir: &Path, project: &ComponentName) -> PathBuf {
        state_dir.join(format!("{project}.lock"))
    }
}

/// A held run lock that releases on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl RunLock {
    /// Acquire the run lock for `project`.
    ///
    /// The lock file is written in full under a temporary name and then
    /// hard-linked into place, so it appears atomically and never half-written.
    /// Stale locks (>1 hour) and, with `force`, live locks are broken with a warning.
    /// Breaking happens under a separate guard file, and only if the lock still
    /// holds what was judged breakable; a lock taken meanwhile is left alone.
    pub fn acquire(
        state_dir: &Path,
        project: &ComponentName,
        command: &str,
        force: bool,
        diag: &mut Diagnostics,
    ) -> Result<Self, DeployError> {
        std::fs::create_dir_all(state_dir).map_err(|e| {
            DeployError::Lock(format!(
                "failed to create state directory {}: {e}",
                state_dir.display()
            ))
        })?;

        let path = LockInfo::lock_path(state_dir, project);
        let info = LockInfo::new(command);

        if try_create(&path, &info)? {
            return Ok(Self::held(path, info));
        }

        let existing = read_lock(&path);
        match &existing {
            Some(existing) if !force && !existing.is_stale() => {
                return Err(held_by(existing, &path));
            }
            _ => {}
        }

        let guard_path = path.with_extension("lock.break");
        let Some(_guard) = BreakGuard::acquire(&guard_path, &info)? else {
            return Err(contended(&path));
        };

        // someone may have released or re-taken the lock since it was read
        if read_lock(&path) != existing {
            return if try_create(&path, &info)? {
                Ok(Self::held(path, info))
            } else {
                Err(contended(&path))
            };
        }

        match &existing {
            Some(existing) => {
                let why = if force { "Breaking" } else { "Auto-breaking stale" };
                diag.warn(Warning::lock_broken(format!(
                    "{why} lock held by {} (pid {}) since {}",
                    existing.holder, existing.pid, existing.started_at
                )));
            }
            None => {
                diag.warn(Warning::lock_broken("Lock info unreadable, breaking lock"));
            }
        }

        tracing::debug!("Removing stale/forced lock at {}", path.display());
        if let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            return Err(DeployError::Lock(format!("failed to remove lock: {e}")));
        }

        if try_create(&path, &info)? {
            Ok(Self::held(path, info))
        } else {
            Err(contended(&path))
        }
    }

    fn held(path: PathBuf, info: LockInfo) -> Self {
        tracing::debug!("Acquired run lock {}", path.display());
        Self {
            path,
            info,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release the lock. A lock broken and re-taken by another run is left in place.
    pub fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        if read_lock(&self.path).as_ref() != Some(&self.info) {
            tracing::warn!("run lock {} was taken over; not removing", self.path.display());
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeployError::Lock(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.released && read_lock(&self.path).as_ref() == Some(&self.info) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Exclusive right to break the run lock, held for the duration of one break.
struct BreakGuard {
    path: PathBuf,
}

impl BreakGuard {
    /// `None` when another run is breaking the lock right now.
    fn acquire(path: &Path, info: &LockInfo) -> Result<Option<Self>, DeployError> {
        if try_create(path, info)? {
            return Ok(Some(Self {
                path: path.to_path_buf(),
            }));
        }

        let abandoned = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > BREAK_GUARD_TTL);
        if abandoned {
            tracing::debug!("Removing abandoned lock-break guard {}", path.display());
            let _ = std::fs::remove_file(path);
            if try_create(path, info)? {
                return Ok(Some(Self {
                    path: path.to_path_buf(),
                }));
            }
        }
        Ok(None)
    }
}

impl Drop for BreakGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn held_by(info: &LockInfo, path: &Path) -> DeployError {
    DeployError::ConcurrentRunInProgress {
        holder: info.holder.clone(),
        pid: info.pid,
        started_at: info.started_at,
        lock_path: path.to_path_buf(),
    }
}

/// Another run won the lock while this one tried to break it.
fn contended(path: &Path) -> DeployError {
    match read_lock(path) {
        Some(info) => held_by(&info, path),
        None => DeployError::Lock("lock acquired by another process during break".to_string()),
    }
}

/// Returns false when the lock file already exists.
fn try_create(path: &Path, info: &LockInfo) -> Result<bool, DeployError> {
    let json = serde_json::to_string(info)
        .map_err(|e| DeployError::Lock(format!("failed to serialize lock: {e}")))?;

    let attempt = ATTEMPT.fetch_add(1, Ordering::Relaxed);
    let staging = path.with_extension(format!("lock.{}.{attempt}", info.pid));
    std::fs::write(&staging, json)
        .map_err(|e| DeployError::Lock(format!("failed to write lock: {e}")))?;

    let linked = std::fs::hard_link(&staging, path);
    let _ = std::fs::remove_file(&staging);

    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(DeployError::Lock(format!("failed to acquire lock: {e}"))),
    }
}

fn read_lock(path: &Path) -> Option<LockInfo> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
