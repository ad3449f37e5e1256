//! Single-writer lock around the registry and identity store.
//!
//! Each invocation of the manager is a separate process, so the lock is a
//! file created with `create_new`. It records the holder's PID; a lock whose
//! holder has died, or which is older than [`STALE_AFTER`], is broken.
use crate::error::{Error, Result};
use crate::server::pid_is_alive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::{self, Instant};

/// Age after which a lock is considered abandoned regardless of holder.
pub const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Default time to wait for another invocation to finish.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A lock file being written has no contents yet; give it this long.
const UNREADABLE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl StateLock {
    /// Acquires the lock at `path`, waiting up to `timeout` for a live
    /// holder to release it.
    #[tracing::instrument(skip(path), fields(path = %path.display()))]
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match Self::try_create(path) {
                Ok(lock) => {
                    tracing::debug!("Acquired state lock");
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path) && break_stale(path)? {
                        continue;
                    }
                }
                Err(e) => {
                    return Err(Error::Persistence(format!(
                        "Failed to create lock {}: {}",
                        path.display(),
                        e
                    )));
                }
            }

            if Instant::now() >= deadline {
                let holder = read_info(path)
                    .map(|info| format!("PID {} since {}", info.pid, info.acquired_at))
                    .unwrap_or_else(|| "unknown holder".to_string());
                return Err(Error::Locked(holder));
            }
            time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let lock = Self {
            path: path.to_path_buf(),
        };

        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let body = serde_json::to_vec(&info).map_err(std::io::Error::other)?;
        file.write_all(&body)?;
        Ok(lock)
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %self.path.display(), "Failed to release state lock");
            }
        }
    }
}

/// Removes the lock at `path` if it is still stale.
///
/// Breakers serialize on a sibling guard file and re-check staleness while
/// holding it, so a lock re-acquired after another breaker removed the
/// stale one is never deleted. Returns whether the caller should retry
/// immediately.
fn break_stale(path: &Path) -> Result<bool> {
    let guard_path = guard_path(path);
    let _guard = match OpenOptions::new().write(true).create_new(true).open(&guard_path) {
        Ok(_) => BreakGuard { path: &guard_path },
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // A breaker that died mid-break leaves its guard behind
            if age(&guard_path).is_some_and(|age| age > UNREADABLE_GRACE) {
                tracing::warn!(guard = %guard_path.display(), "Removing abandoned lock guard");
                let _ = fs::remove_file(&guard_path);
            }
            return Ok(false);
        }
        Err(e) => {
            return Err(Error::Persistence(format!(
                "Failed to create {}: {}",
                guard_path.display(),
                e
            )));
        }
    };

    if !is_stale(path) {
        return Ok(true);
    }

    tracing::warn!("Breaking stale state lock");
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(Error::Persistence(format!(
            "Failed to remove stale lock {}: {}",
            path.display(),
            e
        ))),
    }
}

fn guard_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".break");
    path.with_file_name(name)
}

struct BreakGuard<'a> {
    path: &'a Path,
}

impl Drop for BreakGuard<'_> {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.path);
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let content = fs::read(path).ok()?;
    serde_json::from_slice(&content).ok()
}

fn age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn is_stale(path: &Path) -> bool {
    let age = age(path).unwrap_or_default();
    match read_info(path) {
        Some(info) => {
            (info.pid != std::process::id() && !pid_is_alive(info.pid)) || age > STALE_AFTER
        }
        None => age > UNREADABLE_GRACE,
    }
}
