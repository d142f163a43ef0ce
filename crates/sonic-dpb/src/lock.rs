//! Advisory per-port breakout lock.
//!
//! Two breakout runs touching the same parent port must not interleave.
//! CONFIG_DB offers no lock primitive, so runs coordinate through an
//! exclusive `flock` on a per-port file in a shared directory. The kernel
//! drops the lock when its holder exits, so a killed run never leaves a
//! lock behind. The file records the holder and a lease expiry for
//! diagnostics; the lease is never used to take a lock from a live holder.

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DpbError, DpbResult};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Lock holder information, stored in the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    /// Unique lock token
    pub token: String,
    /// Owning process ID
    pub pid: u32,
    /// Acquisition timestamp
    pub acquired_at: u64,
    /// Lease expiry timestamp
    pub expires_at: u64,
}

impl LockHolder {
    fn new(ttl_secs: u64) -> Self {
        let now = now_secs();
        Self {
            token: Uuid::new_v4().to_string(),
            pid: std::process::id(),
            acquired_at: now,
            expires_at: now.saturating_add(ttl_secs),
        }
    }

    /// Check if the lease is still valid
    pub fn is_valid(&self) -> bool {
        now_secs() < self.expires_at
    }
}

/// A held breakout lock. Released on drop.
#[derive(Debug)]
pub struct BreakoutLock {
    path: PathBuf,
    holder: LockHolder,
    file: Flock<File>,
}

impl BreakoutLock {
    /// Acquires the lock for `port` in `dir`.
    ///
    /// `port` must be a plain file name; anything that would resolve
    /// outside `dir` is rejected.
    pub fn acquire(dir: impl AsRef<Path>, port: &str, ttl_secs: u64) -> DpbResult<Self> {
        if port.is_empty() || Path::new(port).file_name() != Some(OsStr::new(port)) {
            return Err(DpbError::UnknownPort {
                port: port.to_string(),
            });
        }

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("dpb-{}.lock", port));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut file = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => file,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                let owner = match Self::read_holder(&path) {
                    Some(holder) if holder.is_valid() => {
                        format!("pid {} until {}", holder.pid, holder.expires_at)
                    }
                    Some(holder) => {
                        warn!(
                            port = %port,
                            "Breakout lock held by pid {} past its lease ({})",
                            holder.pid, holder.expires_at
                        );
                        format!("pid {} (lease expired at {})", holder.pid, holder.expires_at)
                    }
                    None => "a concurrent run".to_string(),
                };
                return Err(DpbError::LockHeld {
                    port: port.to_string(),
                    owner,
                });
            }
            Err((_, errno)) => return Err(io::Error::from(errno).into()),
        };

        // A clean release empties the file; content left over means the
        // previous holder died while holding the lock.
        if let Some(previous) = Self::read_holder(&path) {
            warn!(
                port = %port,
                "Previous breakout run (pid {}) did not release its lock",
                previous.pid
            );
        }

        let holder = LockHolder::new(ttl_secs);
        let content =
            serde_json::to_vec(&holder).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&content)?;
        file.sync_data()?;

        info!(port = %port, path = %path.display(), "Acquired breakout lock");
        Ok(Self { path, holder, file })
    }

    fn read_holder(path: &Path) -> Option<LockHolder> {
        let content = fs::read(path).ok()?;
        serde_json::from_slice(&content).ok()
    }

    /// Returns the holder information.
    pub fn holder(&self) -> &LockHolder {
        &self.holder
    }

    /// Returns the lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BreakoutLock {
    fn drop(&mut self) {
        // The file stays: unlinking it would let a waiter lock a stale inode.
        match self.file.set_len(0) {
            Ok(()) => debug!("Released breakout lock {}", self.path.display()),
            Err(e) => warn!("Failed to clear breakout lock {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_holder(path: &Path, holder: &LockHolder) {
        fs::write(path, serde_json::to_vec(holder).unwrap()).unwrap();
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();

        let lock = BreakoutLock::acquire(dir.path(), "Ethernet0", 60).unwrap();
        assert!(lock.path().exists());
        assert_eq!(lock.holder().pid, std::process::id());
        assert!(lock.holder().is_valid());
        assert_eq!(
            BreakoutLock::read_holder(lock.path()).as_ref(),
            Some(lock.holder())
        );

        let path = lock.path().to_path_buf();
        drop(lock);
        assert!(BreakoutLock::read_holder(&path).is_none());
        assert!(BreakoutLock::acquire(dir.path(), "Ethernet0", 60).is_ok());
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();

        let _lock = BreakoutLock::acquire(dir.path(), "Ethernet0", 60).unwrap();
        let second = BreakoutLock::acquire(dir.path(), "Ethernet0", 60);
        assert!(matches!(second, Err(DpbError::LockHeld { .. })));

        // Other ports are independent.
        assert!(BreakoutLock::acquire(dir.path(), "Ethernet4", 60).is_ok());
    }

    #[test]
    fn test_expired_lease_does_not_free_a_held_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock = BreakoutLock::acquire(dir.path(), "Ethernet0", 60).unwrap();

        let expired = LockHolder {
            token: lock.holder().token.clone(),
            pid: lock.holder().pid,
            acquired_at: 0,
            expires_at: 1,
        };
        write_holder(lock.path(), &expired);

        match BreakoutLock::acquire(dir.path(), "Ethernet0", 60) {
            Err(DpbError::LockHeld { owner, .. }) => assert!(owner.contains("lease expired")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_leftover_holder_of_dead_run_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dpb-Ethernet0.lock");
        let stale = LockHolder {
            token: "old".to_string(),
            pid: 1,
            acquired_at: 0,
            expires_at: 1,
        };
        write_holder(&path, &stale);

        let lock = BreakoutLock::acquire(dir.path(), "Ethernet0", 60).unwrap();
        assert_ne!(lock.holder().token, "old");
        assert_eq!(BreakoutLock::read_holder(&path).unwrap().token, lock.holder().token);
    }

    #[test]
    fn test_garbage_lock_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dpb-Ethernet0.lock"), b"not json").unwrap();

        assert!(BreakoutLock::acquire(dir.path(), "Ethernet0", 60).is_ok());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let dir = tempfile::tempdir().unwrap();

        let lock = BreakoutLock::acquire(dir.path(), "Ethernet0", u64::MAX).unwrap();
        assert_eq!(lock.holder().expires_at, u64::MAX);
        assert!(lock.holder().is_valid());
    }

    #[test]
    fn test_port_must_be_a_plain_name() {
        let dir = tempfile::tempdir().unwrap();

        for port in ["../Ethernet0", "Ethernet0/x", "..", ""] {
            assert!(
                matches!(
                    BreakoutLock::acquire(dir.path(), port, 60),
                    Err(DpbError::UnknownPort { .. })
                ),
                "{:?}",
                port
            );
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
