// src/lock.rs

//! Exclusive lock around history-mutating commands
//!
//! Replaying a transaction updates the persisted group state and appends to
//! the history, so only one process may do it at a time. The lock is an
//! `flock(LOCK_EX)` on a lock file with the holder's pid written next to it.
//!
//! Re-entrance is explicit: every successful [`SystemLock::acquire`] hands
//! out a [`LockToken`] that must be given back to [`SystemLock::release`].
//! Tokens are released in reverse order of acquisition, and a token minted
//! for another thread is refused.
//!
//! ```ignore
//! let mut lock = SystemLock::new("/var/lib/reprise/reprise.lock");
//! let token = lock.acquire()?;
//! // ... replay ...
//! lock.release(token)?;
//! ```

use crate::error::{Error, Result};
use fs2::FileExt;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Proof of one level of lock ownership
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a lock token has to be handed back to SystemLock::release"]
pub struct LockToken {
    owner: ThreadId,
    depth: u32,
}

impl LockToken {
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// File-backed exclusive lock
pub struct SystemLock {
    path: PathBuf,
    retries: u32,
    backoff: Duration,
    file: Option<File>,
    owner: Option<ThreadId>,
    depth: u32,
}

impl SystemLock {
    /// Default lock path, next to the default database
    pub const DEFAULT_PATH: &'static str = "/var/lib/reprise/reprise.lock";

    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_retries(path, 5, Duration::from_millis(100))
    }

    /// Try the lock `retries` times, sleeping `backoff * 2^attempt` in between
    pub fn with_retries<P: AsRef<Path>>(path: P, retries: u32, backoff: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            retries: retries.max(1),
            backoff,
            file: None,
            owner: None,
            depth: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn pid_path(lock_path: &Path) -> PathBuf {
        lock_path.with_extension("pid")
    }

    /// Whether this instance currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.depth > 0
    }

    /// Take the lock, or one more level of it if this thread already holds it
    pub fn acquire(&mut self) -> Result<LockToken> {
        let current = thread::current().id();
        match self.owner {
            Some(owner) if owner == current => {
                self.depth += 1;
                debug!("Re-entered lock at {:?} (depth {})", self.path, self.depth);
                return Ok(LockToken {
                    owner: current,
                    depth: self.depth,
                });
            }
            Some(_) => {
                return Err(Error::LockError(format!(
                    "Lock at {} is held by another thread",
                    self.path.display()
                )));
            }
            None => {}
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)?;

        let mut last_error = None;
        for attempt in 0..self.retries {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt + 1 < self.retries {
                        let delay = self.backoff * (1u32 << attempt.min(16));
                        debug!(
                            "Lock at {:?} busy, retrying in {:?} (attempt {})",
                            self.path,
                            delay,
                            attempt + 1
                        );
                        thread::sleep(delay);
                    }
                }
            }
        }

        if let Some(e) = last_error {
            let holder = Self::holder_pid(&self.path)
                .map(|pid| format!(" (held by pid {})", pid))
                .unwrap_or_default();
            return Err(Error::LockError(format!(
                "Failed to acquire lock at {} after {} attempts{}: {}",
                self.path.display(),
                self.retries,
                holder,
                e
            )));
        }

        self.reclaim_stale_pid();
        fs::write(Self::pid_path(&self.path), std::process::id().to_string())?;

        info!("Acquired lock at {:?}", self.path);
        self.file = Some(file);
        self.owner = Some(current);
        self.depth = 1;
        Ok(LockToken {
            owner: current,
            depth: 1,
        })
    }

    /// Give back the most recently acquired level of the lock
    pub fn release(&mut self, token: LockToken) -> Result<()> {
        if self.owner != Some(token.owner) {
            return Err(Error::LockError(format!(
                "Lock token for {} belongs to another owner",
                self.path.display()
            )));
        }
        if token.depth != self.depth {
            return Err(Error::LockError(format!(
                "Lock token depth {} does not match current depth {} for {}",
                token.depth,
                self.depth,
                self.path.display()
            )));
        }

        self.depth -= 1;
        if self.depth == 0 {
            self.unlock()?;
        }
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        self.owner = None;
        if let Some(file) = self.file.take() {
            let _ = fs::remove_file(Self::pid_path(&self.path));
            file.unlock()
                .map_err(|e| Error::LockError(format!("Failed to release lock: {}", e)))?;
            info!("Released lock at {:?}", self.path);
        }
        Ok(())
    }

    /// A pid file left behind by a process that no longer exists
    fn reclaim_stale_pid(&self) {
        if let Some(pid) = Self::holder_pid(&self.path)
            && !pid_alive(pid)
        {
            warn!("Reclaiming lock at {:?} left by dead process {}", self.path, pid);
        }
    }

    /// Pid recorded by the current or last holder
    pub fn holder_pid<P: AsRef<Path>>(lock_path: P) -> Option<i32> {
        fs::read_to_string(Self::pid_path(lock_path.as_ref()))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Whether any process holds the lock at `path`
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let Ok(file) = File::open(path.as_ref()) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }
}

impl Drop for SystemLock {
    fn drop(&mut self) {
        if self.file.is_some() {
            if self.depth > 0 {
                warn!(
                    "Lock at {:?} dropped with {} unreleased tokens",
                    self.path, self.depth
                );
            }
            let _ = self.unlock();
        }
    }
}

fn pid_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        // EPERM: exists but belongs to someone else
        Err(_) => true,
    }
}
