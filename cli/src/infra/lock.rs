//! Advisory inter-process lock for the inventory file.
//!
//! The lock is a sibling file created with `O_EXCL`; whoever creates it
//! holds the lock. Contending processes retry with exponential backoff.
//! A lock file older than the staleness ceiling is treated as abandoned
//! (crashed holder) and reclaimed.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::domain::error::LockError;

/// Retry/staleness policy for lock acquisition.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Bounded number of creation attempts before giving up.
    pub attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub initial_delay: Duration,
    /// Age after which a held lock is considered abandoned.
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_delay: Duration::from_millis(25),
            stale_after: Duration::from_secs(30),
        }
    }
}

/// Held advisory lock. Released on drop, even if the guarded mutation
/// returns early with an error.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Best effort — a leftover file is reclaimed via the staleness
        // ceiling by the next acquirer.
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire the advisory lock at `path`.
///
/// # Errors
///
/// Returns `LockError::Busy` once the retry budget is exhausted, or
/// `LockError::Io` if the lock file cannot be created for a reason other
/// than contention.
pub fn acquire(path: &Path, opts: &LockOptions) -> Result<LockGuard, LockError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut delay = opts.initial_delay;
    for attempt in 0..opts.attempts {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => {
                // Holder pid recorded for operator debugging only.
                let _ = std::io::Write::write_all(
                    &mut &file,
                    format!("{}\n", std::process::id()).as_bytes(),
                );
                return Ok(LockGuard {
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if lock_is_stale(path, opts.stale_after) {
                    let _ = std::fs::remove_file(path);
                    continue; // retry immediately after reclaiming
                }
                if attempt + 1 < opts.attempts {
                    std::thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                }
            }
            Err(e) => return Err(LockError::Io(e)),
        }
    }
    Err(LockError::Busy {
        attempts: opts.attempts,
    })
}

fn lock_is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        // Holder released between our open and this check.
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > stale_after)
        .unwrap_or(false)
}
