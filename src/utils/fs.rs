//! Atomic file writes and advisory cross-process locks
//!
//! Every durable write in the crate goes through [`write_atomic`]: the bytes
//! land in a temporary file in the destination directory, are flushed to disk,
//! and are then renamed over the target. Readers therefore see either the old
//! or the new contents, never a torn write.
//!
//! [`FileLock`] wraps an exclusive `flock`-style lock taken through `fs4`. The
//! lock is released when the guard is dropped.

use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Interval between non-blocking lock attempts
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Write `bytes` to `path` atomically, creating parent directories as needed
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Held exclusive lock on a lock file
#[derive(Debug)]
pub struct FileLock {
    // Closing the descriptor releases the lock
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Try once to take the lock; `Ok(None)` when another holder has it
    pub fn try_acquire(path: &Path) -> io::Result<Option<FileLock>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(FileLock {
                _file: file,
                path: path.to_path_buf(),
            })),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Poll for the lock for up to `timeout`, repeating the whole wait up to
    /// `attempts` times. Returns `Ok(None)` once every attempt has timed out.
    pub async fn acquire(
        path: &Path,
        timeout: Duration,
        attempts: u32,
    ) -> io::Result<Option<FileLock>> {
        let attempts = attempts.max(1);

        for attempt in 1..=attempts {
            let deadline = Instant::now() + timeout;
            loop {
                if let Some(lock) = Self::try_acquire(path)? {
                    if attempt > 1 {
                        debug!("Acquired lock {} on attempt {}", path.display(), attempt);
                    }
                    return Ok(Some(lock));
                }
                if Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(LOCK_POLL_INTERVAL).await;
            }
            warn!(
                "Lock {} still held after {:?} (attempt {}/{})",
                path.display(),
                timeout,
                attempt,
                attempts
            );
        }

        Ok(None)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        write_atomic(&path, b"first").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        // No temporary files are left behind
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_try_acquire_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.lock");

        let held = FileLock::try_acquire(&path).unwrap();
        assert!(held.is_some());
        assert!(FileLock::try_acquire(&path).unwrap().is_none());

        drop(held);
        assert!(FileLock::try_acquire(&path).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_times_out_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.lock");

        let _held = FileLock::try_acquire(&path).unwrap().unwrap();
        let result = FileLock::acquire(&path, Duration::from_millis(50), 2)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2.lock");

        let held = FileLock::try_acquire(&path).unwrap().unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            drop(held);
        });

        let lock = FileLock::acquire(&path, Duration::from_secs(2), 1)
            .await
            .unwrap();
        assert!(lock.is_some());
        release.await.unwrap();
    }
}
