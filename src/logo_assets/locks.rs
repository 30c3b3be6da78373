//! Per-logo mutation locks
//!
//! A reupload or delete of one id must not interleave with another mutation
//! of the same id, in this process or in another worker sharing the data
//! directory. Each id gets an async mutex for in-process callers and an
//! advisory lock file `{lock_dir}/{id}.lock` for everyone else.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, trace, warn};

use crate::errors::{RegistryError, RegistryResult};
use crate::models::LogoId;
use crate::utils::fs::FileLock;

/// Held lock on one id; released on drop
#[derive(Debug)]
pub struct IdLockGuard {
    _file_lock: FileLock,
    _local: OwnedMutexGuard<()>,
}

#[derive(Debug)]
pub struct IdLocks {
    dir: PathBuf,
    timeout: Duration,
    attempts: u32,
    local: Mutex<HashMap<LogoId, Arc<AsyncMutex<()>>>>,
}

impl IdLocks {
    pub fn new(dir: PathBuf, timeout: Duration, attempts: u32) -> Self {
        Self {
            dir,
            timeout,
            attempts,
            local: Mutex::new(HashMap::new()),
        }
    }

    fn local_mutex(&self, id: LogoId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop entries nobody is holding or waiting on
        locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        locks.entry(id).or_default().clone()
    }

    fn lock_file(&self, id: LogoId) -> PathBuf {
        self.dir.join(format!("{id}.lock"))
    }

    pub async fn lock(&self, id: LogoId) -> RegistryResult<IdLockGuard> {
        let local = self.local_mutex(id).lock_owned().await;

        let path = self.lock_file(id);
        let file_lock = FileLock::acquire(&path, self.timeout, self.attempts)
            .await
            .map_err(|e| RegistryError::io(&path, e))?
            .ok_or_else(|| RegistryError::LockTimeout {
                path: path.clone(),
                attempts: self.attempts.max(1),
            })?;

        trace!("Locked logo {}", id);
        Ok(IdLockGuard {
            _file_lock: file_lock,
            _local: local,
        })
    }

    /// Remove the lock file of a deleted id while still holding its guard.
    ///
    /// Ids are never reused, so once the delete is committed every later
    /// holder of this id, on any inode, finds no record and changes nothing.
    pub async fn retire(&self, id: LogoId, _guard: &IdLockGuard) {
        let path = self.lock_file(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed lock file {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove lock file {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_same_id_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let locks = Arc::new(IdLocks::new(dir.path().to_path_buf(), Duration::from_secs(5), 1));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (locks, inside, max_inside) = (locks.clone(), inside.clone(), max_inside.clone());
                tokio::spawn(async move {
                    let _guard = locks.lock(7).await.unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let locks = IdLocks::new(dir.path().to_path_buf(), Duration::from_millis(50), 1);

        let _one = locks.lock(1).await.unwrap();
        let _two = locks.lock(2).await.unwrap();
        assert!(dir.path().join("1.lock").exists());
        assert!(dir.path().join("2.lock").exists());
    }

    #[tokio::test]
    async fn test_retire_removes_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let locks = IdLocks::new(dir.path().to_path_buf(), Duration::from_millis(50), 1);

        let guard = locks.lock(3).await.unwrap();
        locks.retire(3, &guard).await;
        drop(guard);
        assert!(!dir.path().join("3.lock").exists());

        // Retiring twice is harmless and the id can still be locked
        let guard = locks.lock(3).await.unwrap();
        locks.retire(3, &guard).await;
        locks.retire(3, &guard).await;
    }

    #[tokio::test]
    async fn test_lock_held_elsewhere_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let locks = IdLocks::new(dir.path().to_path_buf(), Duration::from_millis(30), 1);

        let _foreign = FileLock::try_acquire(&dir.path().join("5.lock")).unwrap().unwrap();
        assert!(matches!(
            locks.lock(5).await,
            Err(RegistryError::LockTimeout { .. })
        ));
    }
}
