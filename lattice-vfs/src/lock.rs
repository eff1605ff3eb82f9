use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::sync::{Mutex, OnceLock};

use lattice_error::{lattice_err, LatticeResult};

use crate::uri::Uri;

/// Process-wide reference-counted file locks, keyed by URI.
///
/// The first acquirer of a URI takes the OS advisory lock; further holders
/// only bump a counter, and the last release drops the OS lock. The mutex
/// guards exactly the counter-map update plus the OS lock call. Handles
/// are the only public surface; dropping the last handle releases the
/// lock.
#[derive(Debug, Default)]
pub struct FileLockService {
    locks: Mutex<HashMap<String, LockEntry>>,
}

#[derive(Debug)]
struct LockEntry {
    count: u64,
    // Held open for the lifetime of the lock; object-store URIs have no
    // OS-level lock.
    file: Option<File>,
}

/// A held file lock. Dropping it releases one reference.
#[derive(Debug)]
pub struct FileLockHandle<'a> {
    service: &'a FileLockService,
    key: String,
}

impl FileLockService {
    /// The process-wide service.
    pub fn global() -> &'static FileLockService {
        static GLOBAL: OnceLock<FileLockService> = OnceLock::new();
        GLOBAL.get_or_init(FileLockService::default)
    }

    /// Creates an isolated service; most callers want
    /// [`FileLockService::global`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock on `uri`, shared or exclusive. Repeated acquires
    /// of a held URI only bump the reference count, mirroring the
    /// process-wide exclusive-lock semantics.
    pub fn acquire(&self, uri: &Uri, shared: bool) -> LatticeResult<FileLockHandle<'_>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| lattice_err!(Vfs: "file lock registry poisoned"))?;
        let key = uri.to_string();
        if let Some(entry) = locks.get_mut(&key) {
            entry.count += 1;
            return Ok(FileLockHandle { service: self, key });
        }

        let file = if uri.is_file() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(uri.to_path())?;
            if shared {
                file.lock_shared()?;
            } else {
                file.lock()?;
            }
            Some(file)
        } else {
            None
        };
        locks.insert(key.clone(), LockEntry { count: 1, file });
        Ok(FileLockHandle { service: self, key })
    }

    /// Number of live references on `uri`.
    pub fn active(&self, uri: &Uri) -> u64 {
        self.locks
            .lock()
            .map(|locks| locks.get(uri.as_str()).map_or(0, |e| e.count))
            .unwrap_or(0)
    }

    fn release(&self, key: &str) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        let Some(entry) = locks.get_mut(key) else {
            log::warn!("released unknown file lock {key}");
            return;
        };
        entry.count -= 1;
        if entry.count > 0 {
            return;
        }
        if let Some(entry) = locks.remove(key) {
            if let Some(file) = entry.file {
                if let Err(e) = file.unlock() {
                    log::warn!("failed to unlock {key}: {e}");
                }
            }
        }
    }
}

impl Drop for FileLockHandle<'_> {
    fn drop(&mut self) {
        self.service.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_uri(dir: &tempfile::TempDir) -> Uri {
        Uri::try_from(dir.path().join("__lock").as_path()).unwrap()
    }

    #[test]
    fn shared_acquires_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let service = FileLockService::new();
        let uri = lock_uri(&dir);

        let a = service.acquire(&uri, true).unwrap();
        let b = service.acquire(&uri, true).unwrap();
        assert_eq!(service.active(&uri), 2);

        drop(a);
        assert_eq!(service.active(&uri), 1);
        drop(b);
        assert_eq!(service.active(&uri), 0);
    }

    #[test]
    fn reacquire_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let service = FileLockService::new();
        let uri = lock_uri(&dir);

        let a = service.acquire(&uri, false).unwrap();
        drop(a);
        let b = service.acquire(&uri, false).unwrap();
        assert_eq!(service.active(&uri), 1);
        drop(b);
    }

    #[test]
    fn non_file_uris_lock_in_name_only() {
        let service = FileLockService::new();
        let uri = Uri::new("s3://bucket/array/__lock").unwrap();
        let a = service.acquire(&uri, true).unwrap();
        assert_eq!(service.active(&uri), 1);
        drop(a);
        assert_eq!(service.active(&uri), 0);
    }

    #[test]
    fn global_service_is_a_singleton() {
        assert!(std::ptr::eq(
            FileLockService::global(),
            FileLockService::global()
        ));
    }
}
