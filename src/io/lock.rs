use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Advisory lock serializing catalog writes between gpxdb processes.
///
/// Uses flock (Unix) on a `<catalog>.lock` file beside the catalog.
pub struct CatalogLock {
    _file: File,
    path: PathBuf,
}

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not acquire lock on {path}: another gpxdb process may be writing")]
    Timeout { path: PathBuf },
}

/// Lock file path for a catalog file.
pub fn lock_path(catalog_path: &Path) -> PathBuf {
    let mut name = catalog_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    catalog_path.with_file_name(name)
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long CLI commands wait for another gpxdb process
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

impl CatalogLock {
    /// Acquire the lock for `catalog_path`, waiting up to `timeout`.
    pub fn acquire(catalog_path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = lock_path(catalog_path);
        let create_error = |source| LockError::CreateError {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(create_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(create_error)?;

        let deadline = Instant::now() + timeout;
        while !try_lock(&file).map_err(create_error)? {
            if Instant::now() >= deadline {
                return Err(LockError::Timeout { path });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        log::debug!("locked {}", path.display());
        Ok(CatalogLock { _file: file, path })
    }

    pub fn acquire_default(catalog_path: &Path) -> Result<Self, LockError> {
        Self::acquire(catalog_path, DEFAULT_LOCK_TIMEOUT)
    }
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        // Closing the handle releases the flock. The file itself stays: a
        // waiter may already hold a handle to it, and unlinking would let a
        // newcomer lock a fresh file at the same path.
        log::debug!("unlocked {}", self.path.display());
    }
}

/// Non-blocking exclusive flock. `Ok(false)` means another process holds it.
#[cfg(unix)]
pub(crate) fn try_lock(file: &File) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor is owned by `file` and stays open for the call
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    match err.kind() {
        std::io::ErrorKind::WouldBlock => Ok(false),
        std::io::ErrorKind::Interrupted => Ok(false),
        _ => Err(err),
    }
}

#[cfg(not(unix))]
pub(crate) fn try_lock(_file: &File) -> std::io::Result<bool> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_path_sits_beside_catalog() {
        assert_eq!(
            lock_path(Path::new("/data/gpxdb/catalog.json")),
            PathBuf::from("/data/gpxdb/catalog.json.lock")
        );
    }

    #[test]
    fn acquire_and_release() {
        let tmp = TempDir::new().unwrap();
        let catalog = tmp.path().join("catalog.json");

        let lock = CatalogLock::acquire_default(&catalog);
        assert!(lock.is_ok());
        drop(lock);
        // The lock file outlives the guard so every process locks the same inode
        assert!(lock_path(&catalog).exists());

        assert!(CatalogLock::acquire_default(&catalog).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn released_lock_is_reacquired_on_the_same_file() {
        use std::os::unix::fs::MetadataExt;
        let tmp = TempDir::new().unwrap();
        let catalog = tmp.path().join("catalog.json");

        drop(CatalogLock::acquire_default(&catalog).unwrap());
        let inode = fs::metadata(lock_path(&catalog)).unwrap().ino();
        let _held = CatalogLock::acquire_default(&catalog).unwrap();
        assert_eq!(fs::metadata(lock_path(&catalog)).unwrap().ino(), inode);
        assert!(CatalogLock::acquire(&catalog, Duration::from_millis(30)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn contention_times_out() {
        let tmp = TempDir::new().unwrap();
        let catalog = tmp.path().join("catalog.json");

        let _held = CatalogLock::acquire_default(&catalog).unwrap();
        let second = CatalogLock::acquire(&catalog, Duration::from_millis(50));
        assert!(matches!(second, Err(LockError::Timeout { .. })));
    }
}
