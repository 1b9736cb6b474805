//! Advisory lock guarding install and migration against each other.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::error::{DbError, Result};

/// Lock files older than this are considered left behind by a crashed process.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(6 * 60 * 60);

/// Exclusive lock file next to the configuration file.
///
/// Released when dropped.
#[derive(Debug)]
pub struct ConfigLock {
    path: PathBuf,
}

impl ConfigLock {
    /// Lock file path for a configuration file.
    pub fn path_for(config_path: &Path) -> PathBuf {
        let mut name = config_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the lock for `config_path`, failing with [`DbError::Locked`] if held.
    pub fn acquire(config_path: &Path) -> Result<Self> {
        let path = Self::path_for(config_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match Self::create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !Self::is_stale(&path) {
                    return Err(DbError::Locked(path));
                }
                warn!("Removing stale lock file {:?}", path);
                fs::remove_file(&path)?;
                Self::create(&path).map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => DbError::Locked(path.clone()),
                    _ => e.into(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(
            file,
            "pid={} acquired_at={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        )?;
        debug!("Acquired lock {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn is_stale(path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > STALE_LOCK_AGE)
    }
}

impl Drop for ConfigLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Could not release lock {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("database.yaml");

        let first = ConfigLock::acquire(&config_path).unwrap();
        let second = ConfigLock::acquire(&config_path);
        assert!(matches!(second, Err(DbError::Locked(_))));

        drop(first);
        assert!(ConfigLock::acquire(&config_path).is_ok());
    }

    #[test]
    fn test_lock_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("database.yaml");
        let lock_path = ConfigLock::path_for(&config_path);

        {
            let _lock = ConfigLock::acquire(&config_path).unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }
}
