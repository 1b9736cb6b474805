//! Durable storage for the active engine configuration.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::info;

use super::EngineConfig;
use crate::error::{DbError, Result};

/// Reads and writes the persisted [`EngineConfig`].
///
/// The file is the only durable artifact of this crate. Writes go through a
/// temporary sibling file and a rename, so readers see either the previous
/// record or the new one, never a torn write.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store for the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a configuration has been persisted.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the persisted configuration, `None` when the file is absent.
    pub fn load(&self) -> Result<Option<EngineConfig>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        Ok(Some(config))
    }

    /// Load the persisted configuration, failing when none exists.
    pub fn require(&self) -> Result<EngineConfig> {
        self.load()?.ok_or_else(|| {
            DbError::Config(format!(
                "No database configuration at {:?}; run the installer first",
                self.path
            ))
        })
    }

    /// Persist a configuration, replacing any previous one.
    pub fn save(&self, config: &EngineConfig) -> Result<()> {
        let yaml = serde_yaml::to_string(config)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DbError::persist(&self.path, e))?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, yaml).map_err(|e| DbError::persist(&self.path, e))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(DbError::persist(&self.path, e));
        }

        info!("Saved {} configuration to {:?}", config.kind(), self.path);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
