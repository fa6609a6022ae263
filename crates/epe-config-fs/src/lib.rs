// SPDX-License-Identifier: Apache-2.0
//! Filesystem-backed [`ConfigStore`] for the policy engine, rooted at the
//! platform config directory (e.g. `~/.config/epigenetic-policy-engine` on
//! Linux).

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use epe_config::{ConfigError, ConfigStore};

/// Stores configs as JSON files under the platform config directory.
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Create a store rooted at the user config directory for this
    /// application (e.g. `~/.config/epigenetic-policy-engine`).
    ///
    /// # Errors
    /// Returns [`ConfigError::Other`] if the platform config directory
    /// cannot be resolved, or [`ConfigError::Io`] if it cannot be created.
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "epe", "epigenetic-policy-engine")
            .ok_or_else(|| ConfigError::Other("could not resolve config dir".into()))?;
        Self::at(proj.config_dir().to_path_buf())
    }

    /// Create a store rooted at an arbitrary directory, creating it if
    /// necessary. Used directly by tests; production callers should prefer
    /// [`FsConfigStore::new`].
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if `base` cannot be created.
    pub fn at(base: PathBuf) -> Result<Self, ConfigError> {
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}
