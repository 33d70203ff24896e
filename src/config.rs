//! # Configuration Management
//!
//! This module handles the startup configuration of synctrust:
//! - The master key used to seal the on-disk repositories (`AUTH_ENCRYPT_KEY`)
//! - TOML-based settings locating the key store and event registry files
//! - The list of watched sync items
//!
//! Settings live in a platform-appropriate directory (e.g.
//! `~/.config/synctrust/` on Linux), which `SYNCTRUST_CONFIG_DIR` overrides.
//! Both variables may also come from a `.env` file in the working
//! directory; variables already set in the process environment win.

use crate::error::{Result, TrustError};
use crate::item::SyncItem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

/// Environment variable holding the 32-byte master key.
pub const MASTER_KEY_ENV: &str = "AUTH_ENCRYPT_KEY";

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "SYNCTRUST_CONFIG_DIR";

/// Length of the master key in bytes (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// Load `.env` from the current directory or its parents. A missing file
/// is not an error. Returns the path of the file that was loaded.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!("Loaded environment from {}", path.display());
            Ok(Some(path))
        }
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(TrustError::Config(format!("Invalid .env file: {}", e))),
    }
}

/// Load a specific env file. Returns `false` when it does not exist.
pub fn load_dotenv_from(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            debug!("Loaded environment from {}", path.display());
            Ok(true)
        }
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(TrustError::Config(format!("Invalid env file {}: {}", path.display(), e))),
    }
}

/// Process-wide key sealing the key store and the event registry.
///
/// The key bytes are wiped from memory when the value is dropped.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; MASTER_KEY_LEN]>);

impl MasterKey {
    /// Build a master key from raw bytes. Any length other than 32 is a
    /// configuration error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != MASTER_KEY_LEN {
            return Err(TrustError::Config(format!(
                "{} must be exactly {} bytes for AES-256, got {}",
                MASTER_KEY_ENV,
                MASTER_KEY_LEN,
                bytes.len()
            )));
        }

        let mut key = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Read the master key from `AUTH_ENCRYPT_KEY`.
    pub fn from_env() -> Result<Self> {
        let value = Zeroizing::new(std::env::var(MASTER_KEY_ENV).map_err(|_| {
            TrustError::Config(format!("{} is not set", MASTER_KEY_ENV))
        })?);
        Self::from_bytes(value.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Locations of the persisted repositories.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the encrypted repository files. Relative paths
    /// are resolved against the configuration directory.
    pub data_dir: PathBuf,
    pub keystore_file: String,
    pub events_file: String,
    pub items_file: String,

    #[serde(skip)]
    pub config_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            keystore_file: "authdata.enc".to_string(),
            events_file: "events.enc".to_string(),
            items_file: "items.toml".to_string(),
            config_dir: PathBuf::new(),
        }
    }
}

/// On-disk shape of the sync item list.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ItemsFile {
    #[serde(default)]
    items: Vec<SyncItem>,
}

impl Settings {
    /// Load settings from the default configuration directory.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_dir()?)
    }

    /// Load settings from `config.toml` inside `config_dir`, falling back
    /// to defaults when the file does not exist.
    pub fn load_from(config_dir: &Path) -> Result<Self> {
        let config_file = config_dir.join("config.toml");

        let mut settings = if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)?;
            toml::from_str::<Settings>(&content)
                .map_err(|e| TrustError::Format(format!("{}: {}", config_file.display(), e)))?
        } else {
            debug!("No config file at {}, using defaults", config_file.display());
            Settings::default()
        };

        settings.config_dir = config_dir.to_path_buf();
        if settings.data_dir.is_relative() {
            settings.data_dir = config_dir.join(&settings.data_dir);
        }

        Ok(settings)
    }

    /// Settings rooted at `dir` with default file names.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            data_dir: dir.to_path_buf(),
            config_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let content =
            toml::to_string_pretty(self).map_err(|e| TrustError::Format(e.to_string()))?;
        std::fs::write(self.config_dir.join("config.toml"), content)?;
        Ok(())
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join(&self.keystore_file)
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join(&self.events_file)
    }

    pub fn items_path(&self) -> PathBuf {
        self.config_dir.join(&self.items_file)
    }

    /// Read the watched sync items. A missing file means no items.
    pub fn load_items(&self) -> Result<Vec<SyncItem>> {
        let path = self.items_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path)?;
        let file: ItemsFile = toml::from_str(&content)
            .map_err(|e| TrustError::Format(format!("{}: {}", path.display(), e)))?;
        Ok(file.items)
    }

    pub fn save_items(&self, items: &[SyncItem]) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let file = ItemsFile {
            items: items.to_vec(),
        };
        let content =
            toml::to_string_pretty(&file).map_err(|e| TrustError::Format(e.to_string()))?;
        std::fs::write(self.items_path(), content)?;
        Ok(())
    }

    fn config_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| TrustError::Config("Could not determine config directory".to_string()))?
            .join("synctrust");

        Ok(config_dir)
    }
}
