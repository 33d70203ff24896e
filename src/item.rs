//! Sync items: the named files and directories whose changes drive triggers.

use crate::fingerprint::fingerprint;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

/// A file or directory kept in sync. `name` is the routing key used by
/// the event registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItem {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    /// Last recorded fingerprint of the item's content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub is_dir: bool,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl SyncItem {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            host: default_host(),
            hash: None,
            is_dir,
        }
    }

    /// An item named after the current UTC timestamp in nanoseconds.
    pub fn unnamed(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        let now = chrono::Utc::now();
        let name = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros())
            .to_string();
        Self::new(name, path, is_dir)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Compute the current fingerprint of the item's content.
    pub fn fingerprint(&self) -> io::Result<String> {
        fingerprint(&self.path, self.is_dir)
    }

    /// Whether the content still matches the recorded fingerprint. An item
    /// with no recorded fingerprint never matches.
    pub fn check_hash(&self) -> io::Result<bool> {
        let current = self.fingerprint()?;
        Ok(self.hash.as_deref() == Some(current.as_str()))
    }

    /// Record the current fingerprint.
    pub fn set_hash(&mut self) -> io::Result<()> {
        self.hash = Some(self.fingerprint()?);
        Ok(())
    }
}
