//! # Key Store
//!
//! Durable, encrypted repository of named RSA key pairs and of the public
//! keys of trusted hosts. The whole store is one sealed JSON document:
//!
//! ```json
//! {"keys": {"default": {"name": "default", "public_key": "...", "private_key": "..."}},
//!  "connections": {"peer.example": {"host": "peer.example", "public_key": "..."}}}
//! ```
//!
//! Every mutation rewrites the document before it is visible to other
//! callers. When the document does not exist yet, the first access creates
//! it with a single key pair named `default`.

use crate::crypto::{self, KeyPair};
use crate::envelope::EnvelopeCipher;
use crate::error::{Result, TrustError};
use crate::repository::{Repository, RepositoryHandle, SnapshotStore};
use crate::storage::EncryptedFile;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the key pair provisioned with a new store.
pub const DEFAULT_KEY_NAME: &str = "default";

/// A trusted remote peer and the public key payloads to it are sealed with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub host: String,
    /// PEM-encoded PKCS#1 public key.
    pub public_key: String,
}

impl Connection {
    pub fn new(host: impl Into<String>, public_key: &RsaPublicKey) -> Result<Self> {
        Ok(Self {
            host: host.into(),
            public_key: crypto::encode_public_key(public_key)?,
        })
    }

    pub fn public_key(&self) -> Result<RsaPublicKey> {
        crypto::parse_public_key(&self.public_key)
    }

    /// Encrypt a payload for this host.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        crypto::encrypt(&self.public_key, plaintext)
    }
}

/// Everything the key store persists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStoreSnapshot {
    #[serde(default)]
    pub keys: BTreeMap<String, KeyPair>,
    #[serde(default)]
    pub connections: BTreeMap<String, Connection>,
}

struct KeyStoreFile {
    file: EncryptedFile,
}

impl SnapshotStore<KeyStoreSnapshot> for KeyStoreFile {
    fn load(&self) -> Result<KeyStoreSnapshot> {
        if let Some(snapshot) = self.file.read()? {
            return Ok(snapshot);
        }

        info!(
            "No key store at {}, provisioning '{}' key pair",
            self.file.path().display(),
            DEFAULT_KEY_NAME
        );

        let mut snapshot = KeyStoreSnapshot::default();
        snapshot
            .keys
            .insert(DEFAULT_KEY_NAME.to_string(), KeyPair::generate(DEFAULT_KEY_NAME)?);
        self.file.write(&snapshot)?;

        Ok(snapshot)
    }

    fn persist(&self, snapshot: &KeyStoreSnapshot) -> Result<()> {
        self.file.write(snapshot)
    }
}

/// Handle to the encrypted key and connection store.
#[derive(Clone)]
pub struct KeyStore {
    repository: Arc<Repository<KeyStoreSnapshot>>,
}

impl KeyStore {
    /// Open the store at `path`. Nothing is read until first use.
    pub fn open(path: PathBuf, cipher: EnvelopeCipher) -> Self {
        let store = KeyStoreFile {
            file: EncryptedFile::new(path, cipher),
        };
        Self {
            repository: Arc::new(Repository::new("key store", store)),
        }
    }

    /// Hold the snapshot loaded across several operations.
    pub fn acquire(&self) -> Result<RepositoryHandle<'_, KeyStoreSnapshot>> {
        self.repository.acquire()
    }

    pub fn repository(&self) -> &Repository<KeyStoreSnapshot> {
        &self.repository
    }

    /// Generate a key pair under `name` and persist it. An existing pair
    /// with the same name is replaced.
    pub fn new_key(&self, name: &str) -> Result<KeyPair> {
        let pair = KeyPair::generate(name)?;
        let handle = self.acquire()?;

        handle.update(|snapshot| {
            if snapshot.keys.insert(name.to_string(), pair.clone()).is_some() {
                warn!("Replaced existing key pair '{}'", name);
            }
            Ok(())
        })?;

        info!("Stored key pair '{}'", name);
        Ok(pair)
    }

    /// Like [`new_key`](Self::new_key) but refuses to replace an existing
    /// pair.
    pub fn create_key(&self, name: &str) -> Result<KeyPair> {
        let handle = self.acquire()?;
        if handle.read().keys.contains_key(name) {
            return Err(TrustError::KeyExists(name.to_string()));
        }

        let pair = KeyPair::generate(name)?;
        handle.update(|snapshot| {
            if snapshot.keys.contains_key(name) {
                return Err(TrustError::KeyExists(name.to_string()));
            }
            snapshot.keys.insert(name.to_string(), pair.clone());
            Ok(())
        })?;

        info!("Created key pair '{}'", name);
        Ok(pair)
    }

    /// Remove the key pair `name`. Returns whether it existed.
    pub fn delete_key(&self, name: &str) -> Result<bool> {
        let handle = self.acquire()?;
        let removed = handle.update(|snapshot| Ok(snapshot.keys.remove(name).is_some()))?;
        if removed {
            info!("Deleted key pair '{}'", name);
        } else {
            debug!("No key pair '{}' to delete", name);
        }
        Ok(removed)
    }

    pub fn get_key(&self, name: &str) -> Result<Option<KeyPair>> {
        Ok(self.acquire()?.read().keys.get(name).cloned())
    }

    pub fn key_names(&self) -> Result<Vec<String>> {
        Ok(self.acquire()?.read().keys.keys().cloned().collect())
    }

    /// Trust `public_key` for `host`, replacing any previous key.
    pub fn add_connection(&self, host: &str, public_key: &RsaPublicKey) -> Result<()> {
        let connection = Connection::new(host, public_key)?;
        self.acquire()?.update(|snapshot| {
            snapshot.connections.insert(host.to_string(), connection);
            Ok(())
        })?;

        info!("Trusted connection '{}'", host);
        Ok(())
    }

    /// Stop trusting `host`. Returns whether it was trusted.
    pub fn delete_connection(&self, host: &str) -> Result<bool> {
        let removed = self
            .acquire()?
            .update(|snapshot| Ok(snapshot.connections.remove(host).is_some()))?;
        if removed {
            info!("Removed connection '{}'", host);
        }
        Ok(removed)
    }

    pub fn get_connection(&self, host: &str) -> Result<Option<Connection>> {
        Ok(self.acquire()?.read().connections.get(host).cloned())
    }

    pub fn connection_hosts(&self) -> Result<Vec<String>> {
        Ok(self.acquire()?.read().connections.keys().cloned().collect())
    }

    /// Encrypt `plaintext` for a trusted host. `None` when the host is not
    /// trusted.
    pub fn encrypt_for(&self, host: &str, plaintext: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.get_connection(host)? {
            Some(connection) => connection.encrypt(plaintext).map(Some),
            None => Ok(None),
        }
    }
}
