//! Encrypted snapshot files.
//!
//! A snapshot is serialized to JSON, sealed with the [`EnvelopeCipher`]
//! and written next to its final location before being renamed over it,
//! so a crash mid-write leaves the previous file intact.

use crate::envelope::EnvelopeCipher;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One sealed JSON document on disk.
#[derive(Clone)]
pub struct EncryptedFile {
    path: PathBuf,
    cipher: EnvelopeCipher,
}

impl EncryptedFile {
    pub fn new(path: PathBuf, cipher: EnvelopeCipher) -> Self {
        Self { path, cipher }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decrypt the document. `None` when the file does not exist.
    pub fn read<S: DeserializeOwned>(&self) -> Result<Option<S>> {
        let sealed = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let plaintext = self.cipher.open(&sealed)?;
        let snapshot = serde_json::from_slice(&plaintext)?;

        debug!("Loaded {} ({} bytes)", self.path.display(), sealed.len());
        Ok(Some(snapshot))
    }

    /// Encrypt and atomically replace the document.
    pub fn write<S: Serialize>(&self, snapshot: &S) -> Result<()> {
        let plaintext = serde_json::to_vec(snapshot)?;
        let sealed = self.cipher.seal(&plaintext)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        if let Err(e) = write_private(&tmp_path, &sealed).and_then(|()| fs::rename(&tmp_path, &self.path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!("Saved {} ({} bytes)", self.path.display(), sealed.len());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Write `data` to a fresh file that only the owner can read.
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterKey;
    use crate::error::TrustError;
    use assert_matches::assert_matches;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn cipher(byte: u8) -> EnvelopeCipher {
        EnvelopeCipher::new(&MasterKey::from_bytes(&[byte; 32]).unwrap())
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let file = EncryptedFile::new(temp_dir.path().join("absent.enc"), cipher(1));
        let loaded: Option<BTreeMap<String, String>> = file.read().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("doc.enc");
        let file = EncryptedFile::new(path.clone(), cipher(1));

        let mut doc = BTreeMap::new();
        doc.insert("host".to_string(), "peer-1".to_string());
        file.write(&doc).unwrap();

        assert!(path.exists());
        assert!(!temp_dir.path().join("nested").join("doc.enc.tmp").exists());

        let raw = std::fs::read(&path).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("peer-1"));

        let loaded: BTreeMap<String, String> = file.read().unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.enc");
        EncryptedFile::new(path.clone(), cipher(1)).write(&vec![1, 2, 3]).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_temp_file_is_replaced() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.enc");
        let stale = temp_dir.path().join("doc.enc.tmp");
        std::fs::write(&stale, b"left over").unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();

        EncryptedFile::new(path.clone(), cipher(1)).write(&vec![4, 5]).unwrap();

        assert!(!stale.exists());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.enc");
        // A non-empty directory in the way makes the rename fail
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupant"), b"x").unwrap();

        let file = EncryptedFile::new(path.clone(), cipher(1));
        assert_matches!(file.write(&vec![1, 2, 3]), Err(TrustError::Io(_)));
        assert!(!temp_dir.path().join("doc.enc.tmp").exists());
        assert!(path.join("occupant").exists());
    }

    #[test]
    fn test_wrong_key_and_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.enc");
        EncryptedFile::new(path.clone(), cipher(1)).write(&vec![1, 2, 3]).unwrap();

        let other = EncryptedFile::new(path.clone(), cipher(2));
        assert_matches!(other.read::<Vec<u8>>(), Err(TrustError::Decrypt(_)));

        std::fs::write(&path, b"tiny").unwrap();
        assert_matches!(other.read::<Vec<u8>>(), Err(TrustError::Decrypt(_)));
    }

    #[test]
    fn test_undecodable_plaintext_is_format_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.enc");
        let cipher = cipher(4);
        std::fs::write(&path, cipher.seal(b"{not json").unwrap()).unwrap();

        let file = EncryptedFile::new(path, cipher);
        assert_matches!(file.read::<Vec<u8>>(), Err(TrustError::Format(_)));
    }
}
