//! # Envelope Encryption
//!
//! Seals whole repository snapshots before they touch the disk using
//! AES-256-GCM:
//! - 256-bit master key
//! - 96-bit random nonce, fresh for every `seal`, prepended to the output
//! - 128-bit authentication tag appended by GCM
//!
//! Layout of a sealed blob: `nonce (12) || ciphertext || tag (16)`.

use crate::config::MasterKey;
use crate::error::{Result, TrustError};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

/// Size of the GCM nonce prefix in bytes.
pub const NONCE_LEN: usize = 12;

/// Symmetric cipher for on-disk blobs.
#[derive(Clone)]
pub struct EnvelopeCipher {
    cipher: Aes256Gcm,
}

impl EnvelopeCipher {
    pub fn new(key: &MasterKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
        }
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| TrustError::Crypto(format!("seal failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a blob produced by [`seal`](Self::seal). Fails on short
    /// input and on any tampering with nonce, ciphertext or tag.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(TrustError::Decrypt(format!(
                "ciphertext is {} bytes, shorter than the {}-byte nonce",
                sealed.len(),
                NONCE_LEN
            )));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TrustError::Decrypt("authentication failed".to_string()))
    }
}
