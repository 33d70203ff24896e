//! # Asymmetric Key Pairs
//!
//! RSA key material used to authenticate and encrypt payloads exchanged
//! with trusted hosts:
//! - 2048-bit RSA keys generated from the OS random source
//! - PKCS#1 DER wrapped in PEM blocks labelled `PRIVATE KEY` / `PUBLIC KEY`
//! - OAEP padding with SHA-256 for message encryption
//!
//! Messages are not chunked. A 2048-bit key accepts at most 190 bytes of
//! plaintext; callers split larger payloads themselves.

use crate::error::{Result, TrustError};
use rand::rngs::OsRng;
use rsa::pkcs1::der::pem::{self, LineEnding};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

/// Modulus size of generated keys.
pub const KEY_BITS: usize = 2048;

pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

// Two SHA-256 digests plus two framing bytes.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// A named RSA key pair with both halves stored as PEM text.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub name: String,
    pub public_key: String,
    pub private_key: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("name", &self.name)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a fresh 2048-bit key pair.
    pub fn generate(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let private_key = RsaPrivateKey::new(&mut OsRng, KEY_BITS)?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_der = private_key
            .to_pkcs1_der()
            .map_err(|e| TrustError::Crypto(format!("encode private key: {}", e)))?;

        debug!("Generated {}-bit key pair '{}'", KEY_BITS, name);

        Ok(Self {
            name,
            public_key: encode_public_key(&public_key)?,
            private_key: encode_pem(PRIVATE_KEY_LABEL, private_der.as_bytes())?,
        })
    }

    /// Encrypt `plaintext` to this pair's public half.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        encrypt(&self.public_key, plaintext)
    }

    /// Decrypt `ciphertext` with this pair's private half.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        decrypt(&self.private_key, ciphertext)
    }

    /// Parsed public half, e.g. for registering as a trusted connection.
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        parse_public_key(&self.public_key)
    }
}

/// Encrypt `plaintext` with a PEM-encoded public key using OAEP/SHA-256.
pub fn encrypt(public_key_pem: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let public_key = parse_public_key(public_key_pem)?;
    encrypt_to(&public_key, plaintext)
}

/// Encrypt `plaintext` with an already parsed public key.
pub fn encrypt_to(public_key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let limit = max_plaintext_len(public_key);
    if plaintext.len() > limit {
        return Err(TrustError::Crypto(format!(
            "plaintext is {} bytes, OAEP limit for this key is {}",
            plaintext.len(),
            limit
        )));
    }

    Ok(public_key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)?)
}

/// Decrypt `ciphertext` with a PEM-encoded private key. The RSA operation
/// is blinded.
pub fn decrypt(private_key_pem: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let der = Zeroizing::new(decode_pem(private_key_pem, PRIVATE_KEY_LABEL)?);
    let private_key = RsaPrivateKey::from_pkcs1_der(&der)
        .map_err(|e| TrustError::Format(format!("private key: {}", e)))?;

    Ok(private_key.decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), ciphertext)?)
}

/// Largest plaintext `encrypt_to` accepts for `public_key`.
pub fn max_plaintext_len(public_key: &RsaPublicKey) -> usize {
    public_key.size().saturating_sub(OAEP_SHA256_OVERHEAD)
}

pub fn parse_public_key(public_key_pem: &str) -> Result<RsaPublicKey> {
    let der = decode_pem(public_key_pem, PUBLIC_KEY_LABEL)?;
    RsaPublicKey::from_pkcs1_der(&der)
        .map_err(|e| TrustError::Format(format!("public key: {}", e)))
}

pub fn encode_public_key(public_key: &RsaPublicKey) -> Result<String> {
    let der = public_key
        .to_pkcs1_der()
        .map_err(|e| TrustError::Crypto(format!("encode public key: {}", e)))?;
    encode_pem(PUBLIC_KEY_LABEL, der.as_bytes())
}

fn encode_pem(label: &str, der: &[u8]) -> Result<String> {
    pem::encode_string(label, LineEnding::LF, der)
        .map_err(|e| TrustError::Crypto(format!("PEM encode: {}", e)))
}

/// Decode exactly one PEM block with the expected label. Anything but
/// whitespace after the block is rejected.
fn decode_pem(text: &str, label: &str) -> Result<Vec<u8>> {
    let wrong_format = || TrustError::Format(format!("wrong format for {}", label.to_lowercase()));

    let end_marker = format!("-----END {}-----", label);
    let end = text.find(&end_marker).ok_or_else(wrong_format)? + end_marker.len();
    if !text[end..].trim().is_empty() {
        return Err(TrustError::Format(format!(
            "trailing data after {} block",
            label.to_lowercase()
        )));
    }

    let (found, der) = pem::decode_vec(text[..end].as_bytes())
        .map_err(|e| TrustError::Format(format!("PEM decode: {}", e)))?;
    if found != label {
        return Err(wrong_format());
    }

    Ok(der)
}
