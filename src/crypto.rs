//! Payload signing and encryption.
//!
//! - HMAC-SHA256 over the transmitted body, hex-encoded in the `HashSHA256`
//!   header.
//! - RSA PKCS#1 v1.5 for whole-body encryption. One operation can only
//!   encrypt `modulus_bytes - 11` bytes, so callers check
//!   [`PublicKey::capacity`] before encrypting.

use std::path::Path;

use hmac::{Hmac, Mac};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Header marking a body encrypted with the server's public key.
pub const ENCRYPTED_HEADER: &str = "Content-Encrypted";

const PKCS1_V15_OVERHEAD: usize = 11;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to read key file {path}: {source}")]
    ReadKey {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid {0} key: expected PKCS#8 or PKCS#1 PEM")]
    InvalidKey(&'static str),

    #[error("payload of {size} bytes exceeds cipher capacity of {capacity} bytes")]
    ExceedsCapacity { size: usize, capacity: usize },

    #[error("encryption failed: {0}")]
    Encrypt(rsa::Error),

    #[error("decryption failed: {0}")]
    Decrypt(rsa::Error),
}

/// Hex-encoded HMAC-SHA256 of `body`.
pub fn sign(key: &[u8], body: &[u8]) -> String {
    hex::encode(hmac_for(key, body).finalize().into_bytes())
}

/// Constant-time check of a hex signature against `body`.
pub fn verify(key: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    hmac_for(key, body).verify_slice(&expected).is_ok()
}

fn hmac_for(key: &[u8], body: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(body);
    mac
}

fn read_pem(path: &Path) -> Result<String, CryptoError> {
    std::fs::read_to_string(path).map_err(|source| CryptoError::ReadKey {
        path: path.display().to_string(),
        source,
    })
}

/// Agent-side encryption key.
#[derive(Debug, Clone)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map(Self)
            .map_err(|_| CryptoError::InvalidKey("public"))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    /// Largest plaintext one encryption can take.
    pub fn capacity(&self) -> usize {
        self.0.size().saturating_sub(PKCS1_V15_OVERHEAD)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.len() > self.capacity() {
            return Err(CryptoError::ExceedsCapacity {
                size: plaintext.len(),
                capacity: self.capacity(),
            });
        }

        self.0
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, plaintext)
            .map_err(CryptoError::Encrypt)
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        Self(key)
    }
}

/// Server-side decryption key. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map(Self)
            .map_err(|_| CryptoError::InvalidKey("private"))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.0
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(CryptoError::Decrypt)
    }
}

impl From<RsaPrivateKey> for PrivateKey {
    fn from(key: RsaPrivateKey) -> Self {
        Self(key)
    }
}
