use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::StoreError;

/// Environment variable holding the at-rest encryption key.
pub const TRACE_KEY_ENV: &str = "CONDUCTOR_TRACE_KEY";

const NONCE_LEN: usize = 12;

/// A 32-byte AES-256-GCM key for attribute blobs.
///
/// The key material comes from a single environment variable holding either
/// a base64 value that decodes to exactly 32 bytes, or an arbitrary
/// passphrase hashed with SHA-256. Keys are immutable after load.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl EncryptionKey {
    /// Derive a key from raw material per the loading rules above.
    pub fn from_material(material: &str) -> Self {
        if let Ok(decoded) = BASE64.decode(material.trim()) {
            if decoded.len() == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(&decoded);
                return EncryptionKey(key);
            }
        }
        let digest = Sha256::digest(material.as_bytes());
        EncryptionKey(digest.into())
    }

    /// Load the key from [`TRACE_KEY_ENV`]. Returns `None` when unset or
    /// empty, which disables encryption.
    pub fn from_env() -> Option<Self> {
        match std::env::var(TRACE_KEY_ENV) {
            Ok(value) if !value.trim().is_empty() => Some(Self::from_material(&value)),
            _ => None,
        }
    }

    /// Construct from exactly 32 raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        EncryptionKey(bytes)
    }
}

/// Seals and opens attribute blobs.
///
/// Each blob is encrypted with a fresh random 12-byte nonce; the nonce is
/// prepended to the ciphertext and the whole value is base64-armored for
/// storage in a text column.
#[derive(Clone)]
pub struct BlobCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for BlobCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BlobCipher(..)")
    }
}

impl BlobCipher {
    /// Build a cipher over the given key.
    pub fn new(key: &EncryptionKey) -> Self {
        BlobCipher {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0)),
        }
    }

    /// Encrypt and armor a plaintext blob.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, StoreError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| StoreError::Encrypt)?;
        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// De-armor and decrypt a stored blob.
    pub fn open(&self, armored: &str) -> Result<Vec<u8>, StoreError> {
        let combined = BASE64.decode(armored).map_err(|_| StoreError::Decrypt)?;
        if combined.len() < NONCE_LEN {
            return Err(StoreError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| StoreError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let cipher = BlobCipher::new(&EncryptionKey::from_material("passphrase"));
        let sealed = cipher.seal(b"{\"k\":\"v\"}").unwrap();
        assert_ne!(sealed.as_bytes(), b"{\"k\":\"v\"}");
        assert_eq!(cipher.open(&sealed).unwrap(), b"{\"k\":\"v\"}");
    }

    #[test]
    fn nonces_differ_between_seals() {
        let cipher = BlobCipher::new(&EncryptionKey::from_material("passphrase"));
        let a = cipher.seal(b"same").unwrap();
        let b = cipher.seal(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealing = BlobCipher::new(&EncryptionKey::from_material("key-one"));
        let opening = BlobCipher::new(&EncryptionKey::from_material("key-two"));
        let sealed = sealing.seal(b"secret").unwrap();
        assert!(matches!(opening.open(&sealed), Err(StoreError::Decrypt)));
    }

    #[test]
    fn base64_key_material_must_be_32_bytes() {
        // 32 zero bytes, base64-encoded: used verbatim.
        let raw = [7u8; 32];
        let encoded = BASE64.encode(raw);
        let from_b64 = EncryptionKey::from_material(&encoded);
        assert_eq!(from_b64.0, raw);

        // Valid base64 of the wrong length falls back to passphrase hashing.
        let short = BASE64.encode([1u8; 8]);
        let hashed = EncryptionKey::from_material(&short);
        assert_eq!(hashed.0, <[u8; 32]>::from(Sha256::digest(short.as_bytes())));
    }

    #[test]
    fn env_loading() {
        temp_env::with_var(TRACE_KEY_ENV, None::<&str>, || {
            assert!(EncryptionKey::from_env().is_none());
        });
        temp_env::with_var(TRACE_KEY_ENV, Some("hunter2"), || {
            assert!(EncryptionKey::from_env().is_some());
        });
        temp_env::with_var(TRACE_KEY_ENV, Some("   "), || {
            assert!(EncryptionKey::from_env().is_none());
        });
    }
}
