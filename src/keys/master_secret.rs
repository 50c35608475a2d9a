//! Master secret sources for local key encryption.
//!
//! The master secret is the key encryption key (KEK) of the envelope
//! scheme. It is only ever handed to the [`KeyCodec`](super::KeyCodec).

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use zeroize::Zeroizing;

use super::crypto::{derive_key_encryption_key, SYMMETRIC_KEY_LEN};
use crate::types::{KeyError, Result};

/// Supplies the 256-bit key encryption key.
pub trait MasterSecret: Send + Sync {
    /// Return the KEK. Callers must drop it as soon as the operation ends.
    fn key_encryption_key(&self) -> Result<Zeroizing<[u8; SYMMETRIC_KEY_LEN]>>;
}

/// A master secret configured directly as 32 raw bytes.
pub struct StaticMasterSecret {
    key: Zeroizing<[u8; SYMMETRIC_KEY_LEN]>,
}

impl StaticMasterSecret {
    pub fn new(key: [u8; SYMMETRIC_KEY_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Parse a base64 encoded 32-byte secret.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|e| KeyError::Config(format!("Invalid encryption key encoding: {e}")))?,
        );
        let key: [u8; SYMMETRIC_KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            KeyError::Config(format!(
                "Encryption key must be {} bytes, got {}",
                SYMMETRIC_KEY_LEN,
                decoded.len()
            ))
        })?;
        Ok(Self::new(key))
    }
}

impl MasterSecret for StaticMasterSecret {
    fn key_encryption_key(&self) -> Result<Zeroizing<[u8; SYMMETRIC_KEY_LEN]>> {
        Ok(self.key.clone())
    }
}

impl fmt::Debug for StaticMasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticMasterSecret(<redacted>)")
    }
}

/// A master secret derived from an operator passphrase with Argon2id.
///
/// Derivation is expensive, so it runs once at construction.
pub struct PassphraseMasterSecret {
    key: Zeroizing<[u8; SYMMETRIC_KEY_LEN]>,
}

impl PassphraseMasterSecret {
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self> {
        let key = derive_key_encryption_key(passphrase.as_bytes(), salt)?;
        Ok(Self { key })
    }
}

impl MasterSecret for PassphraseMasterSecret {
    fn key_encryption_key(&self) -> Result<Zeroizing<[u8; SYMMETRIC_KEY_LEN]>> {
        Ok(self.key.clone())
    }
}

impl fmt::Debug for PassphraseMasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PassphraseMasterSecret(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_from_base64() {
        let encoded = BASE64.encode([7u8; SYMMETRIC_KEY_LEN]);
        let secret = StaticMasterSecret::from_base64(&encoded).unwrap();
        assert_eq!(*secret.key_encryption_key().unwrap(), [7u8; SYMMETRIC_KEY_LEN]);
    }

    #[test]
    fn test_static_rejects_wrong_length() {
        let encoded = BASE64.encode([7u8; 16]);
        let result = StaticMasterSecret::from_base64(&encoded);
        assert!(matches!(result, Err(KeyError::Config(_))));

        assert!(StaticMasterSecret::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_passphrase_is_deterministic() {
        let salt = b"0123456789abcdef";
        let a = PassphraseMasterSecret::derive("correct horse", salt).unwrap();
        let b = PassphraseMasterSecret::derive("correct horse", salt).unwrap();
        let c = PassphraseMasterSecret::derive("battery staple", salt).unwrap();

        assert_eq!(*a.key_encryption_key().unwrap(), *b.key_encryption_key().unwrap());
        assert_ne!(*a.key_encryption_key().unwrap(), *c.key_encryption_key().unwrap());
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = StaticMasterSecret::new([1u8; SYMMETRIC_KEY_LEN]);
        assert_eq!(format!("{:?}", secret), "StaticMasterSecret(<redacted>)");
    }
}
