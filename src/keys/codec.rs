//! Key codec: in-flight [`Key`] <-> [`StorableKey`]
//!
//! | type         | stored `value`                        |
//! |--------------|---------------------------------------|
//! | `local`      | envelope ciphertext under master secret |
//! | `google_kms` | UTF-8 resource id (no secret exists)  |

use std::sync::Arc;

use tracing::{error, warn};
use zeroize::Zeroizing;

use super::crypto::{envelope_decrypt, envelope_encrypt};
use super::{Key, KeyMaterial, KeyType, MasterSecret};
use crate::db::StorableKey;
use crate::kms::ResourceId;
use crate::types::{Address, KeyError, Result};

/// Converts keys to and from their storable form.
///
/// Stateless apart from the master secret handle; safe to share across
/// tasks.
#[derive(Clone)]
pub struct KeyCodec {
    master_secret: Option<Arc<dyn MasterSecret>>,
}

impl KeyCodec {
    /// Codec able to handle both local and remote keys
    pub fn new(master_secret: Arc<dyn MasterSecret>) -> Self {
        Self {
            master_secret: Some(master_secret),
        }
    }

    /// Codec for deployments that only hold remote keys.
    ///
    /// Saving or loading a local key fails.
    pub fn remote_only() -> Self {
        Self {
            master_secret: None,
        }
    }

    /// Convert an in-flight key to its storable form.
    pub fn save(&self, address: &Address, key: &Key) -> Result<StorableKey> {
        let value = match key.material() {
            KeyMaterial::Local(secret) => {
                let master_secret = self.master_secret.as_ref().ok_or_else(|| {
                    KeyError::Encoding("no master secret configured for local keys".into())
                })?;
                let kek = master_secret
                    .key_encryption_key()
                    .map_err(|e| KeyError::Encoding(format!("master secret unavailable: {e}")))?;
                envelope_encrypt(&kek, secret)?
            }
            KeyMaterial::Remote(resource_id) => resource_id.as_str().as_bytes().to_vec(),
        };

        Ok(StorableKey::new(
            address.clone(),
            key.index(),
            key.key_type().as_str(),
            value,
        ))
    }

    /// Convert a stored key back to an in-flight key.
    ///
    /// # Errors
    ///
    /// - [`KeyError::UnsupportedKeyType`] for an unknown type tag
    /// - [`KeyError::Decryption`] for corrupt, tampered, or foreign
    ///   ciphertext, or an unreadable resource id
    pub fn load(&self, stored: &StorableKey) -> Result<Key> {
        let key_type = stored.key_type.parse::<KeyType>().map_err(|e| {
            error!(
                address = %stored.account_address,
                index = stored.index,
                key_type = %stored.key_type,
                "Stored key has unsupported type"
            );
            e
        })?;

        match key_type {
            KeyType::Local => {
                let secret = self.decrypt(stored).map_err(|e| {
                    error!(
                        address = %stored.account_address,
                        index = stored.index,
                        error = %e,
                        "Failed to decrypt stored key"
                    );
                    e
                })?;
                Ok(Key::local(stored.index, secret))
            }
            KeyType::Remote => {
                let resource_id = std::str::from_utf8(stored.value_bytes())
                    .map_err(|e| KeyError::Decryption(format!("resource id is not UTF-8: {e}")))
                    .and_then(|s| {
                        ResourceId::parse(s).map_err(|e| KeyError::Decryption(e.to_string()))
                    })
                    .map_err(|e| {
                        warn!(
                            address = %stored.account_address,
                            index = stored.index,
                            "Stored remote key has malformed resource id"
                        );
                        e
                    })?;
                Ok(Key::remote(stored.index, resource_id))
            }
        }
    }

    fn decrypt(&self, stored: &StorableKey) -> Result<Zeroizing<Vec<u8>>> {
        let master_secret = self.master_secret.as_ref().ok_or_else(|| {
            KeyError::Decryption("no master secret configured for local keys".into())
        })?;
        let kek = master_secret
            .key_encryption_key()
            .map_err(|e| KeyError::Decryption(format!("master secret unavailable: {e}")))?;
        envelope_decrypt(&kek, stored.value_bytes())
    }
}
