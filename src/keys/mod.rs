//! Account key lifecycle
//!
//! Keys exist in two shapes:
//! - [`Key`]: "in flight", holding plaintext private key material or a
//!   remote resource reference. It has no serialization path, so it can
//!   never be written to storage by accident.
//! - [`StorableKey`](crate::db::schemas::StorableKey): what the database
//!   holds, with the value encrypted (local) or reduced to the remote
//!   resource id (Google KMS).
//!
//! The [`KeyCodec`] converts between the two and the [`KeyGenerator`]
//! produces fresh pairs.

pub mod codec;
pub mod crypto;
pub mod generator;
pub mod master_secret;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::chain::AccountKey;
use crate::kms::ResourceId;
use crate::types::KeyError;

pub use codec::KeyCodec;
pub use generator::{KeyDefaults, KeyGenerator};
pub use master_secret::{MasterSecret, PassphraseMasterSecret, StaticMasterSecret};
pub use store::{lowest_free_index, InMemoryKeyStore, KeyStore, MongoKeyStore};

/// Stored type tag for locally encrypted keys
pub const KEY_TYPE_LOCAL: &str = "local";

/// Stored type tag for keys held in Google Cloud KMS
pub const KEY_TYPE_GOOGLE_KMS: &str = "google_kms";

/// Full signing authority for a single-key account
pub const FULL_WEIGHT: u32 = 1000;

// =============================================================================
// Key Type
// =============================================================================

/// Backend that holds the private key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Encrypted with the master secret and stored by this crate
    Local,
    /// Held by a remote key management service; only the resource id is stored
    Remote,
}

impl KeyType {
    /// Stored type tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => KEY_TYPE_LOCAL,
            Self::Remote => KEY_TYPE_GOOGLE_KMS,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            KEY_TYPE_LOCAL => Ok(Self::Local),
            KEY_TYPE_GOOGLE_KMS => Ok(Self::Remote),
            other => Err(KeyError::UnsupportedKeyType(other.to_string())),
        }
    }
}

// =============================================================================
// Algorithms
// =============================================================================

/// Signature algorithm of an account key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "ECDSA_secp256k1")]
    EcdsaSecp256k1,
    #[serde(rename = "ED25519")]
    Ed25519,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdsaSecp256k1 => "ECDSA_secp256k1",
            Self::Ed25519 => "ED25519",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECDSA_secp256k1" => Ok(Self::EcdsaSecp256k1),
            "ED25519" => Ok(Self::Ed25519),
            other => Err(KeyError::Config(format!(
                "unknown signature algorithm '{other}'"
            ))),
        }
    }
}

/// Hash algorithm applied to messages before ECDSA signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA3_256")]
    Sha3_256,
    #[serde(rename = "SHA2_256")]
    Sha2_256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha3_256 => "SHA3_256",
            Self::Sha2_256 => "SHA2_256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHA3_256" => Ok(Self::Sha3_256),
            "SHA2_256" => Ok(Self::Sha2_256),
            other => Err(KeyError::Config(format!("unknown hash algorithm '{other}'"))),
        }
    }
}

// =============================================================================
// In-flight Key
// =============================================================================

/// Private key material or a reference to it.
///
/// Local secrets are wiped from memory when dropped.
pub enum KeyMaterial {
    Local(Zeroizing<Vec<u8>>),
    Remote(ResourceId),
}

/// An "in flight" account key.
///
/// Implements neither `Serialize` nor `Clone`; plaintext only leaves this
/// type through [`KeyCodec::save`].
pub struct Key {
    index: u32,
    material: KeyMaterial,
}

impl Key {
    /// A locally held private key
    pub fn local(index: u32, secret: Zeroizing<Vec<u8>>) -> Self {
        Self {
            index,
            material: KeyMaterial::Local(secret),
        }
    }

    /// A key held by the remote key management service
    pub fn remote(index: u32, resource_id: ResourceId) -> Self {
        Self {
            index,
            material: KeyMaterial::Remote(resource_id),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn key_type(&self) -> KeyType {
        match self.material {
            KeyMaterial::Local(_) => KeyType::Local,
            KeyMaterial::Remote(_) => KeyType::Remote,
        }
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Consume the key, handing its material to a signer.
    pub fn into_material(self) -> KeyMaterial {
        self.material
    }

    pub(crate) fn set_index(&mut self, index: u32) {
        self.index = index;
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match &self.material {
            KeyMaterial::Local(_) => "<redacted>".to_string(),
            KeyMaterial::Remote(id) => id.to_string(),
        };
        f.debug_struct("Key")
            .field("index", &self.index)
            .field("type", &self.key_type())
            .field("value", &value)
            .finish()
    }
}

// =============================================================================
// Wrapped
// =============================================================================

/// A freshly generated key together with its on-chain registration data.
///
/// The caller registers `chain_key` on-chain and persists `account_key`
/// through [`KeyManager::store_key`](crate::KeyManager::store_key).
#[derive(Debug)]
pub struct Wrapped {
    pub chain_key: AccountKey,
    pub account_key: Key,
}

impl Wrapped {
    /// Move both halves to a different key index.
    pub(crate) fn set_index(&mut self, index: u32) {
        self.chain_key.index = index;
        self.account_key.set_index(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_type_tags() {
        assert_eq!("local".parse::<KeyType>().unwrap(), KeyType::Local);
        assert_eq!("google_kms".parse::<KeyType>().unwrap(), KeyType::Remote);
        assert_eq!(KeyType::Remote.to_string(), KEY_TYPE_GOOGLE_KMS);

        let err = "aws_kms".parse::<KeyType>().unwrap_err();
        assert!(matches!(err, KeyError::UnsupportedKeyType(t) if t == "aws_kms"));
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(
            "ECDSA_secp256k1".parse::<SignatureAlgorithm>().unwrap(),
            SignatureAlgorithm::EcdsaSecp256k1
        );
        assert_eq!(
            "SHA2_256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha2_256
        );
        assert!("ECDSA_P384".parse::<SignatureAlgorithm>().is_err());

        let json = serde_json::to_string(&SignatureAlgorithm::Ed25519).unwrap();
        assert_eq!(json, "\"ED25519\"");
    }

    #[test]
    fn test_debug_redacts_local_material() {
        let key = Key::local(3, Zeroizing::new(vec![0xAB; 32]));
        let printed = format!("{:?}", key);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.to_lowercase().contains("abab"));
        assert!(!printed.contains("171"));
    }
}
