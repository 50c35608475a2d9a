//! Key generation
//!
//! Produces a [`Wrapped`] pair: on-chain registration data plus the
//! in-flight key. Nothing is persisted here; the caller stores the key
//! through the key store before registering `chain_key` on-chain.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::crypto::generate_keypair;
use super::{HashAlgorithm, Key, KeyType, SignatureAlgorithm, Wrapped, FULL_WEIGHT};
use crate::chain::AccountKey;
use crate::kms::KmsClient;
use crate::types::{KeyError, Result};

/// Application defaults applied by [`KeyGenerator::generate_default`].
#[derive(Debug, Clone)]
pub struct KeyDefaults {
    pub key_type: KeyType,
    pub index: u32,
    pub weight: u32,
    pub sign_algo: SignatureAlgorithm,
    pub hash_algo: HashAlgorithm,
    /// Key ring for remote keys (required when `key_type` is remote)
    pub key_ring: Option<String>,
    /// Upper bound on remote key creation
    pub remote_timeout: Duration,
}

impl Default for KeyDefaults {
    fn default() -> Self {
        Self {
            key_type: KeyType::Local,
            index: 0,
            weight: FULL_WEIGHT,
            sign_algo: SignatureAlgorithm::EcdsaSecp256k1,
            hash_algo: HashAlgorithm::Sha3_256,
            key_ring: None,
            remote_timeout: Duration::from_secs(10),
        }
    }
}

/// Generates new account keys.
pub struct KeyGenerator {
    defaults: KeyDefaults,
    kms: Option<Arc<dyn KmsClient>>,
}

impl KeyGenerator {
    pub fn new(defaults: KeyDefaults, kms: Option<Arc<dyn KmsClient>>) -> Self {
        Self { defaults, kms }
    }

    pub fn defaults(&self) -> &KeyDefaults {
        &self.defaults
    }

    /// Generate a new key bound to `index` with signing `weight`.
    pub async fn generate(&self, index: u32, weight: u32) -> Result<Wrapped> {
        if weight > FULL_WEIGHT {
            return Err(KeyError::Generation(format!(
                "weight {weight} exceeds maximum {FULL_WEIGHT}"
            )));
        }

        let sign_algo = self.defaults.sign_algo;
        let hash_algo = self.defaults.hash_algo;

        let (account_key, public_key) = match self.defaults.key_type {
            KeyType::Local => {
                let (secret, public_key) = generate_keypair(sign_algo)?;
                (Key::local(index, secret), public_key)
            }
            KeyType::Remote => {
                let remote = self.create_remote(sign_algo, hash_algo).await?;
                (Key::remote(index, remote.resource_id), remote.public_key)
            }
        };

        debug!(
            index,
            weight,
            key_type = %account_key.key_type(),
            sign_algo = %sign_algo,
            "Generated account key"
        );

        Ok(Wrapped {
            chain_key: AccountKey {
                index,
                public_key,
                sign_algo,
                hash_algo,
                weight,
                sequence_number: 0,
                revoked: false,
            },
            account_key,
        })
    }

    /// Generate a new key using application defaults.
    ///
    /// The key always carries the configured default index. If that index
    /// is taken, [`KeyManager::store_key`](crate::KeyManager::store_key)
    /// moves it to the next free one and updates `chain_key` to match, so
    /// register `chain_key` on-chain only after storing.
    pub async fn generate_default(&self) -> Result<Wrapped> {
        self.generate(self.defaults.index, self.defaults.weight).await
    }

    async fn create_remote(
        &self,
        sign_algo: SignatureAlgorithm,
        hash_algo: HashAlgorithm,
    ) -> Result<crate::kms::RemoteKey> {
        let kms = self
            .kms
            .as_ref()
            .ok_or_else(|| KeyError::Config("remote key type requires a KMS client".into()))?;
        let key_ring = self
            .defaults
            .key_ring
            .as_deref()
            .ok_or_else(|| KeyError::Config("remote key type requires a key ring".into()))?;

        let timeout = self.defaults.remote_timeout;
        match tokio::time::timeout(timeout, kms.create_key(key_ring, sign_algo, hash_algo)).await {
            Err(_) => Err(KeyError::Timeout {
                operation: "remote key creation",
                after: timeout,
            }),
            Ok(Err(e @ KeyError::Timeout { .. })) => Err(e),
            Ok(Err(e)) => Err(KeyError::Generation(format!("remote key creation failed: {e}"))),
            Ok(Ok(remote)) => Ok(remote),
        }
    }
}
