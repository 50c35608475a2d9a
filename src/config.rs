//! Configuration for account key management
//!
//! CLI arguments and environment variable handling using clap. A host
//! binary embeds [`KeysArgs`] with `#[command(flatten)]` and hands the
//! result of [`KeysArgs::into_config`] to the key manager.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::keys::{
    HashAlgorithm, KeyDefaults, KeyType, MasterSecret, PassphraseMasterSecret,
    SignatureAlgorithm, StaticMasterSecret, FULL_WEIGHT,
};
use crate::types::{Address, KeyError, Result};

/// Account key management settings
#[derive(Parser, Debug, Clone)]
#[command(name = "account-keys")]
#[command(about = "Account key lifecycle and transaction authorizer resolution")]
pub struct KeysArgs {
    /// Address of the service (admin) account
    #[arg(long, env = "ADMIN_ADDRESS")]
    pub admin_address: String,

    /// Backend for newly generated keys (local, google_kms)
    #[arg(long, env = "DEFAULT_KEY_TYPE", default_value = "local")]
    pub default_key_type: String,

    /// Key index used by GenerateDefault
    #[arg(long, env = "DEFAULT_KEY_INDEX", default_value = "0")]
    pub default_key_index: u32,

    /// Key weight used by GenerateDefault (1000 = full authority)
    #[arg(long, env = "DEFAULT_KEY_WEIGHT", default_value = "1000")]
    pub default_key_weight: u32,

    /// Signature algorithm (ECDSA_secp256k1, ED25519)
    #[arg(long, env = "DEFAULT_SIGN_ALGO", default_value = "ECDSA_secp256k1")]
    pub default_sign_algo: String,

    /// Hash algorithm (SHA3_256, SHA2_256)
    #[arg(long, env = "DEFAULT_HASH_ALGO", default_value = "SHA3_256")]
    pub default_hash_algo: String,

    /// Upper bound on key indices per account
    #[arg(long, env = "MAX_KEYS_PER_ACCOUNT", default_value = "100")]
    pub max_keys_per_account: u32,

    /// Base64-encoded 32-byte master secret for local keys
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Passphrase for deriving the master secret (alternative to ENCRYPTION_KEY)
    #[arg(long, env = "ENCRYPTION_PASSPHRASE", hide_env_values = true)]
    pub encryption_passphrase: Option<String>,

    /// Salt for passphrase derivation (at least 16 bytes)
    #[arg(long, env = "ENCRYPTION_SALT")]
    pub encryption_salt: Option<String>,

    /// Google KMS key ring for remote keys
    /// (projects/*/locations/*/keyRings/*)
    #[arg(long, env = "GOOGLE_KMS_KEY_RING")]
    pub google_kms_key_ring: Option<String>,

    /// Timeout for on-chain account queries in milliseconds
    #[arg(long, env = "CHAIN_QUERY_TIMEOUT_MS", default_value = "10000")]
    pub chain_query_timeout_ms: u64,

    /// Timeout for remote KMS calls in milliseconds
    #[arg(long, env = "REMOTE_SIGN_TIMEOUT_MS", default_value = "10000")]
    pub remote_sign_timeout_ms: u64,

    /// Attempts at claiming a free key index before giving up
    #[arg(long, env = "SAVE_MAX_ATTEMPTS", default_value = "5")]
    pub save_max_attempts: u32,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "account_keys")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl KeysArgs {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        Address::parse(&self.admin_address).map_err(|e| format!("ADMIN_ADDRESS: {e}"))?;

        let key_type = self
            .default_key_type
            .parse::<KeyType>()
            .map_err(|e| format!("DEFAULT_KEY_TYPE: {e}"))?;
        self.default_sign_algo
            .parse::<SignatureAlgorithm>()
            .map_err(|e| format!("DEFAULT_SIGN_ALGO: {e}"))?;
        self.default_hash_algo
            .parse::<HashAlgorithm>()
            .map_err(|e| format!("DEFAULT_HASH_ALGO: {e}"))?;

        if self.default_key_weight == 0 || self.default_key_weight > FULL_WEIGHT {
            return Err(format!("DEFAULT_KEY_WEIGHT must be between 1 and {FULL_WEIGHT}"));
        }

        if self.default_key_index >= self.max_keys_per_account {
            return Err("DEFAULT_KEY_INDEX must be less than MAX_KEYS_PER_ACCOUNT".to_string());
        }

        if self.save_max_attempts == 0 {
            return Err("SAVE_MAX_ATTEMPTS must be at least 1".to_string());
        }

        if self.chain_query_timeout_ms == 0 || self.remote_sign_timeout_ms == 0 {
            return Err("Timeouts must be greater than zero".to_string());
        }

        if self.encryption_key.is_some() && self.encryption_passphrase.is_some() {
            return Err("Set only one of ENCRYPTION_KEY or ENCRYPTION_PASSPHRASE".to_string());
        }

        if self.encryption_passphrase.is_some() && self.encryption_salt.is_none() {
            return Err("ENCRYPTION_SALT is required with ENCRYPTION_PASSPHRASE".to_string());
        }

        match key_type {
            KeyType::Local => {
                if self.encryption_key.is_none() && self.encryption_passphrase.is_none() {
                    return Err(
                        "ENCRYPTION_KEY or ENCRYPTION_PASSPHRASE is required for local keys"
                            .to_string(),
                    );
                }
            }
            KeyType::Remote => {
                if self.google_kms_key_ring.is_none() {
                    return Err("GOOGLE_KMS_KEY_RING is required for google_kms keys".to_string());
                }
            }
        }

        Ok(())
    }

    /// Validate and convert into the typed configuration.
    pub fn into_config(&self) -> Result<KeysConfig> {
        self.validate().map_err(KeyError::Config)?;

        let remote_timeout = Duration::from_millis(self.remote_sign_timeout_ms);
        Ok(KeysConfig {
            admin_address: Address::parse(&self.admin_address)?,
            defaults: KeyDefaults {
                key_type: self.default_key_type.parse()?,
                index: self.default_key_index,
                weight: self.default_key_weight,
                sign_algo: self.default_sign_algo.parse()?,
                hash_algo: self.default_hash_algo.parse()?,
                key_ring: self.google_kms_key_ring.clone(),
                remote_timeout,
            },
            max_keys_per_account: self.max_keys_per_account,
            chain_query_timeout: Duration::from_millis(self.chain_query_timeout_ms),
            remote_sign_timeout: remote_timeout,
            save_max_attempts: self.save_max_attempts,
        })
    }

    /// Build the configured master secret, if any.
    ///
    /// Passphrase derivation runs Argon2id; call this once at startup.
    pub fn master_secret(&self) -> Result<Option<Arc<dyn MasterSecret>>> {
        if let Some(encoded) = &self.encryption_key {
            let secret = StaticMasterSecret::from_base64(encoded)?;
            return Ok(Some(Arc::new(secret)));
        }

        match (&self.encryption_passphrase, &self.encryption_salt) {
            (Some(passphrase), Some(salt)) => {
                let secret = PassphraseMasterSecret::derive(passphrase, salt.as_bytes())?;
                Ok(Some(Arc::new(secret)))
            }
            (Some(_), None) => Err(KeyError::Config(
                "ENCRYPTION_SALT is required with ENCRYPTION_PASSPHRASE".into(),
            )),
            _ => Ok(None),
        }
    }
}

/// Typed settings consumed by [`KeyManager`](crate::KeyManager)
#[derive(Debug, Clone)]
pub struct KeysConfig {
    pub admin_address: Address,
    pub defaults: KeyDefaults,
    pub max_keys_per_account: u32,
    pub chain_query_timeout: Duration,
    pub remote_sign_timeout: Duration,
    pub save_max_attempts: u32,
}

impl KeysConfig {
    /// Settings with default values for everything but the admin account
    pub fn new(admin_address: Address) -> Self {
        Self {
            admin_address,
            defaults: KeyDefaults::default(),
            max_keys_per_account: 100,
            chain_query_timeout: Duration::from_secs(10),
            remote_sign_timeout: Duration::from_secs(10),
            save_max_attempts: 5,
        }
    }
}
