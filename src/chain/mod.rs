//! Network collaborator boundary
//!
//! The blockchain client itself lives outside this crate; all the key
//! manager needs is the current on-chain key state of an account.

use serde::{Deserialize, Serialize};

use crate::keys::{HashAlgorithm, SignatureAlgorithm};
use crate::types::{Address, Result};

/// On-chain state of a single account key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKey {
    /// Position of the key on the account
    pub index: u32,

    /// Encoded public key
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,

    pub sign_algo: SignatureAlgorithm,

    pub hash_algo: HashAlgorithm,

    /// Share of signing authority (1000 = full)
    pub weight: u32,

    /// Proposal sequence number
    pub sequence_number: u64,

    pub revoked: bool,
}

impl AccountKey {
    /// Whether the key can currently authorize transactions
    pub fn is_active(&self) -> bool {
        !self.revoked
    }
}

/// An account as reported by the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub keys: Vec<AccountKey>,
}

/// Trait for querying on-chain account state (allows mocking in tests)
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch the account and its keys.
    ///
    /// Transport failures should be reported as
    /// [`KeyError::ChainQuery`](crate::KeyError::ChainQuery).
    async fn get_account(&self, address: &Address) -> Result<Account>;
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
