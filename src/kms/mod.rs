//! Remote key management boundary
//!
//! Keys of type `google_kms` never exist locally. This crate stores their
//! resource id and asks the KMS to create keys and produce signatures.

use std::fmt;
use std::str::FromStr;

use crate::keys::{HashAlgorithm, SignatureAlgorithm};
use crate::types::{KeyError, Result};

const RESOURCE_SEGMENTS: [&str; 5] = [
    "projects",
    "locations",
    "keyRings",
    "cryptoKeys",
    "cryptoKeyVersions",
];

/// A Google Cloud KMS crypto key version resource name:
/// `projects/*/locations/*/keyRings/*/cryptoKeys/*/cryptoKeyVersions/*`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn parse(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.split('/').collect();
        if parts.len() != RESOURCE_SEGMENTS.len() * 2 {
            return Err(KeyError::Encoding(format!(
                "invalid KMS resource id '{}': expected {} path segments",
                input,
                RESOURCE_SEGMENTS.len() * 2
            )));
        }

        for (pair, expected) in parts.chunks(2).zip(RESOURCE_SEGMENTS) {
            if pair[0] != expected || pair[1].is_empty() {
                return Err(KeyError::Encoding(format!(
                    "invalid KMS resource id '{}': expected '{}/<id>'",
                    input, expected
                )));
            }
        }

        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key ring this key version belongs to
    pub fn key_ring(&self) -> &str {
        // parse() guarantees at least six segments
        let end = self
            .0
            .match_indices('/')
            .nth(5)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A key pair created inside the KMS.
#[derive(Debug, Clone)]
pub struct RemoteKey {
    pub resource_id: ResourceId,
    /// Encoded public key, same encoding as locally generated keys
    pub public_key: Vec<u8>,
}

/// Trait for the remote signing service (allows mocking in tests)
#[async_trait::async_trait]
pub trait KmsClient: Send + Sync {
    /// Create a new asymmetric signing key in `key_ring`.
    async fn create_key(
        &self,
        key_ring: &str,
        sign_algo: SignatureAlgorithm,
        hash_algo: HashAlgorithm,
    ) -> Result<RemoteKey>;

    /// Sign `message` with the key version `resource_id`.
    async fn sign(&self, resource_id: &ResourceId, message: &[u8]) -> Result<Vec<u8>>;

    /// Check that the key version exists and is enabled.
    async fn key_exists(&self, resource_id: &ResourceId) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str =
        "projects/wallet/locations/global/keyRings/accounts/cryptoKeys/user-1/cryptoKeyVersions/1";

    #[test]
    fn test_parse_valid() {
        let id = ResourceId::parse(VALID).unwrap();
        assert_eq!(id.as_str(), VALID);
        assert_eq!(
            id.key_ring(),
            "projects/wallet/locations/global/keyRings/accounts"
        );
    }

    #[test]
    fn test_parse_invalid() {
        for bad in [
            "",
            "projects/wallet",
            "projects/wallet/locations/global/keyRings/accounts/cryptoKeys/user-1",
            "projects//locations/global/keyRings/accounts/cryptoKeys/user-1/cryptoKeyVersions/1",
            "project/wallet/locations/global/keyRings/accounts/cryptoKeys/user-1/cryptoKeyVersions/1",
        ] {
            assert!(ResourceId::parse(bad).is_err(), "accepted '{bad}'");
        }
    }
}
