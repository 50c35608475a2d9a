//! Transaction signers
//!
//! A signer is built from a loaded [`Key`](crate::keys::Key): local keys
//! sign in-process, remote keys delegate to the KMS under a deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use zeroize::Zeroizing;

use crate::keys::crypto::{public_key_from_private, sign_message};
use crate::keys::{HashAlgorithm, KeyType, SignatureAlgorithm};
use crate::kms::{KmsClient, ResourceId};
use crate::types::{KeyError, Result};

/// Signs with a private key held in memory.
pub struct LocalSigner {
    sign_algo: SignatureAlgorithm,
    hash_algo: HashAlgorithm,
    secret: Zeroizing<Vec<u8>>,
}

impl LocalSigner {
    pub fn new(
        sign_algo: SignatureAlgorithm,
        hash_algo: HashAlgorithm,
        secret: Zeroizing<Vec<u8>>,
    ) -> Self {
        Self {
            sign_algo,
            hash_algo,
            secret,
        }
    }

    /// Public key matching the held secret
    pub fn public_key(&self) -> Result<Vec<u8>> {
        public_key_from_private(self.sign_algo, &self.secret)
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        sign_message(self.sign_algo, self.hash_algo, &self.secret, message)
    }
}

/// Signs through the remote key management service.
pub struct RemoteSigner {
    resource_id: ResourceId,
    client: Arc<dyn KmsClient>,
    timeout: Duration,
}

impl RemoteSigner {
    pub fn new(resource_id: ResourceId, client: Arc<dyn KmsClient>, timeout: Duration) -> Self {
        Self {
            resource_id,
            client,
            timeout,
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub async fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.timeout, self.client.sign(&self.resource_id, message)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    resource_id = %self.resource_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Remote signing timed out"
                );
                Err(KeyError::Timeout {
                    operation: "remote sign",
                    after: self.timeout,
                })
            }
        }
    }
}

/// A capability that produces signatures for one account key.
pub enum Signer {
    Local(LocalSigner),
    Remote(RemoteSigner),
}

impl Signer {
    pub async fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Local(signer) => signer.sign(message),
            Self::Remote(signer) => signer.sign(message).await,
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Local(_) => KeyType::Local,
            Self::Remote(_) => KeyType::Remote,
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(signer) => f
                .debug_struct("LocalSigner")
                .field("sign_algo", &signer.sign_algo)
                .field("hash_algo", &signer.hash_algo)
                .field("secret", &"<redacted>")
                .finish(),
            Self::Remote(signer) => f
                .debug_struct("RemoteSigner")
                .field("resource_id", &signer.resource_id)
                .field("timeout", &signer.timeout)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::crypto::{generate_keypair, verify_signature};
    use crate::kms::RemoteKey;

    const RESOURCE: &str =
        "projects/wallet/locations/global/keyRings/accounts/cryptoKeys/admin/cryptoKeyVersions/1";

    struct SlowKms {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl KmsClient for SlowKms {
        async fn create_key(
            &self,
            _key_ring: &str,
            _sign_algo: SignatureAlgorithm,
            _hash_algo: HashAlgorithm,
        ) -> Result<RemoteKey> {
            Err(KeyError::Generation("not supported".into()))
        }

        async fn sign(&self, _resource_id: &ResourceId, message: &[u8]) -> Result<Vec<u8>> {
            tokio::time::sleep(self.delay).await;
            Ok(message.iter().rev().copied().collect())
        }

        async fn key_exists(&self, _resource_id: &ResourceId) -> Result<bool> {
            Ok(true)
        }
    }

    fn remote(delay: Duration, timeout: Duration) -> Signer {
        Signer::Remote(RemoteSigner::new(
            ResourceId::parse(RESOURCE).unwrap(),
            Arc::new(SlowKms { delay }),
            timeout,
        ))
    }

    #[tokio::test]
    async fn test_local_signature_verifies() {
        for sign_algo in [SignatureAlgorithm::EcdsaSecp256k1, SignatureAlgorithm::Ed25519] {
            let (secret, public_key) = generate_keypair(sign_algo).unwrap();
            let local = LocalSigner::new(sign_algo, HashAlgorithm::Sha3_256, secret);
            assert_eq!(local.public_key().unwrap(), public_key);

            let signer = Signer::Local(local);
            let signature = signer.sign(b"transaction envelope").await.unwrap();
            assert!(verify_signature(
                sign_algo,
                HashAlgorithm::Sha3_256,
                &public_key,
                b"transaction envelope",
                &signature
            ));
        }
    }

    #[tokio::test]
    async fn test_remote_signs_through_client() {
        let signer = remote(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(signer.key_type(), KeyType::Remote);
        assert_eq!(signer.sign(b"abc").await.unwrap(), b"cba".to_vec());
    }

    #[tokio::test]
    async fn test_remote_sign_times_out() {
        let signer = remote(Duration::from_secs(5), Duration::from_millis(20));
        match signer.sign(b"abc").await {
            Err(KeyError::Timeout { operation, .. }) => assert_eq!(operation, "remote sign"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let signer = Signer::Local(LocalSigner::new(
            SignatureAlgorithm::EcdsaSecp256k1,
            HashAlgorithm::Sha3_256,
            Zeroizing::new(vec![0x5A; 32]),
        ));
        let printed = format!("{:?}", signer);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("90"));
    }
}
