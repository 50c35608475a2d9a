//! Key manager facade
//!
//! Bundles the generator, codec, key store and network collaborators
//! behind the operations an application uses: generate keys, persist
//! them, and resolve authorizers for the admin account or a user.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::authorizer::{select_key, Authorizer, LocalSigner, RemoteSigner, Signer};
use crate::chain::{Account, AccountKey, ChainClient};
use crate::config::{KeysArgs, KeysConfig};
use crate::db::{MongoClient, StorableKey};
use crate::keys::store::store_with_retry;
use crate::keys::{
    Key, KeyCodec, KeyGenerator, KeyMaterial, KeyStore, KeyType, MongoKeyStore, Wrapped,
};
use crate::kms::{KmsClient, ResourceId};
use crate::types::{Address, KeyError, Result};

/// Account key lifecycle and authorizer resolution.
pub struct KeyManager {
    config: KeysConfig,
    codec: KeyCodec,
    generator: KeyGenerator,
    store: Arc<dyn KeyStore>,
    chain: Arc<dyn ChainClient>,
    kms: Option<Arc<dyn KmsClient>>,
}

impl KeyManager {
    pub fn new(
        config: KeysConfig,
        codec: KeyCodec,
        store: Arc<dyn KeyStore>,
        chain: Arc<dyn ChainClient>,
        kms: Option<Arc<dyn KmsClient>>,
    ) -> Self {
        let generator = KeyGenerator::new(config.defaults.clone(), kms.clone());
        Self {
            config,
            codec,
            generator,
            store,
            chain,
            kms,
        }
    }

    /// Build a manager backed by MongoDB from CLI/env settings.
    pub async fn connect(
        args: &KeysArgs,
        chain: Arc<dyn ChainClient>,
        kms: Option<Arc<dyn KmsClient>>,
    ) -> Result<Self> {
        let config = args.into_config()?;
        let codec = match args.master_secret()? {
            Some(secret) => KeyCodec::new(secret),
            None => KeyCodec::remote_only(),
        };

        let mongo = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
        let store = MongoKeyStore::new(&mongo).await?;

        info!(
            admin_address = %config.admin_address,
            key_type = %config.defaults.key_type,
            db = mongo.db_name(),
            "Key manager ready"
        );

        Ok(Self::new(config, codec, Arc::new(store), chain, kms))
    }

    pub fn config(&self) -> &KeysConfig {
        &self.config
    }

    // =========================================================================
    // Key Generator
    // =========================================================================

    /// Generate a new key with explicit `index` and `weight`.
    pub async fn generate(&self, index: u32, weight: u32) -> Result<Wrapped> {
        if index >= self.config.max_keys_per_account {
            return Err(KeyError::Generation(format!(
                "index {index} is outside 0..{}",
                self.config.max_keys_per_account
            )));
        }
        self.generator.generate(index, weight).await
    }

    /// Generate a new key using the configured defaults.
    ///
    /// The returned index is provisional until [`store_key`](Self::store_key)
    /// claims it.
    pub async fn generate_default(&self) -> Result<Wrapped> {
        self.generator.generate_default().await
    }

    // =========================================================================
    // Key Codec
    // =========================================================================

    /// Convert a key into its storable form for `address`.
    pub fn save(&self, address: &Address, key: &Key) -> Result<StorableKey> {
        self.codec.save(address, key)
    }

    /// Convert a stored row back into a key.
    pub fn load(&self, stored: &StorableKey) -> Result<Key> {
        self.codec.load(stored)
    }

    // =========================================================================
    // Key Store
    // =========================================================================

    /// Persist a freshly generated key for `address`.
    ///
    /// On an index collision the key moves to the lowest free index and
    /// `wrapped` is updated to match. Register `wrapped.chain_key`
    /// on-chain only after this returns.
    pub async fn store_key(&self, address: &Address, wrapped: &mut Wrapped) -> Result<StorableKey> {
        if let KeyMaterial::Remote(resource_id) = wrapped.account_key.material() {
            self.ensure_remote_key(resource_id).await?;
        }

        store_with_retry(
            self.store.as_ref(),
            &self.codec,
            address,
            wrapped,
            self.config.save_max_attempts,
            self.config.max_keys_per_account,
        )
        .await
    }

    /// Soft-delete the key at `index`. The row is retained for audit.
    pub async fn delete_key(&self, address: &Address, index: u32) -> Result<bool> {
        let deleted = self.store.soft_delete(address, index).await?;
        if deleted {
            info!(address = %address, index, "Soft-deleted account key");
        } else {
            debug!(address = %address, index, "No live key to delete");
        }
        Ok(deleted)
    }

    // =========================================================================
    // Authorizer Resolver
    // =========================================================================

    /// Authorizer for the configured admin (service) account.
    pub async fn admin_authorizer(&self) -> Result<Authorizer> {
        self.resolve(&self.config.admin_address).await
    }

    /// Authorizer for a user account.
    pub async fn user_authorizer(&self, address: &Address) -> Result<Authorizer> {
        self.resolve(address).await
    }

    async fn resolve(&self, address: &Address) -> Result<Authorizer> {
        let rows = self
            .store
            .list_active(address)
            .await
            .map_err(|e| match e {
                KeyError::Decryption(_) => KeyError::resolution(e),
                other => other,
            })?;
        if rows.is_empty() {
            warn!(address = %address, "No stored keys for account");
            return Err(KeyError::NoKeysAvailable {
                address: address.to_string(),
            });
        }

        let account = self.fetch_account(address).await?;

        let Some((row, chain_key)) = select_key(&rows, &account.keys) else {
            warn!(
                address = %address,
                stored = rows.len(),
                on_chain = account.keys.len(),
                "No stored key matches an active on-chain key"
            );
            return Err(KeyError::NoKeysAvailable {
                address: address.to_string(),
            });
        };

        let key = self.codec.load(row).map_err(KeyError::resolution)?;
        let signer = self
            .build_signer(address, key, chain_key)
            .map_err(KeyError::resolution)?;

        debug!(
            address = %address,
            index = chain_key.index,
            key_type = %signer.key_type(),
            sequence_number = chain_key.sequence_number,
            "Resolved authorizer"
        );

        Ok(Authorizer {
            address: address.clone(),
            key: chain_key.clone(),
            signer,
        })
    }

    async fn fetch_account(&self, address: &Address) -> Result<Account> {
        let timeout = self.config.chain_query_timeout;
        match tokio::time::timeout(timeout, self.chain.get_account(address)).await {
            Ok(Ok(account)) => Ok(account),
            Ok(Err(e @ (KeyError::ChainQuery(_) | KeyError::Timeout { .. }))) => Err(e),
            Ok(Err(e)) => Err(KeyError::ChainQuery(e.to_string())),
            Err(_) => {
                warn!(
                    address = %address,
                    timeout_ms = timeout.as_millis() as u64,
                    "Chain query timed out"
                );
                Err(KeyError::Timeout {
                    operation: "chain query",
                    after: timeout,
                })
            }
        }
    }

    /// Turn a loaded key into a signer for `chain_key`.
    ///
    /// Consumes the key so decrypted material moves into the signer or is
    /// dropped (and wiped) on error.
    fn build_signer(&self, address: &Address, key: Key, chain_key: &AccountKey) -> Result<Signer> {
        match key.into_material() {
            KeyMaterial::Local(secret) => {
                let signer = LocalSigner::new(chain_key.sign_algo, chain_key.hash_algo, secret);
                if signer.public_key()? != chain_key.public_key {
                    return Err(KeyError::KeyMismatch {
                        address: address.to_string(),
                        index: chain_key.index,
                    });
                }
                Ok(Signer::Local(signer))
            }
            KeyMaterial::Remote(resource_id) => {
                let client = self.kms.clone().ok_or_else(|| {
                    KeyError::Config(format!(
                        "{} key at index {} needs a KMS client",
                        KeyType::Remote,
                        chain_key.index
                    ))
                })?;
                Ok(Signer::Remote(RemoteSigner::new(
                    resource_id,
                    client,
                    self.config.remote_sign_timeout,
                )))
            }
        }
    }

    async fn ensure_remote_key(&self, resource_id: &ResourceId) -> Result<()> {
        let kms = self
            .kms
            .as_ref()
            .ok_or_else(|| KeyError::Encoding("remote key requires a KMS client".into()))?;

        let timeout = self.config.remote_sign_timeout;
        let exists = tokio::time::timeout(timeout, kms.key_exists(resource_id))
            .await
            .map_err(|_| KeyError::Timeout {
                operation: "remote key lookup",
                after: timeout,
            })??;

        if !exists {
            return Err(KeyError::Encoding(format!(
                "remote key {resource_id} does not exist"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::keys::{InMemoryKeyStore, KeyDefaults, StaticMasterSecret};
    use crate::kms::RemoteKey;
    use crate::keys::{HashAlgorithm, SignatureAlgorithm};
    use tokio::sync::RwLock;

    const KEY_RING: &str = "projects/wallet/locations/global/keyRings/accounts";

    /// Chain client serving whatever keys the test registers
    #[derive(Default)]
    struct MockChain {
        keys: RwLock<Vec<(Address, AccountKey)>>,
    }

    impl MockChain {
        async fn register(&self, address: &Address, key: AccountKey) {
            self.keys.write().await.push((address.clone(), key));
        }

        async fn revoke(&self, address: &Address, index: u32) {
            for (owner, key) in self.keys.write().await.iter_mut() {
                if owner == address && key.index == index {
                    key.revoked = true;
                }
            }
        }
    }

    #[async_trait::async_trait]
    impl ChainClient for MockChain {
        async fn get_account(&self, address: &Address) -> Result<Account> {
            let keys = self
                .keys
                .read()
                .await
                .iter()
                .filter(|(owner, _)| owner == address)
                .map(|(_, key)| key.clone())
                .collect();
            Ok(Account {
                address: address.clone(),
                keys,
            })
        }
    }

    struct FailingChain;

    #[async_trait::async_trait]
    impl ChainClient for FailingChain {
        async fn get_account(&self, _address: &Address) -> Result<Account> {
            Err(KeyError::Database("access node unavailable".into()))
        }
    }

    struct StalledChain;

    #[async_trait::async_trait]
    impl ChainClient for StalledChain {
        async fn get_account(&self, _address: &Address) -> Result<Account> {
            std::future::pending().await
        }
    }

    /// Store whose rows cannot be decoded
    struct CorruptStore;

    #[async_trait::async_trait]
    impl KeyStore for CorruptStore {
        async fn insert(&self, key: StorableKey) -> Result<StorableKey> {
            Ok(key)
        }

        async fn list_active(&self, _address: &Address) -> Result<Vec<StorableKey>> {
            Err(KeyError::Decryption("undecodable stored document".into()))
        }

        async fn soft_delete(&self, _address: &Address, _index: u32) -> Result<bool> {
            Ok(false)
        }
    }

    #[derive(Default)]
    struct MockKms {
        missing: bool,
    }

    #[async_trait::async_trait]
    impl KmsClient for MockKms {
        async fn create_key(
            &self,
            key_ring: &str,
            _sign_algo: SignatureAlgorithm,
            _hash_algo: HashAlgorithm,
        ) -> Result<RemoteKey> {
            Ok(RemoteKey {
                resource_id: ResourceId::parse(&format!(
                    "{key_ring}/cryptoKeys/k/cryptoKeyVersions/1"
                ))?,
                public_key: vec![7u8; 64],
            })
        }

        async fn sign(&self, _resource_id: &ResourceId, _message: &[u8]) -> Result<Vec<u8>> {
            Ok(vec![1u8; 64])
        }

        async fn key_exists(&self, _resource_id: &ResourceId) -> Result<bool> {
            Ok(!self.missing)
        }
    }

    fn admin() -> Address {
        Address::parse("0xf8d6e0586b0a20c7").unwrap()
    }

    fn user() -> Address {
        Address::parse("0x01cf0e2f2f715450").unwrap()
    }

    fn config() -> KeysConfig {
        let mut config = KeysConfig::new(admin());
        config.chain_query_timeout = Duration::from_millis(50);
        config
    }

    fn manager_with(
        config: KeysConfig,
        chain: Arc<dyn ChainClient>,
        kms: Option<Arc<dyn KmsClient>>,
    ) -> (KeyManager, Arc<InMemoryKeyStore>) {
        let store = Arc::new(InMemoryKeyStore::new());
        let codec = KeyCodec::new(Arc::new(StaticMasterSecret::new([3u8; 32])));
        let manager = KeyManager::new(config, codec, store.clone(), chain, kms);
        (manager, store)
    }

    async fn provision(manager: &KeyManager, chain: &MockChain, address: &Address, index: u32) {
        let mut wrapped = manager.generate(index, 1000).await.unwrap();
        manager.store_key(address, &mut wrapped).await.unwrap();
        chain.register(address, wrapped.chain_key.clone()).await;
    }

    #[tokio::test]
    async fn test_admin_authorizer_signs() {
        let chain = Arc::new(MockChain::default());
        let (manager, _) = manager_with(config(), chain.clone(), None);
        provision(&manager, &chain, &admin(), 0).await;

        let authorizer = manager.admin_authorizer().await.unwrap();
        assert_eq!(authorizer.address, admin());
        assert_eq!(authorizer.key_index(), 0);
        assert_eq!(authorizer.key_type(), KeyType::Local);

        let signature = authorizer.sign(b"tx").await.unwrap();
        assert!(crate::keys::crypto::verify_signature(
            authorizer.key.sign_algo,
            authorizer.key.hash_algo,
            &authorizer.key.public_key,
            b"tx",
            &signature
        ));
    }

    #[tokio::test]
    async fn test_no_rows_is_no_keys_available() {
        let chain = Arc::new(MockChain::default());
        let (manager, _) = manager_with(config(), chain, None);

        let result = manager.user_authorizer(&user()).await;
        assert!(matches!(result, Err(KeyError::NoKeysAvailable { .. })));
    }

    #[tokio::test]
    async fn test_revoked_only_is_no_keys_available() {
        let chain = Arc::new(MockChain::default());
        let (manager, _) = manager_with(config(), chain.clone(), None);
        provision(&manager, &chain, &user(), 0).await;
        chain.revoke(&user(), 0).await;

        let result = manager.user_authorizer(&user()).await;
        assert!(matches!(result, Err(KeyError::NoKeysAvailable { .. })));
    }

    #[tokio::test]
    async fn test_revoked_key_falls_through_to_next() {
        let chain = Arc::new(MockChain::default());
        let (manager, _) = manager_with(config(), chain.clone(), None);
        provision(&manager, &chain, &user(), 0).await;
        provision(&manager, &chain, &user(), 1).await;
        chain.revoke(&user(), 0).await;

        let authorizer = manager.user_authorizer(&user()).await.unwrap();
        assert_eq!(authorizer.key_index(), 1);
    }

    #[tokio::test]
    async fn test_chain_failure_is_chain_query() {
        let (manager, store) = manager_with(config(), Arc::new(FailingChain), None);
        store
            .insert(StorableKey::new(admin(), 0, "local", vec![0]))
            .await
            .unwrap();

        let err = manager.admin_authorizer().await.unwrap_err();
        assert!(matches!(err, KeyError::ChainQuery(_)));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_chain_query_times_out() {
        let (manager, store) = manager_with(config(), Arc::new(StalledChain), None);
        store
            .insert(StorableKey::new(admin(), 0, "local", vec![0]))
            .await
            .unwrap();

        match manager.admin_authorizer().await {
            Err(KeyError::Timeout { operation, .. }) => assert_eq!(operation, "chain query"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_corrupt_row_is_key_resolution() {
        let chain = Arc::new(MockChain::default());
        let (manager, store) = manager_with(config(), chain.clone(), None);
        let wrapped = manager.generate(0, 1000).await.unwrap();
        chain.register(&admin(), wrapped.chain_key.clone()).await;

        let mut row = manager.save(&admin(), &wrapped.account_key).unwrap();
        let last = row.value.bytes.len() - 1;
        row.value.bytes[last] ^= 0x01;
        store.insert(row).await.unwrap();

        let err = manager.admin_authorizer().await.unwrap_err();
        assert!(matches!(&err, KeyError::KeyResolution(inner) if matches!(**inner, KeyError::Decryption(_))));
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn test_undecodable_row_is_key_resolution() {
        let codec = KeyCodec::new(Arc::new(StaticMasterSecret::new([3u8; 32])));
        let manager = KeyManager::new(
            config(),
            codec,
            Arc::new(CorruptStore),
            Arc::new(MockChain::default()),
            None,
        );

        let err = manager.admin_authorizer().await.unwrap_err();
        assert!(matches!(&err, KeyError::KeyResolution(inner) if matches!(**inner, KeyError::Decryption(_))));
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn test_public_key_mismatch_is_key_resolution() {
        let chain = Arc::new(MockChain::default());
        let (manager, _) = manager_with(config(), chain.clone(), None);

        let mut wrapped = manager.generate(0, 1000).await.unwrap();
        manager.store_key(&admin(), &mut wrapped).await.unwrap();
        let other = manager.generate(0, 1000).await.unwrap();
        chain.register(&admin(), other.chain_key).await;

        let err = manager.admin_authorizer().await.unwrap_err();
        assert!(matches!(&err, KeyError::KeyResolution(inner) if matches!(**inner, KeyError::KeyMismatch { .. })));
    }

    #[tokio::test]
    async fn test_store_key_moves_to_free_index() {
        let chain = Arc::new(MockChain::default());
        let (manager, _) = manager_with(config(), chain, None);

        let mut first = manager.generate_default().await.unwrap();
        let mut second = manager.generate_default().await.unwrap();
        manager.store_key(&user(), &mut first).await.unwrap();
        let stored = manager.store_key(&user(), &mut second).await.unwrap();

        assert_eq!(stored.index, 1);
        assert_eq!(second.chain_key.index, 1);
        assert_eq!(second.account_key.index(), 1);
    }

    #[tokio::test]
    async fn test_store_key_exhausts_indices() {
        let mut config = config();
        config.max_keys_per_account = 2;
        let (manager, _) = manager_with(config, Arc::new(MockChain::default()), None);

        for _ in 0..2 {
            let mut wrapped = manager.generate_default().await.unwrap();
            manager.store_key(&user(), &mut wrapped).await.unwrap();
        }
        let mut wrapped = manager.generate_default().await.unwrap();
        let result = manager.store_key(&user(), &mut wrapped).await;
        assert!(matches!(result, Err(KeyError::IndexExhausted { limit: 2, .. })));
    }

    #[tokio::test]
    async fn test_generate_rejects_out_of_range_index() {
        let (manager, _) = manager_with(config(), Arc::new(MockChain::default()), None);
        assert!(matches!(
            manager.generate(100, 1000).await,
            Err(KeyError::Generation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_key_removes_candidate() {
        let chain = Arc::new(MockChain::default());
        let (manager, store) = manager_with(config(), chain.clone(), None);
        provision(&manager, &chain, &user(), 0).await;
        provision(&manager, &chain, &user(), 1).await;

        assert!(manager.delete_key(&user(), 0).await.unwrap());
        assert!(!manager.delete_key(&user(), 0).await.unwrap());

        let authorizer = manager.user_authorizer(&user()).await.unwrap();
        assert_eq!(authorizer.key_index(), 1);
        assert_eq!(store.all_rows().await.len(), 2);
    }

    #[tokio::test]
    async fn test_remote_key_lifecycle() {
        let mut config = config();
        config.defaults = KeyDefaults {
            key_type: KeyType::Remote,
            key_ring: Some(KEY_RING.into()),
            ..Default::default()
        };
        let chain = Arc::new(MockChain::default());
        let kms: Arc<dyn KmsClient> = Arc::new(MockKms::default());
        let (manager, store) = manager_with(config, chain.clone(), Some(kms));

        provision(&manager, &chain, &admin(), 0).await;
        let rows = store.all_rows().await;
        assert_eq!(rows[0].key_type, "google_kms");
        assert!(rows[0].value_bytes().starts_with(KEY_RING.as_bytes()));

        let authorizer = manager.admin_authorizer().await.unwrap();
        assert_eq!(authorizer.key_type(), KeyType::Remote);
        assert_eq!(authorizer.sign(b"tx").await.unwrap(), vec![1u8; 64]);
    }

    #[tokio::test]
    async fn test_store_rejects_missing_remote_key() {
        let mut config = config();
        config.defaults = KeyDefaults {
            key_type: KeyType::Remote,
            key_ring: Some(KEY_RING.into()),
            ..Default::default()
        };
        let kms: Arc<dyn KmsClient> = Arc::new(MockKms { missing: true });
        let (manager, store) = manager_with(config, Arc::new(MockChain::default()), Some(kms));

        let mut wrapped = manager.generate_default().await.unwrap();
        let result = manager.store_key(&admin(), &mut wrapped).await;
        assert!(matches!(result, Err(KeyError::Encoding(_))));
        assert!(store.all_rows().await.is_empty());
    }
}
