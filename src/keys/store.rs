//! Key store gateway
//!
//! The database is the authority on index uniqueness: a unique partial
//! index on `(account_address, index)` over non-deleted rows. Concurrent
//! writers for the same account (possibly in different processes) resolve
//! collisions by retrying on the next free index, never by an in-process
//! lock.

use std::collections::BTreeSet;

use bson::{doc, oid::ObjectId};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{KeyCodec, Wrapped};
use crate::db::{MongoClient, MongoCollection, StorableKey, STORABLE_KEY_COLLECTION};
use crate::types::{Address, KeyError, Result};

// =============================================================================
// Key Store Trait
// =============================================================================

/// Persistence contract for stored account keys (allows different backends)
#[async_trait::async_trait]
pub trait KeyStore: Send + Sync {
    /// Insert a new row and return it with its assigned id.
    ///
    /// Fails with [`KeyError::IndexConflict`] if a non-deleted row already
    /// uses the same `(account_address, index)`.
    async fn insert(&self, key: StorableKey) -> Result<StorableKey>;

    /// Non-deleted rows for `address`, ordered by id.
    ///
    /// A row that cannot be decoded fails with [`KeyError::Decryption`]
    /// rather than being skipped.
    async fn list_active(&self, address: &Address) -> Result<Vec<StorableKey>>;

    /// Soft-delete the live row at `index`. Returns whether a row matched.
    async fn soft_delete(&self, address: &Address, index: u32) -> Result<bool>;
}

// =============================================================================
// MongoDB Store
// =============================================================================

/// Key store backed by the `account_keys` collection
#[derive(Debug, Clone)]
pub struct MongoKeyStore {
    collection: MongoCollection<StorableKey>,
}

impl MongoKeyStore {
    /// Open the collection and ensure its indexes exist
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection(STORABLE_KEY_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait::async_trait]
impl KeyStore for MongoKeyStore {
    async fn insert(&self, key: StorableKey) -> Result<StorableKey> {
        let (id, mut stored) = self.collection.insert_one(key).await?;
        stored._id = Some(id);
        Ok(stored)
    }

    async fn list_active(&self, address: &Address) -> Result<Vec<StorableKey>> {
        self.collection
            .find_many(
                doc! { "account_address": address.as_str() },
                Some(doc! { "_id": 1 }),
            )
            .await
    }

    async fn soft_delete(&self, address: &Address, index: u32) -> Result<bool> {
        let result = self
            .collection
            .soft_delete(doc! { "account_address": address.as_str(), "index": index as i64 })
            .await?;
        Ok(result.matched_count > 0)
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory key store for tests and embedding.
///
/// Enforces the same uniqueness rule as the MongoDB index, atomically
/// under a single write lock.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    rows: RwLock<Vec<StorableKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows including soft-deleted ones (audit view)
    pub async fn all_rows(&self) -> Vec<StorableKey> {
        self.rows.read().await.clone()
    }
}

#[async_trait::async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn insert(&self, mut key: StorableKey) -> Result<StorableKey> {
        let mut rows = self.rows.write().await;

        let taken = rows.iter().any(|row| {
            !row.is_deleted()
                && row.account_address == key.account_address
                && row.index == key.index
        });
        if taken {
            return Err(KeyError::IndexConflict(format!(
                "index {} already in use for {}",
                key.index, key.account_address
            )));
        }

        let now = bson::DateTime::now();
        key._id = Some(ObjectId::new());
        key.metadata.is_deleted = false;
        key.metadata.deleted_at = None;
        key.metadata.created_at = Some(now);
        key.metadata.updated_at = Some(now);

        rows.push(key.clone());
        Ok(key)
    }

    async fn list_active(&self, address: &Address) -> Result<Vec<StorableKey>> {
        let mut active: Vec<StorableKey> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| !row.is_deleted() && &row.account_address == address)
            .cloned()
            .collect();
        active.sort_by_key(|row| row._id);
        Ok(active)
    }

    async fn soft_delete(&self, address: &Address, index: u32) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|row| {
            !row.is_deleted() && &row.account_address == address && row.index == index
        }) {
            Some(row) => {
                row.metadata.mark_deleted();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// Index Allocation
// =============================================================================

/// Lowest index in `0..limit` not used by any of `rows`.
pub fn lowest_free_index(rows: &[StorableKey], limit: u32) -> Option<u32> {
    let used: BTreeSet<u32> = rows
        .iter()
        .filter(|row| !row.is_deleted())
        .map(|row| row.index)
        .collect();
    (0..limit).find(|index| !used.contains(index))
}

/// Encode and insert a freshly generated key, moving it to the next free
/// index on conflict.
///
/// The winning index is written back into `wrapped` so the on-chain
/// registration uses the same index as the stored row.
pub(crate) async fn store_with_retry(
    store: &dyn KeyStore,
    codec: &KeyCodec,
    address: &Address,
    wrapped: &mut Wrapped,
    max_attempts: u32,
    limit: u32,
) -> Result<StorableKey> {
    let mut index = wrapped.account_key.index();

    for attempt in 1..=max_attempts {
        if index >= limit {
            return Err(KeyError::IndexExhausted {
                address: address.to_string(),
                limit,
            });
        }

        wrapped.set_index(index);
        let row = codec.save(address, &wrapped.account_key)?;

        match store.insert(row).await {
            Ok(stored) => {
                debug!(
                    address = %address,
                    index = stored.index,
                    key_type = %stored.key_type,
                    attempt,
                    "Stored account key"
                );
                return Ok(stored);
            }
            Err(KeyError::IndexConflict(reason)) => {
                debug!(
                    address = %address,
                    index,
                    attempt,
                    reason = %reason,
                    "Key index taken, choosing next free index"
                );
                let active = store.list_active(address).await?;
                index = lowest_free_index(&active, limit).ok_or_else(|| {
                    KeyError::IndexExhausted {
                        address: address.to_string(),
                        limit,
                    }
                })?;
            }
            Err(e) => return Err(e),
        }
    }

    warn!(
        address = %address,
        attempts = max_attempts,
        "Gave up storing account key after repeated index conflicts"
    );
    Err(KeyError::IndexConflict(format!(
        "no free index claimed for {} after {} attempts",
        address, max_attempts
    )))
}

// =============================================================================
// Tests
// =============================================================================
