//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures_util::{Stream, TryStreamExt};
use mongodb::{
    error::ErrorKind,
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::KeyError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// Drain a cursor, reporting the first document that cannot be read.
///
/// Undecodable documents are corruption and map to
/// [`KeyError::Decryption`]; transport failures map to
/// [`KeyError::Database`].
pub(crate) async fn read_all<T, S>(cursor: S) -> Result<Vec<T>, KeyError>
where
    S: Stream<Item = mongodb::error::Result<T>>,
{
    cursor.try_collect().await.map_err(|e: mongodb::error::Error| {
        if matches!(e.kind.as_ref(), ErrorKind::BsonDeserialization(_)) {
            error!(error = %e, "Stored document cannot be decoded");
            KeyError::Decryption(format!("undecodable stored document: {}", e))
        } else {
            KeyError::Database(format!("Error reading document: {}", e))
        }
    })
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, KeyError> {
        info!("Connecting to MongoDB");

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| KeyError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| KeyError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, KeyError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, KeyError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), KeyError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| KeyError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps.
    ///
    /// Unique index violations surface as [`KeyError::IndexConflict`].
    pub async fn insert_one(&self, mut item: T) -> Result<(ObjectId, T), KeyError> {
        let now = DateTime::now();
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.deleted_at = None;
        metadata.created_at = Some(now);
        metadata.updated_at = Some(now);

        let result = self.inner.insert_one(&item).await.map_err(KeyError::from)?;

        let id = result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| KeyError::Database("Failed to get inserted ID".into()))?;

        Ok((id, item))
    }

    /// Find many non-deleted documents by filter, optionally sorted.
    ///
    /// A document that fails to decode fails the whole query.
    pub async fn find_many(
        &self,
        filter: Document,
        sort: Option<Document>,
    ) -> Result<Vec<T>, KeyError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        let mut find = self.inner.find(full_filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }

        let cursor = find
            .await
            .map_err(|e| KeyError::Database(format!("Find failed: {}", e)))?;

        read_all(cursor).await
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, KeyError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| KeyError::Database(format!("Update failed: {}", e)))
    }

    /// Soft delete a non-deleted document
    pub async fn soft_delete(&self, filter: Document) -> Result<UpdateResult, KeyError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        let now = DateTime::now();
        let update = doc! {
            "$set": {
                "metadata.is_deleted": true,
                "metadata.deleted_at": now,
                "metadata.updated_at": now,
            }
        };

        self.update_one(full_filter, update).await
    }
}
