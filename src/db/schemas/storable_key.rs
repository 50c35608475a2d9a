//! Stored account key document schema
//!
//! `value` is opaque at rest: an encryption envelope for local keys or
//! the UTF-8 resource id for Google KMS keys. The plaintext private key
//! never appears in this document.

use bson::{doc, oid::ObjectId, spec::BinarySubtype, Binary, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::Address;

/// Collection name for stored account keys
pub const STORABLE_KEY_COLLECTION: &str = "account_keys";

/// Account key document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StorableKey {
    /// MongoDB document ID (insertion order; lowest wins ties)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Account that owns this key
    pub account_address: Address,

    /// Key index on the account
    pub index: u32,

    /// Backend type tag (`local` or `google_kms`), kept as raw text so
    /// unknown tags can be read and rejected explicitly
    #[serde(rename = "type")]
    pub key_type: String,

    /// Ciphertext envelope or remote resource id
    pub value: Binary,
}

impl StorableKey {
    /// Create a new, not yet inserted, key document
    pub fn new(account_address: Address, index: u32, key_type: &str, value: Vec<u8>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            account_address,
            index,
            key_type: key_type.to_string(),
            value: Binary {
                subtype: BinarySubtype::Generic,
                bytes: value,
            },
        }
    }

    /// Stored value bytes
    pub fn value_bytes(&self) -> &[u8] {
        &self.value.bytes
    }

    pub fn is_deleted(&self) -> bool {
        self.metadata.is_deleted
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.created_at.map(|t| t.to_chrono())
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.updated_at.map(|t| t.to_chrono())
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.deleted_at.map(|t| t.to_chrono())
    }
}

impl IntoIndexes for StorableKey {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One live key per (account, index); deleted rows are kept for audit
            (
                doc! { "account_address": 1, "index": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "metadata.is_deleted": false })
                        .name("account_index_unique".to_string())
                        .build(),
                ),
            ),
            // Index on account_address for candidate lookups
            (
                doc! { "account_address": 1, "_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("account_address_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for StorableKey {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
