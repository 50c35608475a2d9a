//! Database layer
//!
//! MongoDB storage for account key records.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use schemas::{Metadata, StorableKey, STORABLE_KEY_COLLECTION};
