//! Account keys - key lifecycle and transaction authorizers
//!
//! Generates account keys, keeps them encrypted at rest (or delegates
//! them to Google Cloud KMS), and resolves which stored key should sign
//! for the admin account or a user account.
//!
//! ## Architecture
//!
//! ```text
//! generate ──► Wrapped { chain_key, account_key }
//!                              │
//!                              ▼ store_key (KeyCodec::save + retry on index conflict)
//!                         ┌─────────┐
//!                         │ KeyStore│  MongoDB account_keys (soft delete)
//!                         └────┬────┘
//!                              │ list_active
//!  ChainClient::get_account ──►│ select lowest active index
//!                              ▼
//!                    KeyCodec::load ──► Signer ──► Authorizer
//! ```
//!
//! Collaborators (the chain, the KMS, the master secret, the database)
//! are traits so hosts and tests can supply their own.

pub mod authorizer;
pub mod chain;
pub mod config;
pub mod db;
pub mod keys;
pub mod kms;
pub mod logging;
pub mod manager;
pub mod types;

pub use authorizer::{Authorizer, Signer};
pub use chain::{Account, AccountKey, ChainClient};
pub use config::{KeysArgs, KeysConfig};
pub use keys::{
    HashAlgorithm, InMemoryKeyStore, Key, KeyCodec, KeyGenerator, KeyStore, KeyType,
    MongoKeyStore, SignatureAlgorithm, Wrapped,
};
pub use kms::{KmsClient, RemoteKey, ResourceId};
pub use manager::KeyManager;
pub use types::{Address, KeyError, Result};
