//! Database schemas
//!
//! Defines MongoDB document structures for stored account keys.

mod metadata;
mod storable_key;

pub use metadata::Metadata;
pub use storable_key::{StorableKey, STORABLE_KEY_COLLECTION};
