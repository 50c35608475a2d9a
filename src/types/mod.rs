//! Shared types for account key management

mod address;
mod error;

pub use address::{Address, ADDRESS_LEN};
pub use error::{KeyError, Result};
