//! Account addresses
//!
//! Addresses are 8 bytes. The canonical form is `0x` followed by 16
//! lowercase hex characters; shorter inputs are left-padded with zeros.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::KeyError;

/// Account address length in bytes
pub const ADDRESS_LEN: usize = 8;

/// A normalized account address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address string.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || digits.len() > ADDRESS_LEN * 2 {
            return Err(KeyError::InvalidAddress(format!(
                "expected 1 to {} hex characters, got '{}'",
                ADDRESS_LEN * 2,
                input
            )));
        }

        let padded = format!("{:0>width$}", digits, width = ADDRESS_LEN * 2);
        let bytes = hex::decode(&padded)
            .map_err(|e| KeyError::InvalidAddress(format!("'{}': {}", input, e)))?;

        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    /// Canonical string form (`0x` + 16 hex characters)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw address bytes
    pub fn to_bytes(&self) -> [u8; ADDRESS_LEN] {
        let mut bytes = [0u8; ADDRESS_LEN];
        // Canonical form is always valid hex of the right length
        if let Ok(decoded) = hex::decode(&self.0[2..]) {
            bytes.copy_from_slice(&decoded);
        }
        bytes
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}
