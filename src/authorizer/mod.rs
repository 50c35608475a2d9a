//! Authorizer resolution
//!
//! An [`Authorizer`] is everything needed to sign a transaction as an
//! account: its address, the on-chain key being used, and a signer.
//!
//! Candidate selection intersects two views of the account:
//! - stored rows that are not soft-deleted
//! - on-chain keys that are not revoked
//!
//! and picks the lowest key index, breaking ties by the lowest row id.

mod signer;

use std::cmp::Ordering;

use crate::chain::AccountKey;
use crate::db::StorableKey;
use crate::keys::KeyType;
use crate::types::{Address, Result};

pub use signer::{LocalSigner, RemoteSigner, Signer};

/// A ready-to-use signing identity for one account.
#[derive(Debug)]
pub struct Authorizer {
    pub address: Address,
    /// On-chain key the signer corresponds to
    pub key: AccountKey,
    pub signer: Signer,
}

impl Authorizer {
    /// Sign `message` with this authorizer's key.
    ///
    /// Remote signing is bounded by the configured timeout.
    pub async fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.signer.sign(message).await
    }

    pub fn key_index(&self) -> u32 {
        self.key.index
    }

    pub fn key_type(&self) -> KeyType {
        self.signer.key_type()
    }
}

/// Choose the stored key to sign with.
///
/// Returns `None` when no non-deleted row has a non-revoked on-chain
/// counterpart.
pub fn select_key<'a>(
    rows: &'a [StorableKey],
    chain_keys: &'a [AccountKey],
) -> Option<(&'a StorableKey, &'a AccountKey)> {
    rows.iter()
        .filter(|row| !row.is_deleted())
        .filter_map(|row| {
            chain_keys
                .iter()
                .find(|key| key.index == row.index && key.is_active())
                .map(|key| (row, key))
        })
        .min_by(|(a, _), (b, _)| compare_candidates(a, b))
}

fn compare_candidates(a: &StorableKey, b: &StorableKey) -> Ordering {
    a.index.cmp(&b.index).then_with(|| match (a._id, b._id) {
        (Some(x), Some(y)) => x.cmp(&y),
        // Rows without an id were never inserted; rank them last
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

#[cfg(test)]
mod tests {
    use bson::oid::ObjectId;

    use super::*;
    use crate::keys::{HashAlgorithm, SignatureAlgorithm};

    fn address() -> Address {
        Address::parse("0x01cf0e2f2f715450").unwrap()
    }

    fn row(index: u32, id: u8) -> StorableKey {
        let mut row = StorableKey::new(address(), index, "local", vec![index as u8]);
        row._id = Some(ObjectId::from_bytes([id; 12]));
        row
    }

    fn chain_key(index: u32, revoked: bool) -> AccountKey {
        AccountKey {
            index,
            public_key: vec![index as u8; 64],
            sign_algo: SignatureAlgorithm::EcdsaSecp256k1,
            hash_algo: HashAlgorithm::Sha3_256,
            weight: 1000,
            sequence_number: 0,
            revoked,
        }
    }

    #[test]
    fn test_picks_lowest_active_index() {
        let rows = vec![row(2, 1), row(0, 2), row(1, 3)];
        let chain = vec![chain_key(0, true), chain_key(1, false), chain_key(2, false)];

        let (row, key) = select_key(&rows, &chain).unwrap();
        assert_eq!(row.index, 1);
        assert_eq!(key.index, 1);
    }

    #[test]
    fn test_ignores_soft_deleted_rows() {
        let mut deleted = row(0, 1);
        deleted.metadata.mark_deleted();
        let rows = vec![deleted, row(1, 2)];
        let chain = vec![chain_key(0, false), chain_key(1, false)];

        let (row, _) = select_key(&rows, &chain).unwrap();
        assert_eq!(row.index, 1);
    }

    #[test]
    fn test_tie_broken_by_lowest_id() {
        let rows = vec![row(0, 9), row(0, 4), row(0, 7)];
        let chain = vec![chain_key(0, false)];

        let (row, _) = select_key(&rows, &chain).unwrap();
        assert_eq!(row._id, Some(ObjectId::from_bytes([4; 12])));
    }

    #[test]
    fn test_none_when_nothing_matches() {
        assert!(select_key(&[], &[chain_key(0, false)]).is_none());
        assert!(select_key(&[row(0, 1)], &[]).is_none());
        assert!(select_key(&[row(0, 1)], &[chain_key(0, true)]).is_none());
        assert!(select_key(&[row(3, 1)], &[chain_key(0, false)]).is_none());
    }

    #[test]
    fn test_selection_is_order_independent() {
        let mut rows = vec![row(1, 1), row(0, 3), row(0, 2)];
        let chain = vec![chain_key(0, false), chain_key(1, false)];
        let first = select_key(&rows, &chain).unwrap().0._id;

        rows.reverse();
        let second = select_key(&rows, &chain).unwrap().0._id;
        assert_eq!(first, second);
        assert_eq!(first, Some(ObjectId::from_bytes([2; 12])));
    }
}
