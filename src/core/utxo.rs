//! Ledger state: the set of unspent transaction outputs
//!
//! The set is only ever replaced wholesale by applying a validated sequence of
//! transactions (see [`crate::core::transaction::apply_transactions`]).
//! Every read hands out owned copies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to a transaction output: creating transaction id + position
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutPoint {
    pub tx_out_id: String,
    pub tx_out_index: u64,
}

impl OutPoint {
    pub fn new(tx_out_id: impl Into<String>, tx_out_index: u64) -> Self {
        Self {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
        }
    }
}

/// A spendable output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentTxOut {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub address: String,
    pub amount: u64,
}

impl UnspentTxOut {
    pub fn out_point(&self) -> OutPoint {
        OutPoint::new(self.tx_out_id.clone(), self.tx_out_index)
    }
}

/// The UTXO set, ordered by outpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: BTreeMap<OutPoint, UnspentTxOut>,
}

impl UtxoSet {
    /// An empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an output by its creating transaction id and position
    pub fn get(&self, tx_out_id: &str, tx_out_index: u64) -> Option<&UnspentTxOut> {
        self.entries.get(&OutPoint::new(tx_out_id, tx_out_index))
    }

    pub fn contains(&self, tx_out_id: &str, tx_out_index: u64) -> bool {
        self.get(tx_out_id, tx_out_index).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnspentTxOut> {
        self.entries.values()
    }

    /// Owned copies of the outputs paying `address`
    pub fn owned_by(&self, address: &str) -> Vec<UnspentTxOut> {
        self.iter()
            .filter(|utxo| utxo.address == address)
            .cloned()
            .collect()
    }

    /// Sum of the outputs paying `address`
    pub fn balance_of(&self, address: &str) -> u128 {
        self.iter()
            .filter(|utxo| utxo.address == address)
            .map(|utxo| utxo.amount as u128)
            .sum()
    }

    /// Owned copy of every entry
    pub fn to_vec(&self) -> Vec<UnspentTxOut> {
        self.entries.values().cloned().collect()
    }

    /// Derive a new set: drop `spent`, then add `created`
    pub(crate) fn with_changes(
        &self,
        spent: &[OutPoint],
        created: Vec<UnspentTxOut>,
    ) -> UtxoSet {
        let mut entries = self.entries.clone();
        for out_point in spent {
            entries.remove(out_point);
        }
        for utxo in created {
            entries.insert(utxo.out_point(), utxo);
        }
        UtxoSet { entries }
    }
}

impl FromIterator<UnspentTxOut> for UtxoSet {
    fn from_iter<T: IntoIterator<Item = UnspentTxOut>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|u| (u.out_point(), u)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(id: &str, index: u64, address: &str, amount: u64) -> UnspentTxOut {
        UnspentTxOut {
            tx_out_id: id.to_string(),
            tx_out_index: index,
            address: address.to_string(),
            amount,
        }
    }

    #[test]
    fn test_lookup_and_balance() {
        let set: UtxoSet = vec![
            utxo("aa", 0, "alice", 30),
            utxo("aa", 1, "bob", 20),
            utxo("bb", 0, "alice", 5),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 3);
        assert!(set.contains("aa", 1));
        assert!(!set.contains("aa", 2));
        assert_eq!(set.balance_of("alice"), 35);
        assert_eq!(set.owned_by("bob").len(), 1);
        assert_eq!(set.balance_of("carol"), 0);
    }

    #[test]
    fn test_with_changes_leaves_original_untouched() {
        let set: UtxoSet = vec![utxo("aa", 0, "alice", 30)].into_iter().collect();
        let next = set.with_changes(&[OutPoint::new("aa", 0)], vec![utxo("cc", 0, "bob", 30)]);

        assert!(set.contains("aa", 0));
        assert!(!next.contains("aa", 0));
        assert_eq!(next.balance_of("bob"), 30);
    }

    #[test]
    fn test_reads_are_copies() {
        let set: UtxoSet = vec![utxo("aa", 0, "alice", 30)].into_iter().collect();
        let mut copy = set.to_vec();
        copy[0].amount = 1;
        assert_eq!(set.balance_of("alice"), 30);
    }
}
