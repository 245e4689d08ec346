//! Block implementation for the ledger
//!
//! A block carries an ordered list of transactions and is sealed by a
//! proof-of-work content hash over its other six fields.

use crate::core::transaction::{Transaction, TxIn, TxOut, COINBASE_AMOUNT};
use crate::crypto::{hash_matches_difficulty, is_hash_hex, sha256_hex};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Block Constants
// =============================================================================

/// Allowed clock drift, in seconds, for block timestamps
pub const TIMESTAMP_TOLERANCE: i64 = 60;

/// Genesis block timestamp
pub const GENESIS_TIMESTAMP: i64 = 1465154705;

/// Address credited by the genesis coinbase
pub const GENESIS_ADDRESS: &str = "04bfcab8722991ae774db48f934ca79cfb7dd991229153b9f732ba5334aafcd8e7266e47076996b55a14bf9913ee3145ce0cfc1372ada8ada74bd287450313534a";

/// Id of the genesis coinbase transaction
pub const GENESIS_TX_ID: &str = "e655f6a5f26dc9b4cac6e46f52336428287759cf81ef5ff10854f69d68f43fa3";

/// Hash of the genesis block.
///
/// Both genesis constants are derived with this crate's own id and content
/// hash rules, so they differ from naivecoin's published genesis. Nodes of
/// this ledger do not interoperate with naivecoin peers.
pub const GENESIS_HASH: &str = "9711afee91663c0de2424bdc3c5b70889260be0b7dd05b8ffbab24b573b9a2b6";

// =============================================================================
// Block Errors
// =============================================================================

/// Block validation errors
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Malformed block: {0}")]
    Structure(String),
    #[error("Invalid index: expected {expected}, got {actual}")]
    InvalidIndex { expected: u64, actual: u64 },
    #[error("Invalid previous hash")]
    InvalidPreviousHash,
    #[error("Invalid timestamp {timestamp} (previous {previous}, now {now})")]
    InvalidTimestamp {
        timestamp: i64,
        previous: i64,
        now: i64,
    },
    #[error("Block hash does not match its content")]
    HashMismatch,
    #[error("Block hash does not meet difficulty {0}")]
    DifficultyNotMet(u32),
}

/// Hash the block fields, with `data` already serialized
pub(crate) fn hash_content(
    index: u64,
    previous_hash: &str,
    timestamp: i64,
    data_json: &str,
    difficulty: u32,
    nonce: u64,
) -> String {
    let content = format!(
        "{}{}{}{}{}{}",
        index, previous_hash, timestamp, data_json, difficulty, nonce
    );
    sha256_hex(content.as_bytes())
}

/// Compact JSON encoding of a transaction list, as fed into the block hash
pub(crate) fn data_json(data: &[Transaction]) -> String {
    serde_json::to_string(data).unwrap_or_default()
}

/// Calculate the content hash of a block from its fields
pub fn calculate_hash(
    index: u64,
    previous_hash: &str,
    timestamp: i64,
    data: &[Transaction],
    difficulty: u32,
    nonce: u64,
) -> String {
    hash_content(
        index,
        previous_hash,
        timestamp,
        &data_json(data),
        difficulty,
        nonce,
    )
}

/// A block in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Height in the chain
    pub index: u64,
    /// Content hash of the other fields
    pub hash: String,
    /// Hash of the previous block (empty for genesis)
    pub previous_hash: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// Transactions, coinbase first
    pub data: Vec<Transaction>,
    /// Required leading zero bits
    pub difficulty: u32,
    pub nonce: u64,
}

impl Block {
    /// The fixed first block
    pub fn genesis() -> Self {
        let coinbase = Transaction {
            id: GENESIS_TX_ID.to_string(),
            tx_ins: vec![TxIn::unsigned("", 0)],
            tx_outs: vec![TxOut::new(GENESIS_ADDRESS, COINBASE_AMOUNT)],
        };

        Self {
            index: 0,
            hash: GENESIS_HASH.to_string(),
            previous_hash: String::new(),
            timestamp: GENESIS_TIMESTAMP,
            data: vec![coinbase],
            difficulty: 0,
            nonce: 0,
        }
    }

    /// Recompute the content hash from the block's fields
    pub fn compute_hash(&self) -> String {
        calculate_hash(
            self.index,
            &self.previous_hash,
            self.timestamp,
            &self.data,
            self.difficulty,
            self.nonce,
        )
    }

    /// Shape checks that need no context
    pub fn validate_structure(&self) -> Result<(), BlockError> {
        if !is_hash_hex(&self.hash) {
            return Err(BlockError::Structure("hash is not a sha256 hex digest".into()));
        }
        if self.index > 0 && !is_hash_hex(&self.previous_hash) {
            return Err(BlockError::Structure(
                "previous hash is not a sha256 hex digest".into(),
            ));
        }
        if self.data.is_empty() {
            return Err(BlockError::Structure("block carries no transactions".into()));
        }
        Ok(())
    }

    pub fn is_structurally_valid(&self) -> bool {
        self.validate_structure().is_ok()
    }

    /// The hash must equal the content hash and meet the block's difficulty
    pub fn has_valid_hash(&self) -> Result<(), BlockError> {
        if self.compute_hash() != self.hash {
            return Err(BlockError::HashMismatch);
        }
        if !hash_matches_difficulty(&self.hash, self.difficulty) {
            return Err(BlockError::DifficultyNotMet(self.difficulty));
        }
        Ok(())
    }

    /// Check that this block may follow `previous`, using the current time
    pub fn validate_successor(&self, previous: &Block) -> Result<(), BlockError> {
        self.validate_successor_at(previous, Utc::now().timestamp())
    }

    pub(crate) fn validate_successor_at(
        &self,
        previous: &Block,
        now: i64,
    ) -> Result<(), BlockError> {
        self.validate_structure()?;

        if self.index != previous.index + 1 {
            return Err(BlockError::InvalidIndex {
                expected: previous.index + 1,
                actual: self.index,
            });
        }
        if self.previous_hash != previous.hash {
            return Err(BlockError::InvalidPreviousHash);
        }
        if !(previous.timestamp - TIMESTAMP_TOLERANCE < self.timestamp
            && self.timestamp - TIMESTAMP_TOLERANCE < now)
        {
            return Err(BlockError::InvalidTimestamp {
                timestamp: self.timestamp,
                previous: previous.timestamp,
                now,
            });
        }

        self.has_valid_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::find_block;

    fn next_block(previous: &Block, timestamp: i64, difficulty: u32) -> Block {
        let data = vec![Transaction::coinbase(GENESIS_ADDRESS, previous.index + 1)];
        find_block(
            previous.index + 1,
            &previous.hash,
            timestamp,
            data,
            difficulty,
        )
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.compute_hash(), GENESIS_HASH);
        assert_eq!(genesis.data[0].id, GENESIS_TX_ID);
        assert_eq!(
            Transaction::coinbase(GENESIS_ADDRESS, 0),
            genesis.data[0]
        );
        assert!(genesis.has_valid_hash().is_ok());
        assert!(genesis.is_structurally_valid());
    }

    #[test]
    fn test_genesis_serializes_camel_case() {
        let json = serde_json::to_value(Block::genesis()).unwrap();
        assert_eq!(json["previousHash"], "");
        assert_eq!(json["data"][0]["txIns"][0]["txOutIndex"], 0);
        assert_eq!(json["data"][0]["txOuts"][0]["amount"], 50);
    }

    #[test]
    fn test_mined_successor_is_valid() {
        let genesis = Block::genesis();
        let now = Utc::now().timestamp();
        let block = next_block(&genesis, now, 8);

        assert!(block.hash.starts_with("00"));
        assert!(block.validate_successor(&genesis).is_ok());
    }

    #[test]
    fn test_tampered_block_rejected() {
        let genesis = Block::genesis();
        let now = Utc::now().timestamp();
        let block = next_block(&genesis, now, 4);

        let mut tampered = block.clone();
        tampered.nonce += 1;
        assert!(matches!(
            tampered.validate_successor(&genesis),
            Err(BlockError::HashMismatch)
        ));

        let mut wrong_index = block.clone();
        wrong_index.index = 2;
        assert!(matches!(
            wrong_index.validate_successor(&genesis),
            Err(BlockError::InvalidIndex { expected: 1, actual: 2 })
        ));

        let mut wrong_parent = block.clone();
        wrong_parent.previous_hash = "00".repeat(32);
        assert!(matches!(
            wrong_parent.validate_successor(&genesis),
            Err(BlockError::InvalidPreviousHash)
        ));
    }

    #[test]
    fn test_timestamp_window() {
        let genesis = Block::genesis();
        let now = Utc::now().timestamp();

        let too_old = next_block(&genesis, GENESIS_TIMESTAMP - TIMESTAMP_TOLERANCE, 0);
        assert!(matches!(
            too_old.validate_successor_at(&genesis, now),
            Err(BlockError::InvalidTimestamp { .. })
        ));

        let slightly_old = next_block(&genesis, GENESIS_TIMESTAMP - TIMESTAMP_TOLERANCE + 1, 0);
        assert!(slightly_old.validate_successor_at(&genesis, now).is_ok());

        let future = next_block(&genesis, now + TIMESTAMP_TOLERANCE, 0);
        assert!(future.validate_successor_at(&genesis, now).is_err());

        let near_future = next_block(&genesis, now + TIMESTAMP_TOLERANCE - 1, 0);
        assert!(near_future.validate_successor_at(&genesis, now).is_ok());
    }

    #[test]
    fn test_difficulty_is_enforced() {
        let genesis = Block::genesis();
        let mut block = next_block(&genesis, Utc::now().timestamp(), 0);
        block.difficulty = 255;
        block.hash = block.compute_hash();
        assert!(matches!(
            block.validate_successor(&genesis),
            Err(BlockError::DifficultyNotMet(255))
        ));
    }

    #[test]
    fn test_structure_checks() {
        let genesis = Block::genesis();
        let mut block = next_block(&genesis, Utc::now().timestamp(), 0);

        block.data.clear();
        assert!(!block.is_structurally_valid());

        let mut bad_hash = genesis.clone();
        bad_hash.hash = "xyz".into();
        assert!(matches!(
            bad_hash.validate_structure(),
            Err(BlockError::Structure(_))
        ));
    }
}
