//! Blockchain implementation
//!
//! The chain of blocks together with the UTXO set it produces. Both are only
//! ever replaced through validated paths: appending a successor block or
//! adopting a heavier, fully validated chain.

use crate::core::block::{Block, BlockError, GENESIS_ADDRESS, GENESIS_TX_ID};
use crate::core::transaction::{apply_transactions, Transaction, TransactionError, COINBASE_AMOUNT};
use crate::core::utxo::{UnspentTxOut, UtxoSet};
use thiserror::Error;

/// Target seconds between blocks
pub const BLOCK_GENERATION_INTERVAL: i64 = 10;

/// Number of blocks between difficulty adjustments
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Largest per-block exponent counted toward accumulated work
pub const MAX_WORK_EXPONENT: u32 = 127;

/// Blockchain-related errors
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Block {index} rejected: {source}")]
    InvalidBlock { index: u64, source: BlockError },
    #[error("Transactions of block {index} rejected: {source}")]
    InvalidTransactions {
        index: u64,
        source: TransactionError,
    },
    #[error("Chain does not start with the genesis block")]
    InvalidGenesis,
    #[error("Chain is empty")]
    EmptyChain,
    #[error("Candidate work {candidate} does not exceed current work {current}")]
    InsufficientWork { candidate: u128, current: u128 },
}

// =============================================================================
// Chain-wide rules
// =============================================================================

/// Difficulty required of the block that extends `chain`
pub fn compute_difficulty(chain: &[Block]) -> u32 {
    let Some(latest) = chain.last() else {
        return 0;
    };
    if latest.index % DIFFICULTY_ADJUSTMENT_INTERVAL == 0 && latest.index != 0 {
        adjust_difficulty(latest, chain)
    } else {
        latest.difficulty
    }
}

/// Retarget against the block that opened the adjustment window
pub fn adjust_difficulty(latest: &Block, chain: &[Block]) -> u32 {
    let window_start = latest
        .index
        .checked_sub(DIFFICULTY_ADJUSTMENT_INTERVAL)
        .and_then(|i| chain.get(i as usize));
    let Some(window_start) = window_start else {
        return latest.difficulty;
    };

    let expected = BLOCK_GENERATION_INTERVAL * DIFFICULTY_ADJUSTMENT_INTERVAL as i64;
    let actual = latest.timestamp - window_start.timestamp;

    if actual < expected / 2 {
        window_start.difficulty.saturating_add(1)
    } else if actual > expected * 2 {
        window_start.difficulty.saturating_sub(1)
    } else {
        window_start.difficulty
    }
}

/// Sum of 2^difficulty over the chain
pub fn accumulated_difficulty(chain: &[Block]) -> u128 {
    chain.iter().fold(0u128, |acc, block| {
        acc.saturating_add(1u128 << block.difficulty.min(MAX_WORK_EXPONENT))
    })
}

/// Validate a whole chain from genesis and return the UTXO set it produces
pub fn validate_chain(chain: &[Block]) -> Result<UtxoSet, ChainError> {
    let genesis = chain.first().ok_or(ChainError::EmptyChain)?;
    if *genesis != Block::genesis() {
        return Err(ChainError::InvalidGenesis);
    }

    let mut utxos = UtxoSet::new();
    for (i, block) in chain.iter().enumerate() {
        if i > 0 {
            block
                .validate_successor(&chain[i - 1])
                .map_err(|source| ChainError::InvalidBlock {
                    index: block.index,
                    source,
                })?;
        }
        utxos = apply_transactions(&block.data, &utxos, block.index).map_err(|source| {
            ChainError::InvalidTransactions {
                index: block.index,
                source,
            }
        })?;
    }

    Ok(utxos)
}

fn genesis_utxos() -> UtxoSet {
    std::iter::once(UnspentTxOut {
        tx_out_id: GENESIS_TX_ID.to_string(),
        tx_out_index: 0,
        address: GENESIS_ADDRESS.to_string(),
        amount: COINBASE_AMOUNT,
    })
    .collect()
}

// =============================================================================
// Blockchain
// =============================================================================

/// The main blockchain structure
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    utxos: UtxoSet,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Create a new blockchain holding only the genesis block
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::genesis()],
            utxos: genesis_utxos(),
        }
    }

    /// Get the latest block
    pub fn latest_block(&self) -> &Block {
        self.blocks
            .last()
            .expect("Blockchain should have at least genesis block")
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    /// Get blockchain height
    pub fn height(&self) -> u64 {
        self.latest_block().index
    }

    /// Get a block by hash
    pub fn get_block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    /// Find a confirmed transaction by id
    pub fn find_transaction(&self, id: &str) -> Option<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.data.iter())
            .find(|tx| tx.id == id)
    }

    /// Difficulty the next block must be mined at
    pub fn next_difficulty(&self) -> u32 {
        compute_difficulty(&self.blocks)
    }

    pub fn accumulated_difficulty(&self) -> u128 {
        accumulated_difficulty(&self.blocks)
    }

    /// Append a block that extends the current head.
    /// On error the chain and UTXO set are left as they were.
    pub fn try_append(&mut self, block: Block) -> Result<(), ChainError> {
        block
            .validate_successor(self.latest_block())
            .map_err(|source| ChainError::InvalidBlock {
                index: block.index,
                source,
            })?;

        let utxos = apply_transactions(&block.data, &self.utxos, block.index).map_err(|source| {
            ChainError::InvalidTransactions {
                index: block.index,
                source,
            }
        })?;

        self.blocks.push(block);
        self.utxos = utxos;
        Ok(())
    }

    /// Adopt `candidate` if it is valid and carries strictly more work
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<(), ChainError> {
        let utxos = validate_chain(&candidate)?;

        let current = self.accumulated_difficulty();
        let candidate_work = accumulated_difficulty(&candidate);
        if candidate_work <= current {
            return Err(ChainError::InsufficientWork {
                candidate: candidate_work,
                current,
            });
        }

        self.blocks = candidate;
        self.utxos = utxos;
        Ok(())
    }
}
