//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (UTXO model, signatures, conservation of value)
//! - The UTXO set
//! - Blocks (proof of work, structural and successor validation)
//! - Blockchain (retargeting, chain validation, fork choice)

pub mod block;
pub mod blockchain;
pub mod transaction;
pub mod utxo;

pub use block::{
    calculate_hash, Block, BlockError, GENESIS_ADDRESS, GENESIS_HASH, GENESIS_TIMESTAMP,
    GENESIS_TX_ID, TIMESTAMP_TOLERANCE,
};
pub use blockchain::{
    accumulated_difficulty, adjust_difficulty, compute_difficulty, validate_chain, Blockchain,
    ChainError, BLOCK_GENERATION_INTERVAL, DIFFICULTY_ADJUSTMENT_INTERVAL,
};
pub use transaction::{
    apply_transactions, compute_transaction_id, is_valid_address, sign_tx_input,
    validate_block_transactions, validate_coinbase_transaction, validate_transaction,
    Transaction, TransactionError, TxIn, TxOut, COINBASE_AMOUNT,
};
pub use utxo::{OutPoint, UnspentTxOut, UtxoSet};
