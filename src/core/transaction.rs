//! Transaction model and validation
//!
//! Implements the UTXO transaction model:
//! - Transaction ids derived from inputs and outputs
//! - Signature verification against the address recorded in the spent output
//! - Exact conservation of value for every non-coinbase transaction
//! - Coinbase rules and the block-level no-double-spend rule
//! - Applying a validated block of transactions to the UTXO set

use crate::core::utxo::{OutPoint, UnspentTxOut, UtxoSet};
use crate::crypto::{is_hash_hex, sha256_hex, verify_hex_signature, KeyError, KeyPair};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Reward paid by every coinbase transaction
pub const COINBASE_AMOUNT: u64 = 50;

/// Length of an address (hex of an uncompressed secp256k1 public key)
pub const ADDRESS_HEX_LEN: usize = 130;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Malformed transaction: {0}")]
    Structural(String),
    #[error("Transaction id mismatch: claimed {claimed}, computed {computed}")]
    IdMismatch { claimed: String, computed: String },
    #[error("Referenced output {tx_out_id}:{tx_out_index} is not unspent")]
    MissingUtxo { tx_out_id: String, tx_out_index: u64 },
    #[error("Invalid signature on input {0}")]
    InvalidSignature(usize),
    #[error("Inputs ({inputs}) do not equal outputs ({outputs})")]
    Unbalanced { inputs: u128, outputs: u128 },
    #[error("Invalid coinbase transaction: {0}")]
    InvalidCoinbase(String),
    #[error("Output {tx_out_id}:{tx_out_index} is spent more than once")]
    DuplicateInput { tx_out_id: String, tx_out_index: u64 },
    #[error("Key does not own the referenced output")]
    KeyMismatch,
    #[error("Input index {0} out of range")]
    InputOutOfRange(usize),
    #[error("Crypto error: {0}")]
    Crypto(#[from] KeyError),
}

// =============================================================================
// Transaction Types
// =============================================================================

/// Transaction input: a reference to an unspent output plus the owner's signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxIn {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    /// Hex DER signature over the owning transaction's id
    pub signature: String,
}

impl TxIn {
    /// An input with no signature yet
    pub fn unsigned(tx_out_id: impl Into<String>, tx_out_index: u64) -> Self {
        Self {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
            signature: String::new(),
        }
    }

    pub fn out_point(&self) -> OutPoint {
        OutPoint::new(self.tx_out_id.clone(), self.tx_out_index)
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOut {
    pub address: String,
    pub amount: u64,
}

impl TxOut {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

/// A ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

impl Transaction {
    /// Build a transaction and derive its id. Inputs are left as given.
    pub fn new(tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Self {
        let mut tx = Self {
            id: String::new(),
            tx_ins,
            tx_outs,
        };
        tx.id = compute_transaction_id(&tx);
        tx
    }

    /// The reward transaction for the block at `block_index`
    pub fn coinbase(address: &str, block_index: u64) -> Self {
        Self::new(
            vec![TxIn::unsigned("", block_index)],
            vec![TxOut::new(address, COINBASE_AMOUNT)],
        )
    }

    pub fn total_output(&self) -> u128 {
        self.tx_outs.iter().map(|out| out.amount as u128).sum()
    }

    /// Whether this transaction spends `out_point`
    pub fn spends(&self, out_point: &OutPoint) -> bool {
        self.tx_ins.iter().any(|tx_in| {
            tx_in.tx_out_id == out_point.tx_out_id && tx_in.tx_out_index == out_point.tx_out_index
        })
    }
}

/// SHA-256 over every input's `txOutId ++ txOutIndex` then every output's `address ++ amount`
pub fn compute_transaction_id(tx: &Transaction) -> String {
    let mut content = String::new();
    for tx_in in &tx.tx_ins {
        content.push_str(&tx_in.tx_out_id);
        content.push_str(&tx_in.tx_out_index.to_string());
    }
    for tx_out in &tx.tx_outs {
        content.push_str(&tx_out.address);
        content.push_str(&tx_out.amount.to_string());
    }
    sha256_hex(content.as_bytes())
}

/// Exactly 130 hex characters starting with "04"
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_HEX_LEN
        && address.starts_with("04")
        && address.bytes().all(|b| b.is_ascii_hexdigit())
}

// =============================================================================
// Validation
// =============================================================================

fn validate_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    for (i, tx_out) in tx.tx_outs.iter().enumerate() {
        if !is_valid_address(&tx_out.address) {
            return Err(TransactionError::Structural(format!(
                "output {} has an invalid address",
                i
            )));
        }
        if tx_out.amount == 0 {
            return Err(TransactionError::Structural(format!(
                "output {} has a zero amount",
                i
            )));
        }
    }
    Ok(())
}

fn validate_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if !is_hash_hex(&tx.id) {
        return Err(TransactionError::Structural("id is not a sha256 hex digest".into()));
    }
    if tx.tx_ins.is_empty() {
        return Err(TransactionError::Structural("no inputs".into()));
    }
    for (i, tx_in) in tx.tx_ins.iter().enumerate() {
        if !is_hash_hex(&tx_in.tx_out_id) {
            return Err(TransactionError::Structural(format!(
                "input {} references a malformed transaction id",
                i
            )));
        }
        if hex::decode(&tx_in.signature).is_err() {
            return Err(TransactionError::Structural(format!(
                "input {} signature is not hex",
                i
            )));
        }
    }
    validate_outputs(tx)
}

fn check_id(tx: &Transaction) -> Result<(), TransactionError> {
    let computed = compute_transaction_id(tx);
    if computed != tx.id {
        return Err(TransactionError::IdMismatch {
            claimed: tx.id.clone(),
            computed,
        });
    }
    Ok(())
}

/// Validate a regular (non-coinbase) transaction against the UTXO set
pub fn validate_transaction(tx: &Transaction, utxos: &UtxoSet) -> Result<(), TransactionError> {
    validate_structure(tx)?;
    check_id(tx)?;

    let mut seen = HashSet::new();
    let mut inputs: u128 = 0;
    for (i, tx_in) in tx.tx_ins.iter().enumerate() {
        if !seen.insert(tx_in.out_point()) {
            return Err(TransactionError::DuplicateInput {
                tx_out_id: tx_in.tx_out_id.clone(),
                tx_out_index: tx_in.tx_out_index,
            });
        }

        let utxo = utxos
            .get(&tx_in.tx_out_id, tx_in.tx_out_index)
            .ok_or_else(|| TransactionError::MissingUtxo {
                tx_out_id: tx_in.tx_out_id.clone(),
                tx_out_index: tx_in.tx_out_index,
            })?;

        if !verify_hex_signature(&utxo.address, &tx.id, &tx_in.signature) {
            return Err(TransactionError::InvalidSignature(i));
        }

        inputs += utxo.amount as u128;
    }

    let outputs = tx.total_output();
    if inputs != outputs {
        return Err(TransactionError::Unbalanced { inputs, outputs });
    }

    Ok(())
}

/// Validate the reward transaction of the block at `block_index`
pub fn validate_coinbase_transaction(
    tx: &Transaction,
    block_index: u64,
) -> Result<(), TransactionError> {
    check_id(tx)?;

    let [tx_in] = tx.tx_ins.as_slice() else {
        return Err(TransactionError::InvalidCoinbase(format!(
            "expected one input, found {}",
            tx.tx_ins.len()
        )));
    };
    if tx_in.tx_out_index != block_index {
        return Err(TransactionError::InvalidCoinbase(format!(
            "input index {} does not match block height {}",
            tx_in.tx_out_index, block_index
        )));
    }
    if !tx_in.tx_out_id.is_empty() || !tx_in.signature.is_empty() {
        return Err(TransactionError::InvalidCoinbase(
            "input must not reference an output or carry a signature".into(),
        ));
    }

    let [tx_out] = tx.tx_outs.as_slice() else {
        return Err(TransactionError::InvalidCoinbase(format!(
            "expected one output, found {}",
            tx.tx_outs.len()
        )));
    };
    if tx_out.amount != COINBASE_AMOUNT {
        return Err(TransactionError::InvalidCoinbase(format!(
            "reward is {}, expected {}",
            tx_out.amount, COINBASE_AMOUNT
        )));
    }
    validate_outputs(tx)
}

/// Validate the full transaction list of the block at `block_index`
pub fn validate_block_transactions(
    txs: &[Transaction],
    utxos: &UtxoSet,
    block_index: u64,
) -> Result<(), TransactionError> {
    let (coinbase, rest) = txs
        .split_first()
        .ok_or_else(|| TransactionError::InvalidCoinbase("block has no transactions".into()))?;
    validate_coinbase_transaction(coinbase, block_index)?;

    let mut seen = HashSet::new();
    for tx_in in txs.iter().flat_map(|tx| tx.tx_ins.iter()) {
        if !seen.insert(tx_in.out_point()) {
            return Err(TransactionError::DuplicateInput {
                tx_out_id: tx_in.tx_out_id.clone(),
                tx_out_index: tx_in.tx_out_index,
            });
        }
    }

    for tx in rest {
        validate_transaction(tx, utxos)?;
    }

    Ok(())
}

/// Validate a block's transactions and derive the resulting UTXO set.
/// The input set is left untouched.
pub fn apply_transactions(
    txs: &[Transaction],
    utxos: &UtxoSet,
    block_index: u64,
) -> Result<UtxoSet, TransactionError> {
    validate_block_transactions(txs, utxos, block_index)?;

    let spent: Vec<OutPoint> = txs
        .iter()
        .flat_map(|tx| tx.tx_ins.iter().map(TxIn::out_point))
        .collect();

    let created: Vec<UnspentTxOut> = txs
        .iter()
        .flat_map(|tx| {
            tx.tx_outs
                .iter()
                .enumerate()
                .map(move |(i, tx_out)| UnspentTxOut {
                    tx_out_id: tx.id.clone(),
                    tx_out_index: i as u64,
                    address: tx_out.address.clone(),
                    amount: tx_out.amount,
                })
        })
        .collect();

    Ok(utxos.with_changes(&spent, created))
}

// =============================================================================
// Signing
// =============================================================================

/// Sign input `input_index` of `tx` with `key_pair`, returning the hex DER signature
pub fn sign_tx_input(
    tx: &Transaction,
    input_index: usize,
    key_pair: &KeyPair,
    utxos: &UtxoSet,
) -> Result<String, TransactionError> {
    let tx_in = tx
        .tx_ins
        .get(input_index)
        .ok_or(TransactionError::InputOutOfRange(input_index))?;

    let utxo = utxos
        .get(&tx_in.tx_out_id, tx_in.tx_out_index)
        .ok_or_else(|| TransactionError::MissingUtxo {
            tx_out_id: tx_in.tx_out_id.clone(),
            tx_out_index: tx_in.tx_out_index,
        })?;

    if utxo.address != key_pair.address() {
        return Err(TransactionError::KeyMismatch);
    }

    Ok(key_pair.sign_hex_digest(&tx.id)?)
}
