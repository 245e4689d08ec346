//! Transaction pool (mempool) for pending transactions
//!
//! Holds unconfirmed transactions that are each valid against the current
//! UTXO set and never spend the same output twice. After every replacement of
//! the UTXO set the pool is pruned of entries whose inputs are gone.

use crate::core::{validate_transaction, OutPoint, Transaction, TransactionError, UtxoSet};
use log::debug;
use thiserror::Error;

/// Mempool errors
#[derive(Error, Debug)]
pub enum MempoolError {
    #[error("Transaction validation error: {0}")]
    InvalidTransaction(#[from] TransactionError),
    #[error("Output {tx_out_id}:{tx_out_index} is already spent by a pooled transaction")]
    DoubleSpend { tx_out_id: String, tx_out_index: u64 },
}

/// Memory pool for pending transactions, in arrival order
#[derive(Debug, Default, Clone)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    /// Create a new mempool
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any pooled transaction already spends `out_point`
    fn spends(&self, out_point: &OutPoint) -> bool {
        self.transactions.iter().any(|tx| tx.spends(out_point))
    }

    /// Add a transaction that is valid against `utxos` and conflicts with no pool entry
    pub fn add_transaction(
        &mut self,
        tx: Transaction,
        utxos: &UtxoSet,
    ) -> Result<(), MempoolError> {
        validate_transaction(&tx, utxos)?;

        if let Some(tx_in) = tx.tx_ins.iter().find(|tx_in| self.spends(&tx_in.out_point())) {
            return Err(MempoolError::DoubleSpend {
                tx_out_id: tx_in.tx_out_id.clone(),
                tx_out_index: tx_in.tx_out_index,
            });
        }

        debug!("Adding transaction {} to mempool", tx.id);
        self.transactions.push(tx);
        Ok(())
    }

    /// Drop (and return) every transaction with an input missing from `utxos`
    pub fn prune(&mut self, utxos: &UtxoSet) -> Vec<Transaction> {
        let (keep, removed): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.transactions)
                .into_iter()
                .partition(|tx| {
                    tx.tx_ins
                        .iter()
                        .all(|tx_in| utxos.contains(&tx_in.tx_out_id, tx_in.tx_out_index))
                });
        self.transactions = keep;

        for tx in &removed {
            debug!("Removing transaction {} from mempool", tx.id);
        }
        removed
    }

    /// Independent copy of the pool contents
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    /// Outputs already claimed by pooled transactions
    pub fn spent_out_points(&self) -> Vec<OutPoint> {
        self.transactions
            .iter()
            .flat_map(|tx| tx.tx_ins.iter().map(|tx_in| tx_in.out_point()))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id == id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
