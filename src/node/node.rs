//! Ledger coordinator
//!
//! Owns the chain, its UTXO set and the transaction pool as one unit behind a
//! single lock. Every mutation takes the write lock for the whole unit, so a
//! half-applied update is never visible. Mining runs on a blocking worker with
//! no lock held and is cancelled as soon as the head moves underneath it.

use crate::core::{
    is_valid_address, Block, Blockchain, ChainError, Transaction, UnspentTxOut,
};
use crate::mining::{BlockTemplate, HeadWatch, Mempool, MempoolError, Miner};
use crate::wallet::{Wallet, WalletError};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Outbound gossip consumed by the coordinator. Calls must not block.
pub trait Broadcaster: Send + Sync {
    /// Announce a new chain head
    fn broadcast_latest(&self, head: &Block);
    /// Announce the current pool contents
    fn broadcast_pool(&self, pool: &[Transaction]);
}

/// Broadcaster for a node with no peers
#[derive(Debug, Default)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn broadcast_latest(&self, _head: &Block) {}
    fn broadcast_pool(&self, _pool: &[Transaction]) {}
}

/// Coordinator errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Amount must be positive")]
    InvalidAmount,
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("Mempool error: {0}")]
    Mempool(#[from] MempoolError),
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Mining cancelled: chain head changed")]
    MiningCancelled,
    #[error("Mining task failed: {0}")]
    MiningTask(String),
}

/// Chain, UTXO set and pool, always updated together
#[derive(Debug, Default)]
pub struct LedgerState {
    pub blockchain: Blockchain,
    pub mempool: Mempool,
}

/// The ledger node
pub struct Node {
    state: RwLock<LedgerState>,
    wallet: Wallet,
    broadcaster: Arc<dyn Broadcaster>,
    head_watch: HeadWatch,
    miner: Miner,
}

impl Node {
    /// Create a node at genesis with an empty pool
    pub fn new(wallet: Wallet, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            wallet,
            broadcaster,
            head_watch: HeadWatch::new(),
            miner: Miner::new(),
        }
    }

    // =========================================================================
    // Reads (all return owned copies)
    // =========================================================================

    pub async fn blocks(&self) -> Vec<Block> {
        self.state.read().await.blockchain.blocks().to_vec()
    }

    pub async fn latest_block(&self) -> Block {
        self.state.read().await.blockchain.latest_block().clone()
    }

    pub async fn block_by_hash(&self, hash: &str) -> Option<Block> {
        self.state
            .read()
            .await
            .blockchain
            .get_block_by_hash(hash)
            .cloned()
    }

    /// Confirmed transaction by id
    pub async fn transaction_by_id(&self, id: &str) -> Option<Transaction> {
        self.state
            .read()
            .await
            .blockchain
            .find_transaction(id)
            .cloned()
    }

    pub async fn unspent_tx_outs(&self) -> Vec<UnspentTxOut> {
        self.state.read().await.blockchain.utxos().to_vec()
    }

    pub async fn unspent_tx_outs_for(&self, address: &str) -> Vec<UnspentTxOut> {
        self.state.read().await.blockchain.utxos().owned_by(address)
    }

    pub async fn my_unspent_tx_outs(&self) -> Vec<UnspentTxOut> {
        self.unspent_tx_outs_for(&self.wallet.address()).await
    }

    pub async fn balance_of(&self, address: &str) -> u128 {
        self.state.read().await.blockchain.utxos().balance_of(address)
    }

    pub async fn account_balance(&self) -> u128 {
        self.balance_of(&self.wallet.address()).await
    }

    pub fn address(&self) -> String {
        self.wallet.address()
    }

    pub async fn pool(&self) -> Vec<Transaction> {
        self.state.read().await.mempool.snapshot()
    }

    // =========================================================================
    // Mining
    // =========================================================================

    /// Mine `data` as-is on top of the current head
    pub async fn generate_raw_next_block(
        &self,
        data: Vec<Transaction>,
    ) -> Result<Block, NodeError> {
        self.mine_on_head(move |_, _| Ok(data)).await
    }

    /// Mine a block paying the reward to this node, carrying the whole pool
    pub async fn generate_next_block(&self) -> Result<Block, NodeError> {
        let address = self.wallet.address();
        self.mine_on_head(move |state, index| {
            let mut data = vec![Transaction::coinbase(&address, index)];
            data.extend(state.mempool.snapshot());
            Ok(data)
        })
        .await
    }

    /// Mine a block with the reward, a fresh transfer to `receiver`, and the pool
    pub async fn generate_next_block_with_transaction(
        &self,
        receiver: &str,
        amount: u64,
    ) -> Result<Block, NodeError> {
        check_transfer(receiver, amount)?;

        let wallet = self.wallet.clone();
        let receiver = receiver.to_string();
        self.mine_on_head(move |state, index| {
            let pool = state.mempool.snapshot();
            let transfer =
                wallet.create_transaction(&receiver, amount, state.blockchain.utxos(), &pool)?;
            let mut data = vec![Transaction::coinbase(&wallet.address(), index), transfer];
            data.extend(pool);
            Ok(data)
        })
        .await
    }

    /// Build the template under the read lock, search off the lock, then append
    async fn mine_on_head<F>(&self, build: F) -> Result<Block, NodeError>
    where
        F: FnOnce(&LedgerState, u64) -> Result<Vec<Transaction>, NodeError>,
    {
        let (template, cancel) = {
            let guard = self.state.read().await;
            let state: &LedgerState = &guard;
            let latest = state.blockchain.latest_block();
            let index = latest.index + 1;
            let template = BlockTemplate {
                index,
                previous_hash: latest.hash.clone(),
                timestamp: Utc::now().timestamp(),
                data: build(state, index)?,
                difficulty: state.blockchain.next_difficulty(),
            };
            (template, self.head_watch.token())
        };

        let miner = self.miner.clone();
        let mined = tokio::task::spawn_blocking(move || miner.mine(template, &cancel))
            .await
            .map_err(|e| NodeError::MiningTask(e.to_string()))?;
        let (block, _stats) = mined.ok_or(NodeError::MiningCancelled)?;

        self.append(block.clone()).await?;
        Ok(block)
    }

    // =========================================================================
    // Chain updates
    // =========================================================================

    async fn append(&self, block: Block) -> Result<(), ChainError> {
        {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            state.blockchain.try_append(block.clone())?;
            self.head_watch.bump();
            state.mempool.prune(state.blockchain.utxos());
        }
        info!("Appended block {} ({})", block.index, block.hash);
        self.broadcaster.broadcast_latest(&block);
        Ok(())
    }

    /// Append `block` if it extends the head. Never panics; false on rejection.
    pub async fn try_append(&self, block: Block) -> bool {
        let index = block.index;
        match self.append(block).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Rejected block {}: {}", index, e);
                false
            }
        }
    }

    /// Adopt `candidate` if it is valid and strictly heavier than ours
    pub async fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        let head = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            if let Err(e) = state.blockchain.replace_chain(candidate) {
                warn!("Received blockchain rejected: {}", e);
                return false;
            }
            self.head_watch.bump();
            let dropped = state.mempool.prune(state.blockchain.utxos());
            if !dropped.is_empty() {
                debug!("Dropped {} stale pool transactions", dropped.len());
            }
            state.blockchain.latest_block().clone()
        };

        info!(
            "Received blockchain is valid. Replaced current blockchain, head is now {}",
            head.index
        );
        self.broadcaster.broadcast_latest(&head);
        true
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Create a transfer from the local wallet, pool it and announce the pool
    pub async fn send_transaction(
        &self,
        receiver: &str,
        amount: u64,
    ) -> Result<Transaction, NodeError> {
        check_transfer(receiver, amount)?;

        let (tx, pool) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let tx = self.wallet.create_transaction(
                receiver,
                amount,
                state.blockchain.utxos(),
                &state.mempool.snapshot(),
            )?;
            state
                .mempool
                .add_transaction(tx.clone(), state.blockchain.utxos())?;
            (tx, state.mempool.snapshot())
        };

        info!("Added transaction {} to pool", tx.id);
        self.broadcaster.broadcast_pool(&pool);
        Ok(tx)
    }

    /// Pool a transaction received from a peer and re-announce the pool
    pub async fn receive_transaction(&self, tx: Transaction) -> Result<(), NodeError> {
        let pool = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            state
                .mempool
                .add_transaction(tx, state.blockchain.utxos())?;
            state.mempool.snapshot()
        };

        self.broadcaster.broadcast_pool(&pool);
        Ok(())
    }
}

fn check_transfer(receiver: &str, amount: u64) -> Result<(), NodeError> {
    if !is_valid_address(receiver) {
        return Err(NodeError::InvalidAddress(receiver.to_string()));
    }
    if amount == 0 {
        return Err(NodeError::InvalidAmount);
    }
    Ok(())
}
