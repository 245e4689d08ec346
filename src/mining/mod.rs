//! Mining module for block creation and transaction pooling

pub mod mempool;
pub mod miner;

pub use mempool::{Mempool, MempoolError};
pub use miner::{BlockTemplate, CancelToken, HeadWatch, Miner, MiningStats, NONCE_BATCH_SIZE};

#[cfg(test)]
pub(crate) use miner::find_block;
