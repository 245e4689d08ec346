//! Mining engine for the ledger
//!
//! Nonce search runs in batches of [`NONCE_BATCH_SIZE`]. Between batches the
//! miner polls a [`CancelToken`], which trips as soon as the chain head moves
//! (tracked by a [`HeadWatch`] epoch counter). The caller runs the search on a
//! blocking worker and appends the result under its own lock.

use crate::core::block::{data_json, hash_content, Block};
use crate::core::Transaction;
use crate::crypto::hash_matches_difficulty;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Nonces tried between cancellation checks
pub const NONCE_BATCH_SIZE: u64 = 4096;

/// Mining statistics
#[derive(Debug, Clone)]
pub struct MiningStats {
    /// Number of hash attempts
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

/// Everything about a block except its nonce and hash
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: i64,
    pub data: Vec<Transaction>,
    pub difficulty: u32,
}

impl BlockTemplate {
    fn seal(self, nonce: u64, hash: String) -> Block {
        Block {
            index: self.index,
            hash,
            previous_hash: self.previous_hash,
            timestamp: self.timestamp,
            data: self.data,
            difficulty: self.difficulty,
            nonce,
        }
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Epoch counter bumped every time the chain head changes
#[derive(Debug, Clone, Default)]
pub struct HeadWatch {
    epoch: Arc<AtomicU64>,
}

impl HeadWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a head change
    pub fn bump(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// A token that trips on the next head change
    pub fn token(&self) -> CancelToken {
        CancelToken {
            epoch: Some((self.epoch.clone(), self.current())),
        }
    }
}

/// Snapshot of a [`HeadWatch`] epoch
#[derive(Debug, Clone)]
pub struct CancelToken {
    epoch: Option<(Arc<AtomicU64>, u64)>,
}

impl CancelToken {
    /// A token that never trips
    pub fn never() -> Self {
        Self { epoch: None }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.epoch {
            Some((epoch, seen)) => epoch.load(Ordering::SeqCst) != *seen,
            None => false,
        }
    }
}

// =============================================================================
// Miner
// =============================================================================

/// Proof-of-work search
#[derive(Debug, Clone)]
pub struct Miner {
    batch_size: u64,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new()
    }
}

impl Miner {
    pub fn new() -> Self {
        Self {
            batch_size: NONCE_BATCH_SIZE,
        }
    }

    /// Search nonces from 0 until the hash meets the template's difficulty.
    /// Returns `None` if `cancel` trips first.
    pub fn mine(
        &self,
        template: BlockTemplate,
        cancel: &CancelToken,
    ) -> Option<(Block, MiningStats)> {
        let start = Instant::now();
        let data = data_json(&template.data);

        info!(
            "Mining block {} with difficulty {}...",
            template.index, template.difficulty
        );

        let mut nonce: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                debug!(
                    "Mining block {} cancelled after {} attempts",
                    template.index, nonce
                );
                return None;
            }

            let batch_end = nonce.saturating_add(self.batch_size);
            while nonce < batch_end {
                let hash = hash_content(
                    template.index,
                    &template.previous_hash,
                    template.timestamp,
                    &data,
                    template.difficulty,
                    nonce,
                );
                if hash_matches_difficulty(&hash, template.difficulty) {
                    let stats = stats_for(nonce + 1, start);
                    info!(
                        "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
                        template.index, stats.time_ms, stats.hash_attempts, stats.hash_rate
                    );
                    return Some((template.seal(nonce, hash), stats));
                }
                nonce += 1;
            }

            if batch_end == u64::MAX {
                return None;
            }
        }
    }
}

fn stats_for(attempts: u64, start: Instant) -> MiningStats {
    let elapsed = start.elapsed().as_millis();
    let hash_rate = if elapsed > 0 {
        (attempts as f64) / (elapsed as f64 / 1000.0)
    } else {
        attempts as f64
    };
    MiningStats {
        hash_attempts: attempts,
        time_ms: elapsed,
        hash_rate,
    }
}

/// Uncancellable search, for building fixture chains in tests
#[cfg(test)]
pub(crate) fn find_block(
    index: u64,
    previous_hash: &str,
    timestamp: i64,
    data: Vec<Transaction>,
    difficulty: u32,
) -> Block {
    let template = BlockTemplate {
        index,
        previous_hash: previous_hash.to_string(),
        timestamp,
        data,
        difficulty,
    };
    let (block, _) = Miner::new()
        .mine(template, &CancelToken::never())
        .expect("uncancelled search always finds a nonce");
    block
}
