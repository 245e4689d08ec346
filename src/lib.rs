//! utxo-ledger: a minimal proof-of-work UTXO ledger in Rust
//!
//! This crate provides:
//! - Blocks chained by SHA-256 with leading-zero-bit proof-of-work
//! - Difficulty retargeting and heaviest-chain fork choice
//! - UTXO transactions signed with ECDSA (secp256k1)
//! - A transaction pool guarded against double spends
//! - A single-key wallet
//! - TCP gossip between nodes and an HTTP control API
//!
//! # Example
//!
//! ```rust
//! use utxo_ledger::core::{Blockchain, Transaction};
//! use utxo_ledger::mining::{BlockTemplate, CancelToken, Miner};
//! use utxo_ledger::wallet::Wallet;
//!
//! let mut blockchain = Blockchain::new();
//! let wallet = Wallet::new();
//!
//! // Mine a reward block on top of genesis
//! let head = blockchain.latest_block().clone();
//! let template = BlockTemplate {
//!     index: head.index + 1,
//!     previous_hash: head.hash.clone(),
//!     timestamp: head.timestamp + 1,
//!     data: vec![Transaction::coinbase(&wallet.address(), head.index + 1)],
//!     difficulty: blockchain.next_difficulty(),
//! };
//! let (block, stats) = Miner::new().mine(template, &CancelToken::never()).unwrap();
//! println!("Mined block {} in {}ms", block.index, stats.time_ms);
//! blockchain.try_append(block).unwrap();
//!
//! assert_eq!(blockchain.utxos().balance_of(&wallet.address()), 50);
//! ```

pub mod api;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod node;
pub mod wallet;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use core::{Block, Blockchain, Transaction, UtxoSet, COINBASE_AMOUNT};
pub use crypto::KeyPair;
pub use mining::{Mempool, Miner};
pub use node::{Node, NodeConfig};
pub use wallet::Wallet;
