//! Ledger node: the coordinator that owns chain, UTXO set and pool

pub mod config;
pub mod node;

pub use config::{
    parse_peer_list, NodeConfig, DEFAULT_HTTP_PORT, DEFAULT_P2P_PORT, DEFAULT_WALLET_PATH,
};
pub use node::{Broadcaster, LedgerState, Node, NodeError, NoopBroadcaster};
