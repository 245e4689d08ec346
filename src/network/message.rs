//! Network message types for P2P communication
//!
//! Defines the five message types of the gossip protocol. Response payloads
//! are decoded entry by entry: an entry that does not parse is kept as raw
//! JSON so one bad block or transaction cannot sink the whole message.

use crate::core::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = [0x55, 0x54, 0x58, 0x4F]; // "UTXO"

/// Largest accepted frame payload (32 MiB)
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// One element of a response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry<T> {
    Parsed(T),
    Malformed(serde_json::Value),
}

impl<T> Entry<T> {
    pub fn parsed(self) -> Option<T> {
        match self {
            Entry::Parsed(item) => Some(item),
            Entry::Malformed(_) => None,
        }
    }
}

/// Network message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Ask for the peer's head block
    QueryLatest,
    /// Ask for the peer's whole chain
    QueryAll,
    /// Blocks answering either query, or an unsolicited new head
    ResponseBlockchain(Vec<Entry<Block>>),
    /// Ask for the peer's pool
    QueryTransactionPool,
    /// Pool contents
    ResponseTransactionPool(Vec<Entry<Transaction>>),
}

impl Message {
    pub fn blockchain(blocks: Vec<Block>) -> Self {
        Message::ResponseBlockchain(blocks.into_iter().map(Entry::Parsed).collect())
    }

    pub fn transaction_pool(txs: Vec<Transaction>) -> Self {
        Message::ResponseTransactionPool(txs.into_iter().map(Entry::Parsed).collect())
    }

    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::QueryLatest => "QueryLatest",
            Message::QueryAll => "QueryAll",
            Message::ResponseBlockchain(_) => "ResponseBlockchain",
            Message::QueryTransactionPool => "QueryTransactionPool",
            Message::ResponseTransactionPool(_) => "ResponseTransactionPool",
        }
    }
}
