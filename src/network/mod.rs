//! P2P Networking module
//!
//! TCP peer connections carrying length-prefixed JSON frames, and the gossip
//! protocol that keeps replicas of the ledger converging.

pub mod message;
pub mod p2p;
pub mod peer;
pub mod server;

pub use message::{Message, MAGIC, MAX_MESSAGE_SIZE};
pub use p2p::{
    handle_blockchain_response, spawn_relay, ChainResponse, P2pHandle, P2pNode, PeerBroadcaster,
};
pub use peer::{PeerError, PeerHandle, PeerManager, MAX_PEERS};
pub use server::{connect_to_peer, handle_connection, MessageCodec, Server};
