//! Peer management for P2P networking
//!
//! Tracks connected peers and routes outbound messages to their writer tasks.

use crate::network::message::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

/// Maximum number of connected peers
pub const MAX_PEERS: usize = 32;

/// Peer connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Peer disconnected")]
    Disconnected,
    #[error("Max peers reached")]
    MaxPeersReached,
}

/// Handle for sending messages to a peer
#[derive(Clone)]
pub struct PeerHandle {
    pub addr: SocketAddr,
    pub outbound: bool,
    pub tx: mpsc::Sender<Message>,
}

impl PeerHandle {
    pub async fn send(&self, msg: Message) -> Result<(), PeerError> {
        self.tx.send(msg).await.map_err(|_| PeerError::Disconnected)
    }
}

/// Manages all peer connections
#[derive(Default)]
pub struct PeerManager {
    handles: RwLock<HashMap<SocketAddr, PeerHandle>>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new peer
    pub async fn add_peer(&self, handle: PeerHandle) -> Result<(), PeerError> {
        let mut handles = self.handles.write().await;

        if handles.len() >= MAX_PEERS {
            return Err(PeerError::MaxPeersReached);
        }

        log::info!("Added peer: {} (outbound: {})", handle.addr, handle.outbound);
        handles.insert(handle.addr, handle);
        Ok(())
    }

    /// Remove a peer
    pub async fn remove_peer(&self, addr: &SocketAddr) {
        let mut handles = self.handles.write().await;
        if handles.remove(addr).is_some() {
            log::info!("Removed peer: {}", addr);
        }
    }

    /// Get all connected peer addresses
    pub async fn get_peers(&self) -> Vec<SocketAddr> {
        let handles = self.handles.read().await;
        let mut peers: Vec<SocketAddr> = handles.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Get peer count
    pub async fn peer_count(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Broadcast a message to all peers
    pub async fn broadcast(&self, msg: Message) {
        let handles: Vec<PeerHandle> = self.handles.read().await.values().cloned().collect();
        for handle in handles {
            if let Err(e) = handle.send(msg.clone()).await {
                log::warn!("Failed to send to {}: {}", handle.addr, e);
            }
        }
    }

    /// Send a message to a specific peer
    pub async fn send_to(&self, addr: &SocketAddr, msg: Message) -> Result<(), PeerError> {
        let handle = self.handles.read().await.get(addr).cloned();
        match handle {
            Some(handle) => handle.send(msg).await,
            None => Err(PeerError::Disconnected),
        }
    }
}
