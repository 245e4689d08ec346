//! P2P node: glue between the transport and the ledger coordinator
//!
//! Answers chain and pool queries, feeds received chains and transactions into
//! the [`Node`], and relays the node's own announcements to every peer.

use crate::core::{Block, Transaction};
use crate::network::message::{Entry, Message};
use crate::network::peer::{PeerError, PeerManager};
use crate::network::server::{connect_to_peer, handle_connection, Server};
use crate::node::{Broadcaster, Node};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the inbound message queue
const MESSAGE_QUEUE_SIZE: usize = 1000;

// =============================================================================
// Outbound announcements
// =============================================================================

/// [`Broadcaster`] that queues announcements for the relay task
#[derive(Clone)]
pub struct PeerBroadcaster {
    tx: mpsc::UnboundedSender<Message>,
}

impl PeerBroadcaster {
    /// The broadcaster and the queue to hand to [`spawn_relay`]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn queue(&self, msg: Message) {
        if self.tx.send(msg).is_err() {
            debug!("Relay task gone, dropping announcement");
        }
    }
}

impl Broadcaster for PeerBroadcaster {
    fn broadcast_latest(&self, head: &Block) {
        self.queue(Message::blockchain(vec![head.clone()]));
    }

    fn broadcast_pool(&self, pool: &[Transaction]) {
        self.queue(Message::transaction_pool(pool.to_vec()));
    }
}

/// Drain queued announcements to every connected peer
pub fn spawn_relay(
    mut rx: mpsc::UnboundedReceiver<Message>,
    peer_manager: Arc<PeerManager>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            debug!("Broadcasting {}", msg.type_name());
            peer_manager.broadcast(msg).await;
        }
    })
}

// =============================================================================
// Inbound handling
// =============================================================================

/// What a received blockchain message led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainResponse {
    /// Empty, malformed, or not ahead of us
    Ignored,
    /// The received head extended ours
    Appended,
    /// A single block that does not extend ours: asked everyone for full chains
    QueriedAll,
    /// The received chain replaced ours
    Replaced,
    /// The node refused the block or chain
    Rejected,
}

/// Reconcile a received list of blocks with the local chain
pub async fn handle_blockchain_response(
    node: &Node,
    peer_manager: &PeerManager,
    mut received: Vec<Block>,
) -> ChainResponse {
    received.sort_by_key(|b| b.index);
    let Some(latest_received) = received.last().cloned() else {
        debug!("Received an empty blockchain");
        return ChainResponse::Ignored;
    };
    if !latest_received.is_structurally_valid() {
        warn!("Received block has an invalid structure");
        return ChainResponse::Ignored;
    }

    let held = node.latest_block().await;
    if latest_received.index <= held.index {
        debug!("Received blockchain is not ahead of ours. Do nothing");
        return ChainResponse::Ignored;
    }

    info!(
        "Blockchain possibly behind. We got: {} Peer got: {}",
        held.index, latest_received.index
    );

    if held.hash == latest_received.previous_hash {
        if node.try_append(latest_received).await {
            ChainResponse::Appended
        } else {
            ChainResponse::Rejected
        }
    } else if received.len() == 1 {
        info!("We have to query the chain from our peers");
        peer_manager.broadcast(Message::QueryAll).await;
        ChainResponse::QueriedAll
    } else if node.replace_chain(received).await {
        ChainResponse::Replaced
    } else {
        ChainResponse::Rejected
    }
}

/// Cloneable control surface for the API layer
#[derive(Clone)]
pub struct P2pHandle {
    peer_manager: Arc<PeerManager>,
    message_tx: mpsc::Sender<(SocketAddr, Message)>,
}

impl P2pHandle {
    /// Dial a peer and start exchanging messages with it
    pub async fn connect_to(&self, addr: &str) -> Result<(), PeerError> {
        info!("Connecting to peer: {}", addr);
        let (stream, peer_addr) = connect_to_peer(addr).await?;

        let pm = self.peer_manager.clone();
        let message_tx = self.message_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, pm, message_tx, true).await {
                warn!("Connection error with {}: {}", peer_addr, e);
            }
        });
        Ok(())
    }

    /// Addresses of connected peers
    pub async fn peers(&self) -> Vec<String> {
        self.peer_manager
            .get_peers()
            .await
            .into_iter()
            .map(|addr| addr.to_string())
            .collect()
    }
}

/// The P2P node
pub struct P2pNode {
    node: Arc<Node>,
    peer_manager: Arc<PeerManager>,
    message_tx: mpsc::Sender<(SocketAddr, Message)>,
    message_rx: mpsc::Receiver<(SocketAddr, Message)>,
}

impl P2pNode {
    pub fn new(node: Arc<Node>, peer_manager: Arc<PeerManager>) -> Self {
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_QUEUE_SIZE);
        Self {
            node,
            peer_manager,
            message_tx,
            message_rx,
        }
    }

    pub fn handle(&self) -> P2pHandle {
        P2pHandle {
            peer_manager: self.peer_manager.clone(),
            message_tx: self.message_tx.clone(),
        }
    }

    /// Accept peers on `server` and process their messages until every sender is gone
    pub async fn run(mut self, server: Server) {
        let accept_pm = self.peer_manager.clone();
        let accept_tx = self.message_tx.clone();
        tokio::spawn(async move {
            loop {
                match server.accept().await {
                    Ok((stream, addr)) => {
                        info!("Incoming connection from {}", addr);
                        let pm = accept_pm.clone();
                        let tx = accept_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, pm, tx, false).await {
                                warn!("Connection error with {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        log::error!("Accept error: {}", e);
                    }
                }
            }
        });

        while let Some((from, msg)) = self.message_rx.recv().await {
            self.handle_message(from, msg).await;
        }
    }

    async fn reply(&self, to: &SocketAddr, msg: Message) {
        if let Err(e) = self.peer_manager.send_to(to, msg).await {
            warn!("Failed to reply to {}: {}", to, e);
        }
    }

    async fn handle_message(&self, from: SocketAddr, msg: Message) {
        debug!("Received {} from {}", msg.type_name(), from);

        match msg {
            Message::QueryLatest => {
                let latest = self.node.latest_block().await;
                self.reply(&from, Message::blockchain(vec![latest])).await;
            }
            Message::QueryAll => {
                let blocks = self.node.blocks().await;
                self.reply(&from, Message::blockchain(blocks)).await;
            }
            Message::ResponseBlockchain(entries) => {
                let Some(blocks) = entries
                    .into_iter()
                    .map(Entry::parsed)
                    .collect::<Option<Vec<Block>>>()
                else {
                    warn!("Ignoring blockchain from {}: malformed block", from);
                    return;
                };
                let outcome =
                    handle_blockchain_response(&self.node, &self.peer_manager, blocks).await;
                debug!("Blockchain from {}: {:?}", from, outcome);
            }
            Message::QueryTransactionPool => {
                let pool = self.node.pool().await;
                self.reply(&from, Message::transaction_pool(pool)).await;
            }
            Message::ResponseTransactionPool(entries) => {
                for entry in entries {
                    let Some(tx) = entry.parsed() else {
                        debug!("Ignoring malformed transaction from {}", from);
                        continue;
                    };
                    let id = tx.id.clone();
                    if let Err(e) = self.node.receive_transaction(tx).await {
                        debug!("Ignoring transaction {} from {}: {}", id, from, e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UtxoSet;
    use crate::mining::find_block;
    use crate::network::message::MAGIC;
    use crate::network::peer::PeerHandle;
    use crate::network::server::MessageCodec;
    use crate::node::NoopBroadcaster;
    use crate::wallet::Wallet;
    use chrono::Utc;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    fn quiet_node() -> Node {
        Node::new(Wallet::new(), Arc::new(NoopBroadcaster))
    }

    fn extend(previous: &Block, miner: &str) -> Block {
        find_block(
            previous.index + 1,
            &previous.hash,
            Utc::now().timestamp(),
            vec![Transaction::coinbase(miner, previous.index + 1)],
            0,
        )
    }

    #[tokio::test]
    async fn test_response_extending_head_is_appended() {
        let node = quiet_node();
        let pm = PeerManager::new();
        let block = extend(&Block::genesis(), &node.address());

        let outcome = handle_blockchain_response(&node, &pm, vec![block.clone()]).await;
        assert_eq!(outcome, ChainResponse::Appended);
        assert_eq!(node.latest_block().await, block);

        // Stale now
        let outcome = handle_blockchain_response(&node, &pm, vec![block]).await;
        assert_eq!(outcome, ChainResponse::Ignored);
    }

    #[tokio::test]
    async fn test_lone_block_ahead_queries_all() {
        let node = quiet_node();
        let pm = PeerManager::new();
        let (tx, mut rx) = mpsc::channel(4);
        let addr: SocketAddr = "127.0.0.1:7100".parse().unwrap();
        pm.add_peer(PeerHandle {
            addr,
            outbound: true,
            tx,
        })
        .await
        .unwrap();

        let first = extend(&Block::genesis(), &node.address());
        let second = extend(&first, &node.address());

        let outcome = handle_blockchain_response(&node, &pm, vec![second]).await;
        assert_eq!(outcome, ChainResponse::QueriedAll);
        assert_eq!(rx.recv().await, Some(Message::QueryAll));
    }

    #[tokio::test]
    async fn test_full_chain_replaces_ours() {
        let node = quiet_node();
        let pm = PeerManager::new();
        let first = extend(&Block::genesis(), &node.address());
        let second = extend(&first, &node.address());

        // Out of order on purpose
        let chain = vec![second.clone(), Block::genesis(), first];
        let outcome = handle_blockchain_response(&node, &pm, chain).await;
        assert_eq!(outcome, ChainResponse::Replaced);
        assert_eq!(node.latest_block().await, second);
    }

    #[tokio::test]
    async fn test_malformed_or_empty_response_ignored() {
        let node = quiet_node();
        let pm = PeerManager::new();
        assert_eq!(
            handle_blockchain_response(&node, &pm, vec![]).await,
            ChainResponse::Ignored
        );

        let mut block = extend(&Block::genesis(), &node.address());
        block.hash = "nope".into();
        assert_eq!(
            handle_blockchain_response(&node, &pm, vec![block]).await,
            ChainResponse::Ignored
        );
    }

    #[tokio::test]
    async fn test_broadcaster_queues_messages() {
        let (broadcaster, mut rx) = PeerBroadcaster::channel();
        broadcaster.broadcast_latest(&Block::genesis());
        broadcaster.broadcast_pool(&[]);

        assert_eq!(
            rx.recv().await,
            Some(Message::blockchain(vec![Block::genesis()]))
        );
        assert_eq!(
            rx.recv().await,
            Some(Message::transaction_pool(vec![]))
        );
    }

    async fn spawn_peer(wallet: Wallet) -> (Arc<Node>, P2pHandle, String) {
        let (broadcaster, relay_rx) = PeerBroadcaster::channel();
        let node = Arc::new(Node::new(wallet, Arc::new(broadcaster)));
        let pm = Arc::new(PeerManager::new());
        spawn_relay(relay_rx, pm.clone());

        let server = Server::bind(0).await.unwrap();
        let port = server.local_addr().unwrap().port();
        let p2p = P2pNode::new(node.clone(), pm);
        let handle = p2p.handle();
        tokio::spawn(p2p.run(server));
        (node, handle, format!("127.0.0.1:{}", port))
    }

    async fn wait_for_height(node: &Node, height: u64) -> bool {
        for _ in 0..100 {
            if node.latest_block().await.index >= height {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_two_nodes_sync_over_tcp() {
        let (alice, _alice_handle, alice_addr) = spawn_peer(Wallet::new()).await;
        let (bob, bob_handle, _) = spawn_peer(Wallet::new()).await;

        alice.generate_next_block().await.unwrap();

        // Bob asks for the head on connect and appends it
        bob_handle.connect_to(&alice_addr).await.unwrap();
        assert!(wait_for_height(&bob, 1).await);
        assert_eq!(bob.latest_block().await, alice.latest_block().await);

        // New heads are announced to connected peers
        alice.generate_next_block().await.unwrap();
        assert!(wait_for_height(&bob, 2).await);
        assert_eq!(bob_handle.peers().await.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_pool_entries_skipped_and_peer_kept() {
        let wallet = Wallet::new();
        let (node, handle, addr) = spawn_peer(wallet.clone()).await;
        node.generate_next_block().await.unwrap();

        let utxos: UtxoSet = node.unspent_tx_outs().await.into_iter().collect();
        let tx = wallet
            .create_transaction(&Wallet::new().address(), 10, &utxos, &[])
            .unwrap();
        let mut bad = serde_json::to_value(&tx).unwrap();
        bad["txOuts"][0]["amount"] = serde_json::json!(-5);

        let stream = TcpStream::connect(&addr).await.unwrap();
        let mut framed = Framed::new(stream, MessageCodec);

        // A frame whose payload is not a message at all
        let junk = br#"{"type":"NOT_A_MESSAGE"}"#;
        let mut frame = MAGIC.to_vec();
        frame.extend_from_slice(&(junk.len() as u32).to_be_bytes());
        frame.extend_from_slice(junk);
        framed.get_mut().write_all(&frame).await.unwrap();

        framed
            .send(Message::ResponseTransactionPool(vec![
                Entry::Malformed(bad),
                Entry::Parsed(tx.clone()),
            ]))
            .await
            .unwrap();

        let mut pooled = false;
        for _ in 0..100 {
            if node.pool().await == vec![tx.clone()] {
                pooled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(pooled);
        assert_eq!(handle.peers().await.len(), 1);

        // Still answering on the same connection
        framed.send(Message::QueryAll).await.unwrap();
        let mut answered = false;
        for _ in 0..10 {
            match framed.next().await {
                Some(Ok(Message::ResponseBlockchain(entries))) if entries.len() == 2 => {
                    answered = true;
                    break;
                }
                Some(Ok(_)) => continue,
                _ => break,
            }
        }
        assert!(answered);
    }
}
