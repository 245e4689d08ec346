//! UTXO ledger node
//!
//! Runs a ledger node exposing the HTTP API and the P2P gossip port.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use utxo_ledger::api::{create_router, ApiState};
use utxo_ledger::network::{spawn_relay, P2pNode, PeerBroadcaster, PeerManager, Server};
use utxo_ledger::node::{
    parse_peer_list, Node, NodeConfig, DEFAULT_HTTP_PORT, DEFAULT_P2P_PORT, DEFAULT_WALLET_PATH,
};
use utxo_ledger::wallet::Wallet;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(version = "0.1.0")]
#[command(about = "A minimal proof-of-work UTXO ledger node", long_about = None)]
struct Cli {
    /// Wallet key file
    #[arg(short, long, env = "WALLET_PATH", default_value = DEFAULT_WALLET_PATH, global = true)]
    wallet: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start {
        /// Port for the HTTP API
        #[arg(long, env = "HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
        http_port: u16,

        /// Port for P2P connections
        #[arg(long, env = "P2P_PORT", default_value_t = DEFAULT_P2P_PORT)]
        p2p_port: u16,

        /// Peers to connect to at startup (comma-separated host:port)
        #[arg(long, env = "PEERS")]
        peers: Option<String>,
    },

    /// Print the wallet address, creating the key file if needed
    Address,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Address => {
            let wallet = Wallet::load_or_create(&cli.wallet)?;
            println!("{}", wallet.address());
            Ok(())
        }
        Commands::Start {
            http_port,
            p2p_port,
            peers,
        } => {
            let config = NodeConfig {
                http_port,
                p2p_port,
                peers: peers.as_deref().map(parse_peer_list).unwrap_or_default(),
                wallet_path: cli.wallet,
            };
            run_node(config)
        }
    }
}

fn run_node(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let wallet = Wallet::load_or_create(&config.wallet_path)?;
        log::info!("Node address: {}", wallet.address());

        let (broadcaster, announcements) = PeerBroadcaster::channel();
        let node = Arc::new(Node::new(wallet, Arc::new(broadcaster)));
        let peer_manager = Arc::new(PeerManager::new());
        spawn_relay(announcements, peer_manager.clone());

        // P2P
        let server = Server::bind(config.p2p_port).await?;
        let p2p = P2pNode::new(node.clone(), peer_manager);
        let p2p_handle = p2p.handle();
        tokio::spawn(p2p.run(server));

        for peer in &config.peers {
            if let Err(e) = p2p_handle.connect_to(peer).await {
                log::warn!("Failed to connect to {}: {}", peer, e);
            }
        }

        // HTTP
        let app = create_router(ApiState {
            node,
            p2p: p2p_handle,
        });
        let addr = format!("0.0.0.0:{}", config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        log::info!("Listening for HTTP on {}", addr);
        axum::serve(listener, app).await?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
