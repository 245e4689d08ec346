//! Node configuration

use std::path::PathBuf;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 3001;

/// Default P2P listening port
pub const DEFAULT_P2P_PORT: u16 = 6001;

/// Default location of the wallet key file
pub const DEFAULT_WALLET_PATH: &str = "node/wallet/private_key.json";

/// Runtime configuration for a ledger node
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port the HTTP API listens on
    pub http_port: u16,
    /// Port the P2P server listens on
    pub p2p_port: u16,
    /// Peers to dial at startup (`host:port`)
    pub peers: Vec<String>,
    /// Wallet key file
    pub wallet_path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            p2p_port: DEFAULT_P2P_PORT,
            peers: Vec::new(),
            wallet_path: PathBuf::from(DEFAULT_WALLET_PATH),
        }
    }
}

/// Split a comma-separated peer list, skipping blanks
pub fn parse_peer_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
