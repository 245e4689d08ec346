//! Wallet module for key and transaction management

pub mod wallet;

pub use wallet::{find_tx_outs_for_amount, Wallet, WalletError};
