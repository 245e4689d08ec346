//! Wallet implementation for the ledger
//!
//! Holds the node's key pair, persists it to a key file, and builds signed
//! transfers out of the outputs it owns.

use crate::core::{
    sign_tx_input, OutPoint, Transaction, TransactionError, TxIn, TxOut, UnspentTxOut, UtxoSet,
};
use crate::crypto::KeyPair;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u128, need: u64 },
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] crate::crypto::KeyError),
}

/// On-disk key file
#[derive(Debug, Serialize, Deserialize)]
struct WalletData {
    private_key_hex: String,
    address: String,
}

/// A wallet for managing the node's key and creating transactions
#[derive(Clone)]
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    /// Create a new wallet with a fresh key pair
    pub fn new() -> Self {
        Self {
            key_pair: KeyPair::generate(),
        }
    }

    /// Import a wallet from a private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        let key_pair = KeyPair::from_private_key_hex(private_key_hex)?;
        Ok(Self { key_pair })
    }

    /// Load the key file at `path`, or generate a key and write it there
    pub fn load_or_create(path: &Path) -> Result<Self, WalletError> {
        if path.exists() {
            let wallet = Self::load(path)?;
            info!("Loaded wallet {} from {}", short(&wallet.address()), path.display());
            return Ok(wallet);
        }

        let wallet = Self::new();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        wallet.save(path)?;
        info!("Created new wallet {} at {}", short(&wallet.address()), path.display());
        Ok(wallet)
    }

    /// Get the wallet's address
    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// Get the wallet's private key (hex)
    /// WARNING: Keep this secret!
    pub fn private_key(&self) -> String {
        self.key_pair.private_key_hex()
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Outputs in `utxos` owned by this wallet
    pub fn my_unspent(&self, utxos: &UtxoSet) -> Vec<UnspentTxOut> {
        utxos.owned_by(&self.address())
    }

    /// Create a signed transfer of `amount` to `receiver`.
    /// Outputs already spent by `pool` are not reused.
    pub fn create_transaction(
        &self,
        receiver: &str,
        amount: u64,
        utxos: &UtxoSet,
        pool: &[Transaction],
    ) -> Result<Transaction, WalletError> {
        let address = self.address();
        let pooled: HashSet<OutPoint> = pool
            .iter()
            .flat_map(|tx| tx.tx_ins.iter().map(TxIn::out_point))
            .collect();
        let spendable: Vec<UnspentTxOut> = utxos
            .owned_by(&address)
            .into_iter()
            .filter(|utxo| !pooled.contains(&utxo.out_point()))
            .collect();

        let (selected, leftover) = find_tx_outs_for_amount(amount, &spendable)?;

        let tx_ins = selected
            .iter()
            .map(|utxo| TxIn::unsigned(utxo.tx_out_id.clone(), utxo.tx_out_index))
            .collect();
        let mut tx_outs = vec![TxOut::new(receiver, amount)];
        if leftover > 0 {
            tx_outs.push(TxOut::new(address, leftover));
        }

        let mut tx = Transaction::new(tx_ins, tx_outs);
        for i in 0..tx.tx_ins.len() {
            let signature = sign_tx_input(&tx, i, &self.key_pair, utxos)?;
            tx.tx_ins[i].signature = signature;
        }
        Ok(tx)
    }

    /// Save wallet to file
    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let data = WalletData {
            private_key_hex: self.private_key(),
            address: self.address(),
        };

        let json = serde_json::to_string_pretty(&data)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load wallet from file
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let data: WalletData = serde_json::from_str(&json)?;
        Self::from_private_key(&data.private_key_hex)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Take outputs in order until they cover `amount`.
/// Returns the selection and what is left over once `amount` is paid.
pub fn find_tx_outs_for_amount(
    amount: u64,
    owned: &[UnspentTxOut],
) -> Result<(Vec<UnspentTxOut>, u64), WalletError> {
    let mut selected = Vec::new();
    let mut total: u128 = 0;

    for utxo in owned {
        selected.push(utxo.clone());
        total += utxo.amount as u128;
        if total >= amount as u128 {
            let leftover = u64::try_from(total - amount as u128).unwrap_or(u64::MAX);
            return Ok((selected, leftover));
        }
    }

    Err(WalletError::InsufficientFunds {
        have: total,
        need: amount,
    })
}

fn short(address: &str) -> &str {
    address.get(..16).unwrap_or(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{apply_transactions, validate_transaction};

    /// UTXO set with two coinbase rewards owned by `wallet`
    fn funded(wallet: &Wallet) -> UtxoSet {
        let first = Transaction::coinbase(&wallet.address(), 1);
        let utxos = apply_transactions(&[first], &UtxoSet::new(), 1).unwrap();
        let second = Transaction::coinbase(&wallet.address(), 2);
        apply_transactions(&[second], &utxos, 2).unwrap()
    }

    #[test]
    fn test_wallet_import() {
        let wallet1 = Wallet::new();
        let private_key = wallet1.private_key();

        let wallet2 = Wallet::from_private_key(&private_key).unwrap();
        assert_eq!(wallet1.address(), wallet2.address());
    }

    #[test]
    fn test_load_or_create() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("node").join("wallet").join("private_key.json");

        let wallet1 = Wallet::load_or_create(&path).unwrap();
        assert!(path.exists());

        let wallet2 = Wallet::load_or_create(&path).unwrap();
        assert_eq!(wallet1.address(), wallet2.address());
    }

    #[test]
    fn test_find_tx_outs_for_amount() {
        let wallet = Wallet::new();
        let owned = funded(&wallet).owned_by(&wallet.address());

        let (selected, leftover) = find_tx_outs_for_amount(30, &owned).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(leftover, 20);

        let (selected, leftover) = find_tx_outs_for_amount(100, &owned).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(leftover, 0);

        assert!(matches!(
            find_tx_outs_for_amount(101, &owned),
            Err(WalletError::InsufficientFunds { have: 100, need: 101 })
        ));
    }

    #[test]
    fn test_transaction_creation() {
        let wallet = Wallet::new();
        let utxos = funded(&wallet);
        let recipient = Wallet::new().address();

        let tx = wallet.create_transaction(&recipient, 70, &utxos, &[]).unwrap();

        assert_eq!(tx.tx_ins.len(), 2);
        assert_eq!(tx.tx_outs[0], TxOut::new(recipient, 70));
        assert_eq!(tx.tx_outs[1], TxOut::new(wallet.address(), 30));
        assert!(validate_transaction(&tx, &utxos).is_ok());
    }

    #[test]
    fn test_exact_amount_has_no_change() {
        let wallet = Wallet::new();
        let utxos = funded(&wallet);

        let tx = wallet
            .create_transaction(&Wallet::new().address(), 50, &utxos, &[])
            .unwrap();
        assert_eq!(tx.tx_outs.len(), 1);
    }

    #[test]
    fn test_pool_spent_outputs_are_skipped() {
        let wallet = Wallet::new();
        let utxos = funded(&wallet);
        let recipient = Wallet::new().address();

        let pending = wallet.create_transaction(&recipient, 50, &utxos, &[]).unwrap();
        let next = wallet
            .create_transaction(&recipient, 50, &utxos, &[pending.clone()])
            .unwrap();
        assert_ne!(pending.tx_ins[0].out_point(), next.tx_ins[0].out_point());

        assert!(matches!(
            wallet.create_transaction(&recipient, 60, &utxos, &[pending]),
            Err(WalletError::InsufficientFunds { have: 50, need: 60 })
        ));
    }
}
