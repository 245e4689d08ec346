//! REST API module
//!
//! HTTP control surface over a running node.
//!
//! # Endpoints
//!
//! ## Chain
//! - `GET /blocks` - Whole chain
//! - `GET /block/{hash}` - Block by hash
//! - `GET /transaction/{id}` - Confirmed transaction by id
//! - `GET /address/{address}` - Unspent outputs of an address
//! - `GET /unspentTransactionOutputs` - Whole UTXO set
//! - `GET /myUnspentTransactionOutputs` - UTXOs of the node wallet
//!
//! ## Mining
//! - `POST /mineRawBlock` - Mine `{"data": [...]}` as block data
//! - `POST /mineBlock` - Mine a reward block with the pool
//! - `POST /mineTransaction` - Mine a block with a transfer `{"address", "amount"}`
//!
//! ## Wallet
//! - `GET /balance` - Node wallet balance
//! - `GET /address` - Node wallet address
//! - `POST /sendTransaction` - Pool a transfer `{"address", "amount"}`
//! - `GET /transactionPool` - Pending transactions
//!
//! ## Peers
//! - `GET /peers` - Connected peers
//! - `POST /addPeer` - Dial `{"peer": "host:port"}`

pub mod handlers;
pub mod routes;

pub use handlers::{ApiError, ApiState};
pub use routes::create_router;
