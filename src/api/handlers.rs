//! REST API handlers for ledger operations

use crate::core::{Block, Transaction, UnspentTxOut};
use crate::network::P2pHandle;
use crate::node::{Node, NodeError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub node: Arc<Node>,
    pub p2p: P2pHandle,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiError {
    pub error: String,
}

fn bad_request(error: impl ToString) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: error.to_string(),
        }),
    )
}

fn not_found(what: &str, key: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError {
            error: format!("{} {} not found", what, key),
        }),
    )
}

impl From<NodeError> for (StatusCode, Json<ApiError>) {
    fn from(e: NodeError) -> Self {
        bad_request(e)
    }
}

#[derive(Deserialize)]
pub struct MineRawRequest {
    pub data: Option<Vec<Transaction>>,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub address: Option<String>,
    pub amount: Option<u64>,
}

impl TransferRequest {
    fn into_parts(self) -> Result<(String, u64), (StatusCode, Json<ApiError>)> {
        match (self.address, self.amount) {
            (Some(address), Some(amount)) => Ok((address, amount)),
            _ => Err(bad_request("invalid address or amount")),
        }
    }
}

#[derive(Deserialize)]
pub struct AddPeerRequest {
    pub peer: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AddressUnspentResponse {
    pub unspent_tx_outs: Vec<UnspentTxOut>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BalanceResponse {
    pub balance: u128,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AddressResponse {
    pub address: String,
}

// ============================================================================
// Chain
// ============================================================================

/// GET /blocks - The whole chain
pub async fn get_blocks(State(state): State<ApiState>) -> Json<Vec<Block>> {
    Json(state.node.blocks().await)
}

/// GET /block/{hash}
pub async fn get_block(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
) -> ApiResult<Block> {
    state
        .node
        .block_by_hash(&hash)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Block", &hash))
}

/// GET /transaction/{id} - Search confirmed transactions
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Transaction> {
    state
        .node
        .transaction_by_id(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Transaction", &id))
}

/// GET /address/{address} - Unspent outputs locked to an address
pub async fn get_address_unspent(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<AddressUnspentResponse> {
    Json(AddressUnspentResponse {
        unspent_tx_outs: state.node.unspent_tx_outs_for(&address).await,
    })
}

/// GET /unspentTransactionOutputs
pub async fn get_unspent_tx_outs(State(state): State<ApiState>) -> Json<Vec<UnspentTxOut>> {
    Json(state.node.unspent_tx_outs().await)
}

/// GET /myUnspentTransactionOutputs
pub async fn get_my_unspent_tx_outs(State(state): State<ApiState>) -> Json<Vec<UnspentTxOut>> {
    Json(state.node.my_unspent_tx_outs().await)
}

// ============================================================================
// Mining
// ============================================================================

/// POST /mineRawBlock - Mine caller-supplied block data
pub async fn mine_raw_block(
    State(state): State<ApiState>,
    Json(req): Json<MineRawRequest>,
) -> ApiResult<Block> {
    let data = req.data.ok_or_else(|| bad_request("data parameter is missing"))?;
    let block = state.node.generate_raw_next_block(data).await?;
    Ok(Json(block))
}

/// POST /mineBlock - Mine a reward block carrying the pool
pub async fn mine_block(State(state): State<ApiState>) -> ApiResult<Block> {
    let block = state.node.generate_next_block().await?;
    Ok(Json(block))
}

/// POST /mineTransaction - Mine a block with a fresh transfer in it
pub async fn mine_transaction(
    State(state): State<ApiState>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<Block> {
    let (address, amount) = req.into_parts()?;
    let block = state
        .node
        .generate_next_block_with_transaction(&address, amount)
        .await?;
    Ok(Json(block))
}

// ============================================================================
// Wallet
// ============================================================================

/// GET /balance - Local wallet balance
pub async fn get_balance(State(state): State<ApiState>) -> Json<BalanceResponse> {
    Json(BalanceResponse {
        balance: state.node.account_balance().await,
    })
}

/// GET /address - Local wallet address
pub async fn get_address(State(state): State<ApiState>) -> Json<AddressResponse> {
    Json(AddressResponse {
        address: state.node.address(),
    })
}

/// POST /sendTransaction - Pool a transfer from the local wallet
pub async fn send_transaction(
    State(state): State<ApiState>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<Transaction> {
    let (address, amount) = req.into_parts()?;
    let tx = state.node.send_transaction(&address, amount).await?;
    Ok(Json(tx))
}

/// GET /transactionPool
pub async fn get_transaction_pool(State(state): State<ApiState>) -> Json<Vec<Transaction>> {
    Json(state.node.pool().await)
}

// ============================================================================
// Peers
// ============================================================================

/// GET /peers
pub async fn get_peers(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.p2p.peers().await)
}

/// POST /addPeer - Dial a peer
pub async fn add_peer(
    State(state): State<ApiState>,
    Json(req): Json<AddPeerRequest>,
) -> ApiResult<Vec<String>> {
    state
        .p2p
        .connect_to(&req.peer)
        .await
        .map_err(bad_request)?;
    Ok(Json(state.p2p.peers().await))
}
