//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(handlers::ApiError {
            error: "Not Found".to_string(),
        }),
    )
}

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Chain
        .route("/blocks", get(handlers::get_blocks))
        .route("/block/{hash}", get(handlers::get_block))
        .route("/transaction/{id}", get(handlers::get_transaction))
        .route("/address/{address}", get(handlers::get_address_unspent))
        .route(
            "/unspentTransactionOutputs",
            get(handlers::get_unspent_tx_outs),
        )
        .route(
            "/myUnspentTransactionOutputs",
            get(handlers::get_my_unspent_tx_outs),
        )
        // Mining
        .route("/mineRawBlock", post(handlers::mine_raw_block))
        .route("/mineBlock", post(handlers::mine_block))
        .route("/mineTransaction", post(handlers::mine_transaction))
        // Wallet and pool
        .route("/balance", get(handlers::get_balance))
        .route("/address", get(handlers::get_address))
        .route("/sendTransaction", post(handlers::send_transaction))
        .route("/transactionPool", get(handlers::get_transaction_pool))
        // Peers
        .route("/peers", get(handlers::get_peers))
        .route("/addPeer", post(handlers::add_peer))
        .fallback(fallback_handler)
        .layer(cors)
        .with_state(state)
}
