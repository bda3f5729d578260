//! Sync endpoint routes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use cartsync_engine::{SyncBatchRequest, SyncBatchResponse};

use crate::error::Result;
use crate::handlers::{handle_batch, handle_get_cart, CartResponse};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(batch_handler))
        .route("/sync/{client_id}", get(cart_handler))
}

/// POST /sync - Apply a batch of pending mutations.
async fn batch_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SyncBatchRequest>, JsonRejection>,
) -> Result<Json<SyncBatchResponse>> {
    let Json(request) = payload?;
    let response = handle_batch(&state.registry, state.config.max_batch_size, request)?;
    Ok(Json(response))
}

/// GET /sync/{client_id} - Authoritative cart of a client.
async fn cart_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<CartResponse>> {
    let response = handle_get_cart(&state.registry, &client_id)?;
    Ok(Json(response))
}
