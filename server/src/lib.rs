//! Cartsync Server - reference remote authority for cart mutation sync.
//!
//! Holds one authoritative cart per client in memory and applies the batches
//! pushed by [`cartsync_engine::HttpSyncClient`]. Batches are applied all or
//! nothing and deduplicated by mutation id.

pub mod config;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod routes;

use crate::config::Config;
use crate::registry::CartRegistry;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Number of full batches worth of mutation ids remembered per client.
const DEDUP_WINDOW_BATCHES: usize = 8;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<CartRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = CartRegistry::new_shared(
            config.add_policy,
            config.max_batch_size * DEDUP_WINDOW_BATCHES,
        );
        Self {
            config: Arc::new(config),
            registry,
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
