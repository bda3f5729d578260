//! Cart handler - serves the authoritative cart of a client.

use cartsync_engine::Cart;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::registry::CartRegistry;

/// Response for a cart lookup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub client_id: String,
    pub cart: Cart,
    /// When the last batch changed the cart
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Look up the cart of `client_id`.
pub fn handle_get_cart(registry: &CartRegistry, client_id: &str) -> Result<CartResponse> {
    let state = registry
        .get(client_id)
        .ok_or_else(|| AppError::NotFound(format!("no cart for client {client_id}")))?;

    Ok(CartResponse {
        client_id: client_id.to_string(),
        cart: state.cart,
        updated_at: state.updated_at,
    })
}
