//! Batch handler - applies pending mutations pushed by a client.

use cartsync_engine::{SyncBatchRequest, SyncBatchResponse};

use crate::error::{AppError, Result};
use crate::registry::CartRegistry;

/// Process a sync batch from a client.
pub fn handle_batch(
    registry: &CartRegistry,
    max_batch_size: usize,
    request: SyncBatchRequest,
) -> Result<SyncBatchResponse> {
    let client_id = request.client_id.trim();
    if client_id.is_empty() {
        return Err(AppError::BadRequest("clientId must not be empty".to_string()));
    }

    let size = request.mutations.len();
    if size > max_batch_size {
        return Err(AppError::BatchTooLarge {
            size,
            max: max_batch_size,
        });
    }

    let outcome = registry.apply_batch(client_id, &request.mutations)?;

    tracing::info!(
        client_id = %client_id,
        accepted = outcome.accepted,
        duplicates = outcome.duplicates,
        "Sync batch confirmed"
    );

    Ok(SyncBatchResponse {
        accepted: outcome.accepted,
        duplicates: outcome.duplicates,
        cart: outcome.cart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartsync_engine::{AddPolicy, Mutation, PendingMutation};

    fn request(client_id: &str, mutations: Vec<PendingMutation>) -> SyncBatchRequest {
        SyncBatchRequest {
            client_id: client_id.to_string(),
            mutations,
        }
    }

    #[test]
    fn rejects_blank_client() {
        let registry = CartRegistry::new(AddPolicy::Additive);
        let err = handle_batch(&registry, 10, request("  ", vec![])).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn rejects_oversized_batch() {
        let registry = CartRegistry::new(AddPolicy::Additive);
        let mutations = (1..=3)
            .map(|seq| PendingMutation::new(seq, Mutation::add("sku1", 1), 0))
            .collect();

        let err = handle_batch(&registry, 2, request("c1", mutations)).unwrap_err();
        assert!(matches!(err, AppError::BatchTooLarge { size: 3, max: 2 }));
        assert_eq!(registry.client_count(), 0);
    }

    #[test]
    fn returns_authoritative_cart() {
        let registry = CartRegistry::new(AddPolicy::Additive);
        let mutations = vec![PendingMutation::new(1, Mutation::add("sku1", 2), 0)];

        let response = handle_batch(&registry, 10, request("c1", mutations)).unwrap();
        assert_eq!(response.accepted, 1);
        assert_eq!(response.cart.quantity_of("sku1"), 2);
    }
}
