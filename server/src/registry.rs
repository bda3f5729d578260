//! Authoritative carts, one per client.
//!
//! Batches are applied to a copy of the client's cart and swapped in only
//! when every mutation in the batch is valid. Mutation ids already applied
//! are skipped, so a client resending a batch after a lost response does not
//! apply anything twice. Only the most recent `dedup_window` ids per client
//! are remembered; older ids are forgotten oldest first.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use cartsync_engine::{AddPolicy, Cart, MutationId, PendingMutation};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{AppError, Result};

/// Server-side state for one client.
#[derive(Debug, Clone, Default)]
pub struct ClientCart {
    pub cart: Cart,
    /// Ids of recently applied mutations
    applied: HashSet<MutationId>,
    /// Same ids in the order they were applied, oldest first
    order: VecDeque<MutationId>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ClientCart {
    fn remember(&mut self, id: MutationId, window: usize) {
        if self.applied.insert(id.clone()) {
            self.order.push_back(id);
        }
        while self.order.len() > window {
            if let Some(oldest) = self.order.pop_front() {
                self.applied.remove(&oldest);
            }
        }
    }
}

/// Result of applying one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub accepted: usize,
    pub duplicates: usize,
    pub cart: Cart,
}

/// Thread-safe registry of client carts, shared across handlers via `Arc`.
#[derive(Debug)]
pub struct CartRegistry {
    carts: DashMap<String, ClientCart>,
    policy: AddPolicy,
    dedup_window: usize,
}

/// Applied ids remembered per client unless configured otherwise.
pub const DEFAULT_DEDUP_WINDOW: usize = 4096;

impl Default for CartRegistry {
    fn default() -> Self {
        Self::new(AddPolicy::default())
    }
}

impl CartRegistry {
    pub fn new(policy: AddPolicy) -> Self {
        Self {
            carts: DashMap::new(),
            policy,
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }

    /// Remember at most `window` applied ids per client (at least one).
    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window.max(1);
        self
    }

    /// Create a new registry wrapped in Arc for sharing.
    pub fn new_shared(policy: AddPolicy, dedup_window: usize) -> Arc<Self> {
        Arc::new(Self::new(policy).with_dedup_window(dedup_window))
    }

    /// Apply a batch for `client_id`, all or nothing.
    ///
    /// The entry stays locked for the whole batch, so concurrent batches for
    /// the same client are applied one after the other.
    pub fn apply_batch(&self, client_id: &str, batch: &[PendingMutation]) -> Result<BatchOutcome> {
        for pending in batch {
            pending
                .mutation
                .validate()
                .map_err(|source| AppError::InvalidMutation {
                    id: pending.id.clone(),
                    source,
                })?;
        }

        if batch.is_empty() {
            let cart = self.get(client_id).map(|state| state.cart).unwrap_or_default();
            return Ok(BatchOutcome {
                accepted: 0,
                duplicates: 0,
                cart,
            });
        }

        let mut entry = self.carts.entry(client_id.to_string()).or_default();

        let mut cart = entry.cart.clone();
        let mut fresh = Vec::new();
        let mut seen = HashSet::new();
        let mut duplicates = 0;

        for pending in batch {
            if entry.applied.contains(&pending.id) || !seen.insert(&pending.id) {
                duplicates += 1;
                continue;
            }
            cart.apply(&pending.mutation, self.policy);
            fresh.push(pending.id.clone());
        }

        let accepted = fresh.len();
        if accepted > 0 {
            entry.cart = cart;
            for id in fresh {
                entry.remember(id, self.dedup_window);
            }
            entry.updated_at = Some(Utc::now());
        }

        tracing::debug!(
            client_id = %client_id,
            accepted,
            duplicates,
            items = entry.cart.len(),
            "Batch applied"
        );

        Ok(BatchOutcome {
            accepted,
            duplicates,
            cart: entry.cart.clone(),
        })
    }

    /// Current state for a client, if it ever synced.
    pub fn get(&self, client_id: &str) -> Option<ClientCart> {
        self.carts.get(client_id).map(|entry| entry.clone())
    }

    /// Number of clients with a cart.
    pub fn client_count(&self) -> usize {
        self.carts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartsync_engine::{CartItem, Mutation};

    fn pending(seq: u64, mutation: Mutation) -> PendingMutation {
        PendingMutation::new(seq, mutation, 1_000 + seq)
    }

    #[test]
    fn applies_in_order() {
        let registry = CartRegistry::new(AddPolicy::Additive);
        let batch = vec![
            pending(1, Mutation::add("sku1", 2)),
            pending(2, Mutation::add("sku1", 1)),
            pending(3, Mutation::add("sku2", 1)),
            pending(4, Mutation::remove("sku2")),
        ];

        let outcome = registry.apply_batch("client-1", &batch).unwrap();
        assert_eq!(outcome.accepted, 4);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(outcome.cart.get("sku1"), Some(&CartItem::new("sku1", 3)));
        assert!(!outcome.cart.contains("sku2"));
        assert!(registry.get("client-1").unwrap().updated_at.is_some());
    }

    #[test]
    fn resent_batch_is_not_applied_twice() {
        let registry = CartRegistry::new(AddPolicy::Additive);
        let batch = vec![pending(1, Mutation::add("sku1", 2))];

        registry.apply_batch("client-1", &batch).unwrap();
        let outcome = registry.apply_batch("client-1", &batch).unwrap();

        assert_eq!(outcome.accepted, 0);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.cart.quantity_of("sku1"), 2);
    }

    #[test]
    fn invalid_mutation_rejects_whole_batch() {
        let registry = CartRegistry::new(AddPolicy::Additive);
        registry
            .apply_batch("client-1", &[pending(1, Mutation::add("sku1", 1))])
            .unwrap();

        let batch = vec![
            pending(2, Mutation::add("sku2", 1)),
            pending(3, Mutation::add("sku3", 0)),
        ];
        let err = registry.apply_batch("client-1", &batch).unwrap_err();
        assert!(matches!(err, AppError::InvalidMutation { ref id, .. } if *id == batch[1].id));

        let state = registry.get("client-1").unwrap();
        assert_eq!(state.cart.len(), 1);
        assert!(!state.cart.contains("sku2"));

        // The valid half was not recorded as applied either
        let outcome = registry.apply_batch("client-1", &batch[..1]).unwrap();
        assert_eq!(outcome.accepted, 1);
    }

    #[test]
    fn clients_are_isolated() {
        let registry = CartRegistry::new(AddPolicy::Additive);
        registry
            .apply_batch("a", &[pending(1, Mutation::add("sku1", 1))])
            .unwrap();
        registry
            .apply_batch("b", &[pending(1, Mutation::Clear)])
            .unwrap();

        assert_eq!(registry.client_count(), 2);
        assert_eq!(registry.get("a").unwrap().cart.quantity_of("sku1"), 1);
        assert!(registry.get("b").unwrap().cart.is_empty());
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn empty_batch_does_not_register_client() {
        let registry = CartRegistry::new(AddPolicy::Additive);
        let outcome = registry.apply_batch("client-1", &[]).unwrap();

        assert_eq!(outcome.accepted, 0);
        assert!(outcome.cart.is_empty());
        assert_eq!(registry.client_count(), 0);
        assert!(registry.get("client-1").is_none());
    }

    #[test]
    fn dedup_window_forgets_oldest_ids() {
        let registry = CartRegistry::new(AddPolicy::Additive).with_dedup_window(2);
        let first = pending(1, Mutation::add("sku1", 1));
        let second = pending(2, Mutation::add("sku1", 1));
        let third = pending(3, Mutation::add("sku1", 1));
        registry
            .apply_batch("client-1", &[first.clone(), second.clone(), third.clone()])
            .unwrap();

        // Recent ids are still recognised
        let outcome = registry
            .apply_batch("client-1", &[second, third])
            .unwrap();
        assert_eq!(outcome.accepted, 0);
        assert_eq!(outcome.duplicates, 2);

        // The oldest fell out of the window
        let outcome = registry.apply_batch("client-1", &[first]).unwrap();
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.cart.quantity_of("sku1"), 4);
    }

    #[test]
    fn replace_policy_overwrites() {
        let registry = CartRegistry::new(AddPolicy::Replace);
        let batch = vec![
            pending(1, Mutation::add("sku1", 2)),
            pending(2, Mutation::add("sku1", 5)),
        ];
        let outcome = registry.apply_batch("client-1", &batch).unwrap();
        assert_eq!(outcome.cart.quantity_of("sku1"), 5);
    }
}
