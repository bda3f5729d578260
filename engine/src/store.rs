//! Store - owns the cart and its pending mutation log.
//!
//! Every write goes through [`MutationStore::apply`] or
//! [`MutationStore::commit_pending`], both of which hold a single writer lock
//! for the whole read-modify-persist cycle.

use crate::{
    error::Result, observable::Observable, AddPolicy, Cart, CartSnapshot, CommitMarker, Error,
    Mutation, MutationId, PendingMutation, Persistence, Sequence, Subscription, Timestamp,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Pending mutations read in one consistent pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    /// Oldest first
    pub mutations: Vec<PendingMutation>,
    /// Pass to [`MutationStore::commit_pending`] once the batch is confirmed
    pub marker: CommitMarker,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }
}

#[derive(Debug)]
struct StoreState {
    cart: Cart,
    pending: Vec<PendingMutation>,
    next_seq: Sequence,
}

/// The local source of truth for the cart.
pub struct MutationStore {
    backend: Arc<dyn Persistence>,
    policy: AddPolicy,
    /// `None` until hydrated from the backend
    state: Mutex<Option<StoreState>>,
    cart: Observable<Cart>,
}

impl std::fmt::Debug for MutationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl MutationStore {
    /// Create a store over a persistence backend. Nothing is read until the
    /// first call that needs state.
    pub fn new(backend: Arc<dyn Persistence>, policy: AddPolicy) -> Self {
        Self {
            backend,
            policy,
            state: Mutex::new(None),
            cart: Observable::new(Cart::new()),
        }
    }

    /// The merge policy for repeated adds.
    pub fn policy(&self) -> AddPolicy {
        self.policy
    }

    /// Subscribe to cart snapshots.
    ///
    /// Each call is an independent subscription starting at the current cart.
    /// Fails if the backend cannot be read.
    pub async fn load(&self) -> Result<Subscription<Cart>> {
        let mut guard = self.state.lock().await;
        self.hydrate(&mut guard).await?;
        let subscription = self.cart.subscribe();
        tracing::debug!(
            subscribers = self.cart.subscriber_count(),
            "Cart subscription opened"
        );
        Ok(subscription)
    }

    /// Apply a mutation locally and log it.
    ///
    /// Returns the logged entry, or `None` when the mutation left the cart
    /// unchanged and nothing was logged. On error neither the cart nor the
    /// log has changed.
    pub async fn apply(&self, mutation: Mutation) -> Result<Option<PendingMutation>> {
        let mutation = mutation.normalize();
        mutation.validate()?;

        let mut guard = self.state.lock().await;
        let state = self.hydrate(&mut guard).await?;

        let noop = match mutation {
            Mutation::Clear => state.cart.is_empty() && state.pending.is_empty(),
            _ => state.cart.is_noop(&mutation, self.policy),
        };
        if noop {
            tracing::debug!(
                kind = mutation.kind(),
                product_id = ?mutation.product_id(),
                "Mutation is a no-op, not logged"
            );
            return Ok(None);
        }

        let mut next_cart = state.cart.clone();
        next_cart.apply(&mutation, self.policy);
        let entry = PendingMutation::new(state.next_seq, mutation, now_millis());

        self.backend.commit(&next_cart, &entry).await?;

        state.next_seq += 1;

        // A clear supersedes everything before it in the same unsynced window
        if entry.mutation == Mutation::Clear && !state.pending.is_empty() {
            let superseded: Vec<MutationId> =
                state.pending.iter().map(|p| p.id.clone()).collect();
            match self.backend.remove_from_log(&superseded).await {
                Ok(()) => state.pending.clear(),
                Err(e) => tracing::warn!(
                    superseded = superseded.len(),
                    error = %e,
                    "Log compaction failed, keeping superseded entries"
                ),
            }
        }

        tracing::debug!(
            seq = entry.seq,
            kind = entry.mutation.kind(),
            pending = state.pending.len() + 1,
            "Mutation applied"
        );

        state.pending.push(entry.clone());
        state.cart = next_cart.clone();
        self.cart.set(next_cart);

        Ok(Some(entry))
    }

    /// Read all pending mutations without removing them.
    pub async fn drain_pending(&self) -> Result<PendingBatch> {
        let mut guard = self.state.lock().await;
        let state = self.hydrate(&mut guard).await?;

        let marker = state
            .pending
            .last()
            .map(|p| CommitMarker(p.seq))
            .unwrap_or(CommitMarker::NONE);

        Ok(PendingBatch {
            mutations: state.pending.clone(),
            marker,
        })
    }

    /// Remove every pending mutation covered by `marker`.
    ///
    /// Entries appended after the marker was taken stay pending. Returns the
    /// number of entries removed.
    pub async fn commit_pending(&self, marker: CommitMarker) -> Result<usize> {
        let mut guard = self.state.lock().await;
        let state = self.hydrate(&mut guard).await?;

        let confirmed: Vec<MutationId> = state
            .pending
            .iter()
            .take_while(|p| marker.covers(p))
            .map(|p| p.id.clone())
            .collect();
        if confirmed.is_empty() {
            return Ok(0);
        }

        self.backend.remove_from_log(&confirmed).await?;
        state.pending.drain(..confirmed.len());

        tracing::debug!(
            committed = confirmed.len(),
            remaining = state.pending.len(),
            "Pending mutations committed"
        );

        Ok(confirmed.len())
    }

    /// Number of mutations awaiting confirmation.
    pub async fn pending_count(&self) -> Result<usize> {
        let mut guard = self.state.lock().await;
        Ok(self.hydrate(&mut guard).await?.pending.len())
    }

    /// Copy of the current cart and pending log.
    pub async fn snapshot(&self) -> Result<CartSnapshot> {
        let mut guard = self.state.lock().await;
        let state = self.hydrate(&mut guard).await?;
        Ok(CartSnapshot::new(state.cart.clone(), state.pending.clone()))
    }

    async fn hydrate<'a>(&self, slot: &'a mut Option<StoreState>) -> Result<&'a mut StoreState> {
        if slot.is_none() {
            let cart = self.backend.read().await?;
            let pending = self.backend.read_log().await?;
            let next_seq = pending.last().map(|p| p.seq + 1).unwrap_or(1);

            tracing::debug!(
                items = cart.len(),
                pending = pending.len(),
                "Store hydrated from persistence"
            );

            self.cart.set(cart.clone());
            *slot = Some(StoreState {
                cart,
                pending,
                next_seq,
            });
        }
        slot.as_mut()
            .ok_or_else(|| Error::Storage("store state unavailable".into()))
    }
}

fn now_millis() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
