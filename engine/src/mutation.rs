//! Mutation types for expressing cart changes.
//!
//! Changes are expressed as mutations, not direct writes. Every local
//! mutation is logged until the remote authority confirms it.

use crate::{error::Result, Error, ProductId, Quantity, Timestamp};
use serde::{Deserialize, Serialize};

/// Unique identifier for a logged mutation.
pub type MutationId = String;

/// Position of a mutation in the pending log.
pub type Sequence = u64;

/// A change to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mutation {
    #[serde(rename_all = "camelCase")]
    Add {
        product_id: ProductId,
        quantity: Quantity,
    },
    #[serde(rename_all = "camelCase")]
    SetQuantity {
        product_id: ProductId,
        quantity: Quantity,
    },
    #[serde(rename_all = "camelCase")]
    Remove { product_id: ProductId },
    Clear,
}

impl Mutation {
    pub fn add(product_id: impl Into<ProductId>, quantity: Quantity) -> Self {
        Mutation::Add {
            product_id: product_id.into(),
            quantity,
        }
    }

    pub fn set_quantity(product_id: impl Into<ProductId>, quantity: Quantity) -> Self {
        Mutation::SetQuantity {
            product_id: product_id.into(),
            quantity,
        }
    }

    pub fn remove(product_id: impl Into<ProductId>) -> Self {
        Mutation::Remove {
            product_id: product_id.into(),
        }
    }

    /// Get the product this mutation targets, if any.
    pub fn product_id(&self) -> Option<&str> {
        match self {
            Mutation::Add { product_id, .. }
            | Mutation::SetQuantity { product_id, .. }
            | Mutation::Remove { product_id } => Some(product_id),
            Mutation::Clear => None,
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Add { .. } => "add",
            Mutation::SetQuantity { .. } => "set_quantity",
            Mutation::Remove { .. } => "remove",
            Mutation::Clear => "clear",
        }
    }

    /// Rewrite `SetQuantity` with a non-positive quantity into `Remove`.
    pub fn normalize(self) -> Self {
        match self {
            Mutation::SetQuantity {
                product_id,
                quantity,
            } if quantity <= 0 => Mutation::Remove { product_id },
            other => other,
        }
    }

    /// Reject mutations that could never be valid.
    pub fn validate(&self) -> Result<()> {
        if let Some(product_id) = self.product_id() {
            if product_id.trim().is_empty() {
                return Err(Error::EmptyProductId);
            }
        }
        match self {
            Mutation::Add { quantity, .. } | Mutation::SetQuantity { quantity, .. }
                if *quantity <= 0 =>
            {
                Err(Error::NonPositiveQuantity(*quantity))
            }
            _ => Ok(()),
        }
    }
}

/// A mutation waiting for remote confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Globally unique id, used by the remote to deduplicate retries
    pub id: MutationId,
    /// Monotonic position in the local log
    pub seq: Sequence,
    /// The mutation itself (already normalized)
    pub mutation: Mutation,
    /// When it was applied locally (ms since epoch)
    pub applied_at: Timestamp,
}

impl PendingMutation {
    /// Wrap a mutation with a fresh id.
    pub fn new(seq: Sequence, mutation: Mutation, applied_at: Timestamp) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            seq,
            mutation,
            applied_at,
        }
    }
}

/// Marks the newest entry of a drained batch.
///
/// Committing a marker removes exactly the entries with `seq <= marker`,
/// so anything appended after the drain stays pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitMarker(pub Sequence);

impl CommitMarker {
    /// Marker that confirms nothing.
    pub const NONE: CommitMarker = CommitMarker(0);

    /// Whether an entry is covered by this marker.
    pub fn covers(&self, pending: &PendingMutation) -> bool {
        pending.seq <= self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_non_positive_set() {
        assert_eq!(
            Mutation::set_quantity("sku1", 0).normalize(),
            Mutation::remove("sku1")
        );
        assert_eq!(
            Mutation::set_quantity("sku1", -4).normalize(),
            Mutation::remove("sku1")
        );
        assert_eq!(
            Mutation::set_quantity("sku1", 2).normalize(),
            Mutation::set_quantity("sku1", 2)
        );
    }

    #[test]
    fn validate_rejects_bad_input() {
        assert_eq!(
            Mutation::add("", 1).validate(),
            Err(Error::EmptyProductId)
        );
        assert_eq!(
            Mutation::add("sku1", 0).validate(),
            Err(Error::NonPositiveQuantity(0))
        );
        assert_eq!(Mutation::remove("  ").validate(), Err(Error::EmptyProductId));
        assert!(Mutation::Clear.validate().is_ok());
        assert!(Mutation::add("sku1", 1).validate().is_ok());
    }

    #[test]
    fn mutation_json_shape() {
        let json = serde_json::to_value(Mutation::add("sku1", 2)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "add", "productId": "sku1", "quantity": 2})
        );

        let json = serde_json::to_value(Mutation::Clear).unwrap();
        assert_eq!(json, serde_json::json!({"type": "clear"}));
    }

    #[test]
    fn pending_ids_are_unique() {
        let a = PendingMutation::new(1, Mutation::Clear, 0);
        let b = PendingMutation::new(2, Mutation::Clear, 0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn marker_covers_up_to_seq() {
        let marker = CommitMarker(2);
        assert!(marker.covers(&PendingMutation::new(1, Mutation::Clear, 0)));
        assert!(marker.covers(&PendingMutation::new(2, Mutation::Clear, 0)));
        assert!(!marker.covers(&PendingMutation::new(3, Mutation::Clear, 0)));
        assert!(!CommitMarker::NONE.covers(&PendingMutation::new(1, Mutation::Clear, 0)));
    }
}
