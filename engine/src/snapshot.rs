//! Snapshot types for persisting and restoring store state.
//!
//! Snapshots are the bridge between the in-memory store and a file on disk.
//! They are designed for deterministic serialization.

use crate::{error::Result, Cart, Error, PendingMutation};
use serde::{Deserialize, Serialize};

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of the cart and its pending log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Current cart contents
    pub cart: Cart,
    /// Mutations not yet confirmed, oldest first
    pub pending: Vec<PendingMutation>,
}

impl Default for CartSnapshot {
    fn default() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            cart: Cart::new(),
            pending: Vec::new(),
        }
    }
}

impl CartSnapshot {
    /// Create a snapshot from its parts.
    pub fn new(cart: Cart, pending: Vec<PendingMutation>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            cart,
            pending,
        }
    }

    /// Check the invariants a freshly read snapshot must hold.
    pub fn validate(&self) -> Result<()> {
        if let Some(item) = self.cart.items().find(|i| i.quantity <= 0) {
            return Err(Error::InvalidSnapshot(format!(
                "non-positive quantity {} for '{}'",
                item.quantity, item.product_id
            )));
        }

        // Log must be in append order
        for pair in self.pending.windows(2) {
            if pair[0].seq >= pair[1].seq {
                return Err(Error::InvalidSnapshot(format!(
                    "pending log out of order at seq {}",
                    pair[1].seq
                )));
            }
        }

        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        snapshot.validate()?;
        Ok(snapshot)
    }
}
