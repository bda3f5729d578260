//! # Cartsync Engine
//!
//! An offline-first mutation sync engine for a shopping cart.
//!
//! The client mutates its cart freely while disconnected. Every mutation is
//! applied locally and logged; once connectivity returns the log is sent to a
//! remote authority as one batch and cleared only after it is confirmed.
//! Nothing is lost and nothing is applied twice.
//!
//! ## Design Principles
//!
//! - **Local first**: mutations succeed locally regardless of connectivity
//! - **Atomic**: a failed local write leaves cart and log untouched
//! - **Single flight**: at most one reconciliation is in flight at a time
//! - **Collaborators behind traits**: storage, network status and the remote
//!   are injected, never looked up
//!
//! ## Core Concepts
//!
//! ### Mutations
//!
//! Changes are expressed as [`Mutation`]s:
//! - `Add` - add a quantity of a product (additive by default, see [`AddPolicy`])
//! - `SetQuantity` - set a quantity; zero or less is normalized to `Remove`
//! - `Remove` - drop a product
//! - `Clear` - empty the cart, superseding every earlier pending mutation
//!
//! ### Components
//!
//! - [`MutationStore`] owns the [`Cart`] and the pending log
//! - [`ConnectivityObserver`] turns a [`NetworkStatusProvider`] into a clean
//!   online/offline signal
//! - [`SyncCoordinator`] owns [`SyncStatus`] and runs reconciliation
//! - [`CartEngine`] is the façade exposing operations plus the
//!   [`CollectionView`] and [`SyncStatus`] subscriptions
//!
//! ## Quick Start
//!
//! ```rust
//! use cartsync_engine::{
//!     AddPolicy, CartEngine, ManualNetwork, MemoryPersistence, PendingMutation,
//!     RemoteSyncClient, SyncOutcome,
//! };
//! use std::sync::Arc;
//!
//! struct AcceptAll;
//!
//! #[async_trait::async_trait]
//! impl RemoteSyncClient for AcceptAll {
//!     async fn sync_batch(&self, _batch: &[PendingMutation]) -> cartsync_engine::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cartsync_engine::Result<()> {
//! let network = Arc::new(ManualNetwork::new(false));
//! let engine = CartEngine::new(
//!     Arc::new(MemoryPersistence::new()),
//!     network.clone(),
//!     Arc::new(AcceptAll),
//!     AddPolicy::Additive,
//! );
//!
//! // Offline: saved locally, not yet confirmed
//! engine.add_to_cart("sku1", 2).await?;
//! assert_eq!(engine.pending_count().await?, 1);
//!
//! // Back online: the pending log is sent and cleared. The connectivity
//! // watcher may get there first, in which case this attempt finds either
//! // the flight taken or nothing left to send.
//! network.set_online(true);
//! let outcome = engine.sync_now().await;
//! assert!(matches!(
//!     outcome,
//!     SyncOutcome::Synced { .. } | SyncOutcome::AlreadyInFlight | SyncOutcome::NothingToSync
//! ));
//! # Ok(())
//! # }
//! ```

pub mod cart;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod mutation;
pub mod observable;
pub mod persistence;
pub mod remote;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use cart::{AddPolicy, Cart, CartItem};
pub use config::{ConfigError, EngineConfig};
pub use connectivity::{
    ConnectivityEvents, ConnectivityObserver, ManualNetwork, NetworkStatusProvider,
    PollingNetwork, Probe,
};
pub use coordinator::{SyncCoordinator, SyncOutcome, SyncStatus};
pub use engine::{CartEngine, CollectionView};
pub use error::{Error, ErrorKind, Result};
pub use mutation::{CommitMarker, Mutation, MutationId, PendingMutation, Sequence};
pub use observable::Subscription;
pub use persistence::{JsonFilePersistence, MemoryPersistence, Persistence};
pub use remote::{
    ErrorBody, HttpSyncClient, RemoteSyncClient, RetryPolicy, RetryingClient, SyncBatchRequest,
    SyncBatchResponse,
};
pub use snapshot::{CartSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use store::{MutationStore, PendingBatch};

/// Type aliases for clarity
pub type ProductId = String;
pub type Quantity = i64;
pub type Timestamp = u64;
