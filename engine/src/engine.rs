//! Cart engine - the façade the presentation layer talks to.
//!
//! Every operation validates its input, applies the mutation through the
//! [`MutationStore`] and then fires a sync attempt without waiting for it.
//! Remote failures never surface here; they only show up in [`SyncStatus`].

use crate::{
    error::Result, observable::Observable, AddPolicy, Cart, CartItem, CartSnapshot,
    ConfigError, ConnectivityObserver, EngineConfig, HttpSyncClient, JsonFilePersistence,
    MemoryPersistence, Mutation, MutationStore, NetworkStatusProvider, Persistence,
    PollingNetwork, Quantity, RemoteSyncClient, RetryingClient, Subscription, SyncCoordinator,
    SyncOutcome, SyncStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Upper bound for a single connectivity probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Presentation-ready projection of the cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data", rename_all = "camelCase")]
pub enum CollectionView {
    #[default]
    Loading,
    Empty,
    /// Items ordered by product id
    Populated(Vec<CartItem>),
    LoadFailed(String),
}

impl CollectionView {
    pub fn from_cart(cart: &Cart) -> Self {
        if cart.is_empty() {
            CollectionView::Empty
        } else {
            CollectionView::Populated(cart.items().cloned().collect())
        }
    }

    /// Items shown, empty unless populated.
    pub fn items(&self) -> &[CartItem] {
        match self {
            CollectionView::Populated(items) => items,
            _ => &[],
        }
    }
}

/// Offline-first cart with background reconciliation.
///
/// Must be created inside a tokio runtime: construction spawns the view
/// projection and the connectivity watcher. Both stop when the engine is
/// dropped or [`CartEngine::shutdown`] is called.
pub struct CartEngine {
    store: Arc<MutationStore>,
    coordinator: Arc<SyncCoordinator>,
    view: Arc<Observable<CollectionView>>,
    reload: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for CartEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartEngine")
            .field("view", &self.view.get())
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl CartEngine {
    /// Wire an engine from its collaborators.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        network: Arc<dyn NetworkStatusProvider>,
        remote: Arc<dyn RemoteSyncClient>,
        policy: AddPolicy,
    ) -> Self {
        let store = Arc::new(MutationStore::new(persistence, policy));
        let coordinator =
            SyncCoordinator::new(store.clone(), ConnectivityObserver::new(network), remote);
        let view = Arc::new(Observable::new(CollectionView::Loading));
        let reload = Arc::new(Notify::new());

        let tasks = vec![
            tokio::spawn(project_view(store.clone(), view.clone(), reload.clone())),
            coordinator.watch_connectivity(),
        ];

        tracing::debug!(?policy, "Cart engine started");

        Self {
            store,
            coordinator,
            view,
            reload,
            tasks,
        }
    }

    /// Wire an engine talking to the server named in the configuration.
    ///
    /// Syncs through [`HttpSyncClient`] as `client_id` and watches
    /// connectivity with a [`PollingNetwork`] probing every `poll_interval`.
    pub fn from_config(config: &EngineConfig) -> std::result::Result<Self, ConfigError> {
        let probe_addr = config.probe_addr()?;
        let remote = HttpSyncClient::new(config.remote_url()?, config.client_id.clone())
            .map_err(|e| ConfigError::InvalidValue {
                var: "CARTSYNC_REMOTE_URL",
                value: e.to_string(),
            })?;
        let network = Arc::new(PollingNetwork::spawn(
            probe_addr,
            config.poll_interval,
            config.poll_interval.min(PROBE_TIMEOUT),
        ));

        tracing::debug!(
            client_id = %config.client_id,
            %probe_addr,
            poll_interval = ?config.poll_interval,
            "Engine configured for remote"
        );

        Ok(Self::with_config(config, network, remote))
    }

    /// Wire an engine from configuration with caller-supplied collaborators.
    ///
    /// Uses a snapshot file when `snapshot_path` is set and in-memory storage
    /// otherwise; wraps `remote` with the configured retry policy.
    pub fn with_config<C>(
        config: &EngineConfig,
        network: Arc<dyn NetworkStatusProvider>,
        remote: C,
    ) -> Self
    where
        C: RemoteSyncClient + 'static,
    {
        let persistence: Arc<dyn Persistence> = match &config.snapshot_path {
            Some(path) => Arc::new(JsonFilePersistence::new(path)),
            None => Arc::new(MemoryPersistence::new()),
        };
        let remote = Arc::new(RetryingClient::new(remote, config.retry.clone()));
        Self::new(persistence, network, remote, config.add_policy)
    }

    /// Add `quantity` of a product.
    pub async fn add_to_cart(&self, product_id: &str, quantity: Quantity) -> Result<()> {
        let mutation = Mutation::add(product_id, quantity);
        mutation.validate()?;
        self.submit(mutation).await
    }

    /// Set a product's quantity. Zero or less removes it.
    pub async fn update_quantity(&self, product_id: &str, new_quantity: Quantity) -> Result<()> {
        let mutation = Mutation::set_quantity(product_id, new_quantity).normalize();
        mutation.validate()?;
        self.submit(mutation).await
    }

    /// Remove a product. Removing an absent product is not an error.
    pub async fn remove_from_cart(&self, product_id: &str) -> Result<()> {
        let mutation = Mutation::remove(product_id);
        mutation.validate()?;
        self.submit(mutation).await
    }

    /// Empty the cart.
    pub async fn clear_cart(&self) -> Result<()> {
        self.submit(Mutation::Clear).await
    }

    /// Start a sync attempt in the background. Redundant calls are harmless.
    pub fn attempt_sync(&self) -> JoinHandle<SyncOutcome> {
        self.coordinator.trigger()
    }

    /// Run a sync attempt and wait for its outcome.
    pub async fn sync_now(&self) -> SyncOutcome {
        self.coordinator.attempt_sync().await
    }

    /// Subscribe to the cart projection.
    pub fn collection_view(&self) -> Subscription<CollectionView> {
        self.view.subscribe()
    }

    /// Subscribe to the sync status.
    pub fn sync_status(&self) -> Subscription<SyncStatus> {
        self.coordinator.subscribe()
    }

    /// Mutations saved locally but not yet confirmed.
    pub async fn pending_count(&self) -> Result<usize> {
        self.store.pending_count().await
    }

    /// Copy of the local cart and pending log.
    pub async fn snapshot(&self) -> Result<CartSnapshot> {
        self.store.snapshot().await
    }

    /// The coordinator, for status details such as the last sync time.
    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// Retry loading the cart after a storage failure.
    pub fn reload(&self) {
        self.reload.notify_one();
    }

    /// Stop the background tasks. Subscriptions end or stay at their last value.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    async fn submit(&self, mutation: Mutation) -> Result<()> {
        let kind = mutation.kind();
        if let Err(e) = self.store.apply(mutation).await {
            tracing::warn!(kind, error = %e, "Local mutation failed");
            return Err(e);
        }

        if matches!(self.view.get(), CollectionView::LoadFailed(_)) {
            self.reload();
        }

        // Fire and forget; the outcome is visible through the sync status
        self.coordinator.trigger();
        Ok(())
    }
}

impl Drop for CartEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Keep the view in step with the store, retrying the load on request.
async fn project_view(
    store: Arc<MutationStore>,
    view: Arc<Observable<CollectionView>>,
    reload: Arc<Notify>,
) {
    loop {
        match store.load().await {
            Ok(mut carts) => {
                while let Some(cart) = carts.next().await {
                    view.set(CollectionView::from_cart(&cart));
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cart load failed");
                view.set(CollectionView::LoadFailed(e.to_string()));
                reload.notified().await;
                view.set(CollectionView::Loading);
            }
        }
    }
}
