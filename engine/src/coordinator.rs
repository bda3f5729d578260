//! Sync coordinator - decides when to reconcile and reports how it went.
//!
//! State machine over [`SyncStatus`]:
//!
//! - any state except `Syncing` + trigger while offline -> `Offline`
//! - any state except `Syncing` + trigger while online -> `Syncing`
//! - `Syncing` -> `Success` once the remote confirmed the batch
//! - `Syncing` -> `Error` on rejection, transport or storage failure
//! - connectivity lost -> `Offline` from any state
//! - connectivity regained while `Offline` -> new trigger
//!
//! At most one reconciliation runs at a time. Triggers arriving while one is
//! in flight are dropped, not queued; instead the running attempt drains the
//! log again after each confirmed batch and only reports `Success` once
//! nothing is left to send. A trigger dropped in the gap between the last
//! drain and the end of the flight makes the attempt check the log once more
//! and run again if something arrived.

use crate::{
    observable::Observable, ConnectivityObserver, Error, MutationStore, RemoteSyncClient,
    Subscription,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;

/// Externally visible sync state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Offline,
    Error(String),
}

/// What a single call to [`SyncCoordinator::attempt_sync`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote confirmed every batch sent and they were committed locally
    Synced { committed: usize },
    /// The pending log was empty; the remote was not contacted
    NothingToSync,
    /// No connectivity; nothing was attempted
    Offline,
    /// Another attempt was already running
    AlreadyInFlight,
    /// The attempt ran and failed; pending mutations are kept
    Failed(Error),
}

/// Merge the outcome of a follow-up flight into the previous one.
fn combine(previous: SyncOutcome, next: SyncOutcome) -> SyncOutcome {
    match (previous, next) {
        (SyncOutcome::Synced { committed: a }, SyncOutcome::Synced { committed: b }) => {
            SyncOutcome::Synced { committed: a + b }
        }
        (previous @ SyncOutcome::Synced { .. }, SyncOutcome::NothingToSync) => previous,
        (_, next) => next,
    }
}

/// Clears the single-flight flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns [`SyncStatus`] and runs the reconciliation protocol.
pub struct SyncCoordinator {
    store: Arc<MutationStore>,
    connectivity: ConnectivityObserver,
    remote: Arc<dyn RemoteSyncClient>,
    status: Observable<SyncStatus>,
    in_flight: AtomicBool,
    /// Set when a trigger was dropped because an attempt was in flight
    missed_trigger: AtomicBool,
    last_synced_at: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("status", &self.status.get())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<MutationStore>,
        connectivity: ConnectivityObserver,
        remote: Arc<dyn RemoteSyncClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            connectivity,
            remote,
            status: Observable::new(SyncStatus::Idle),
            in_flight: AtomicBool::new(false),
            missed_trigger: AtomicBool::new(false),
            last_synced_at: Mutex::new(None),
        })
    }

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        self.status.get()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> Subscription<SyncStatus> {
        self.status.subscribe()
    }

    /// When the last attempt ended in `Success`.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at.lock().ok().and_then(|t| *t)
    }

    /// Run one reconciliation attempt to completion.
    ///
    /// Returns immediately with [`SyncOutcome::AlreadyInFlight`] if another
    /// attempt holds the flight.
    pub async fn attempt_sync(&self) -> SyncOutcome {
        let mut outcome = SyncOutcome::AlreadyInFlight;

        loop {
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                self.missed_trigger.store(true, Ordering::Release);
                tracing::debug!("Sync already in flight, trigger ignored");
                return outcome;
            }

            let flight = FlightGuard(&self.in_flight);
            let pass = self.run_flight().await;
            drop(flight);

            outcome = combine(outcome, pass);
            if !self.needs_another_pass(&outcome).await {
                return outcome;
            }
        }
    }

    /// One flight: connectivity check, reconcile, final status.
    async fn run_flight(&self) -> SyncOutcome {
        if !self.connectivity.is_online() {
            tracing::debug!("Offline, sync not attempted");
            self.status.set(SyncStatus::Offline);
            return SyncOutcome::Offline;
        }

        self.status.set(SyncStatus::Syncing);
        let outcome = self.reconcile().await;

        match &outcome {
            SyncOutcome::Synced { .. } | SyncOutcome::NothingToSync => {
                if let Ok(mut last) = self.last_synced_at.lock() {
                    *last = Some(Utc::now());
                }
                self.status.set(SyncStatus::Success);
            }
            SyncOutcome::Failed(e) => self.status.set(SyncStatus::Error(e.to_string())),
            SyncOutcome::Offline | SyncOutcome::AlreadyInFlight => {}
        }

        // The result stands, but the status must reflect a connection lost
        // while the batch was out
        if !self.connectivity.is_online() {
            self.status.set(SyncStatus::Offline);
        }

        outcome
    }

    /// Whether a trigger was dropped during a successful flight and left
    /// mutations behind.
    async fn needs_another_pass(&self, outcome: &SyncOutcome) -> bool {
        if !matches!(
            outcome,
            SyncOutcome::Synced { .. } | SyncOutcome::NothingToSync
        ) {
            return false;
        }
        if !self.missed_trigger.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.store.pending_count().await {
            Ok(0) | Err(_) => false,
            Ok(pending) => {
                tracing::debug!(pending, "Mutations arrived as the flight ended, syncing again");
                true
            }
        }
    }

    /// Run [`Self::attempt_sync`] on a new task without waiting for it.
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<SyncOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.attempt_sync().await })
    }

    /// Start the task that reacts to connectivity transitions.
    ///
    /// The task holds only a weak reference and ends once the coordinator
    /// is dropped or the provider closes its channel.
    pub fn watch_connectivity(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.connectivity.observe();
        let weak: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            while let Some(online) = events.next().await {
                let Some(this) = weak.upgrade() else { break };

                if online {
                    tracing::info!("Connectivity restored");
                    if this.status() == SyncStatus::Offline {
                        this.trigger();
                    }
                } else {
                    tracing::info!("Connectivity lost");
                    this.status.set(SyncStatus::Offline);
                }
            }
            tracing::debug!("Connectivity watcher stopped");
        })
    }

    /// Send pending batches until the log is empty.
    ///
    /// Mutations applied while a batch is out are picked up by the next pass
    /// of the same attempt. Stops early if connectivity is lost between
    /// passes; what is left stays pending.
    async fn reconcile(&self) -> SyncOutcome {
        let mut committed = 0;

        loop {
            let batch = match self.store.drain_pending().await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(error = %e, "Could not read pending mutations");
                    return SyncOutcome::Failed(e);
                }
            };

            if batch.is_empty() {
                if committed == 0 {
                    tracing::debug!("Nothing pending, sync trivially succeeded");
                    return SyncOutcome::NothingToSync;
                }
                return SyncOutcome::Synced { committed };
            }

            if committed > 0 && !self.connectivity.is_online() {
                tracing::debug!(
                    remaining = batch.len(),
                    "Connectivity lost between batches"
                );
                return SyncOutcome::Synced { committed };
            }

            tracing::info!(
                mutations = batch.len(),
                marker = batch.marker.0,
                "Sending sync batch"
            );

            if let Err(e) = self.remote.sync_batch(&batch.mutations).await {
                tracing::warn!(
                    error = %e,
                    pending = batch.len(),
                    "Sync batch failed, keeping pending mutations"
                );
                return SyncOutcome::Failed(e);
            }

            match self.store.commit_pending(batch.marker).await {
                Ok(n) => {
                    tracing::info!(committed = n, "Sync batch confirmed");
                    committed += n;
                }
                Err(e) => {
                    // The remote deduplicates by mutation id, so resending is safe
                    tracing::error!(error = %e, "Batch confirmed remotely but local commit failed");
                    return SyncOutcome::Failed(e);
                }
            }
        }
    }
}
