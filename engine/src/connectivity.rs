//! Connectivity observation.
//!
//! A [`NetworkStatusProvider`] reports raw probe results; the
//! [`ConnectivityObserver`] turns them into a deduplicated online/offline
//! signal where any detection error counts as offline.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Outcome of one connectivity check. `Err` carries the detection failure.
pub type Probe = std::result::Result<bool, String>;

const TRANSITION_BUFFER: usize = 64;

/// Source of raw connectivity information.
pub trait NetworkStatusProvider: Send + Sync {
    /// Point-in-time check.
    fn probe(&self) -> Probe;

    /// Stream of probe results as they are detected. May repeat values.
    fn transitions(&self) -> broadcast::Receiver<Probe>;
}

/// Provider driven by hand, for tests and embedders with their own signal.
#[derive(Debug)]
pub struct ManualNetwork {
    current: Mutex<Probe>,
    tx: broadcast::Sender<Probe>,
}

impl ManualNetwork {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            current: Mutex::new(Ok(online)),
            tx,
        }
    }

    /// Report a status. Repeated values are forwarded as-is.
    pub fn set_online(&self, online: bool) {
        self.publish(Ok(online));
    }

    /// Report a detection failure.
    pub fn fail(&self, reason: impl Into<String>) {
        self.publish(Err(reason.into()));
    }

    fn publish(&self, probe: Probe) {
        if let Ok(mut current) = self.current.lock() {
            *current = probe.clone();
        }
        // No subscribers is fine
        let _ = self.tx.send(probe);
    }
}

impl NetworkStatusProvider for ManualNetwork {
    fn probe(&self) -> Probe {
        self.current
            .lock()
            .map_err(|_| "network state poisoned".to_string())?
            .clone()
    }

    fn transitions(&self) -> broadcast::Receiver<Probe> {
        self.tx.subscribe()
    }
}

/// Provider that periodically opens a TCP connection to a known endpoint.
///
/// The polling task is stopped when the provider is dropped.
#[derive(Debug)]
pub struct PollingNetwork {
    online: Arc<AtomicBool>,
    tx: broadcast::Sender<Probe>,
    task: JoinHandle<()>,
}

impl PollingNetwork {
    /// Start polling `addr` every `interval`. Must be called inside a tokio
    /// runtime.
    pub fn spawn(addr: SocketAddr, interval: Duration, timeout: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(TRANSITION_BUFFER);
        let online = Arc::new(AtomicBool::new(false));

        let task = {
            let online = online.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    let probe = reach(addr, timeout).await;
                    online.store(matches!(probe, Ok(true)), Ordering::SeqCst);
                    let _ = tx.send(probe);
                }
            })
        };

        Self { online, tx, task }
    }
}

async fn reach(addr: SocketAddr, timeout: Duration) -> Probe {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(true),
        Ok(Err(e)) => {
            tracing::debug!(%addr, error = %e, "Endpoint unreachable");
            Ok(false)
        }
        Err(_) => {
            tracing::debug!(%addr, ?timeout, "Probe timed out");
            Ok(false)
        }
    }
}

impl NetworkStatusProvider for PollingNetwork {
    fn probe(&self) -> Probe {
        Ok(self.online.load(Ordering::SeqCst))
    }

    fn transitions(&self) -> broadcast::Receiver<Probe> {
        self.tx.subscribe()
    }
}

impl Drop for PollingNetwork {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Deduplicated, error-tolerant view over a provider.
#[derive(Clone)]
pub struct ConnectivityObserver {
    provider: Arc<dyn NetworkStatusProvider>,
}

impl std::fmt::Debug for ConnectivityObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityObserver").finish_non_exhaustive()
    }
}

impl ConnectivityObserver {
    pub fn new(provider: Arc<dyn NetworkStatusProvider>) -> Self {
        Self { provider }
    }

    /// Best-effort current status.
    pub fn is_online(&self) -> bool {
        resolve(self.provider.probe())
    }

    /// Subscribe to status transitions from now on.
    ///
    /// Only changes relative to the status at subscription time are emitted,
    /// and never the same value twice in a row.
    pub fn observe(&self) -> ConnectivityEvents {
        // Subscribe before probing so no transition falls in between
        let rx = self.provider.transitions();
        ConnectivityEvents {
            rx,
            last: self.is_online(),
            provider: self.provider.clone(),
        }
    }
}

fn resolve(probe: Probe) -> bool {
    match probe {
        Ok(online) => online,
        Err(reason) => {
            tracing::warn!(%reason, "Connectivity check failed, assuming offline");
            false
        }
    }
}

/// Subscription to connectivity transitions. Dropping it unsubscribes.
pub struct ConnectivityEvents {
    rx: broadcast::Receiver<Probe>,
    last: bool,
    provider: Arc<dyn NetworkStatusProvider>,
}

impl ConnectivityEvents {
    /// Wait for the next transition. `None` if the provider closed its
    /// transition channel.
    pub async fn next(&mut self) -> Option<bool> {
        loop {
            let online = match self.rx.recv().await {
                Ok(probe) => resolve(probe),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Connectivity events lagged, re-probing");
                    resolve(self.provider.probe())
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };
            if online != self.last {
                self.last = online;
                return Some(online);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer(online: bool) -> (Arc<ManualNetwork>, ConnectivityObserver) {
        let network = Arc::new(ManualNetwork::new(online));
        let observer = ConnectivityObserver::new(network.clone());
        (network, observer)
    }

    #[test]
    fn point_in_time_status() {
        let (network, observer) = observer(true);
        assert!(observer.is_online());
        network.set_online(false);
        assert!(!observer.is_online());
    }

    #[test]
    fn detection_error_means_offline() {
        let (network, observer) = observer(true);
        network.fail("no interfaces");
        assert!(!observer.is_online());
    }

    #[tokio::test]
    async fn events_are_deduplicated() {
        let (network, observer) = observer(false);
        let mut events = observer.observe();

        network.set_online(false);
        network.set_online(true);
        network.set_online(true);
        network.fail("flaky");
        network.set_online(false);
        network.set_online(true);

        assert_eq!(events.next().await, Some(true));
        assert_eq!(events.next().await, Some(false));
        assert_eq!(events.next().await, Some(true));
    }

    #[tokio::test]
    async fn subscribers_are_independent() {
        let (network, observer) = observer(false);
        let mut a = observer.observe();
        let b = observer.observe();
        drop(b);

        network.set_online(true);
        assert_eq!(a.next().await, Some(true));
    }

    #[tokio::test]
    async fn polling_reports_reachable_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let network = PollingNetwork::spawn(
            addr,
            Duration::from_millis(10),
            Duration::from_millis(200),
        );
        let mut rx = network.transitions();
        assert_eq!(rx.recv().await.unwrap(), Ok(true));
        assert_eq!(network.probe(), Ok(true));
    }

    #[tokio::test]
    async fn polling_reports_closed_endpoint_offline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let network = PollingNetwork::spawn(
            addr,
            Duration::from_millis(10),
            Duration::from_millis(200),
        );
        let observer = ConnectivityObserver::new(Arc::new(network));
        assert!(!observer.is_online());
    }
}
