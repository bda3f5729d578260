//! Persistence backends for the mutation store.
//!
//! The store only talks to storage through [`Persistence`]; durability and
//! on-disk layout are the backend's business.

use crate::{error::Result, Cart, CartSnapshot, Error, MutationId, PendingMutation};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Storage primitives backing the mutation store.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Read the persisted cart. A missing cart reads as empty.
    async fn read(&self) -> Result<Cart>;

    /// Read the persisted pending log, oldest first.
    async fn read_log(&self) -> Result<Vec<PendingMutation>>;

    /// Replace the persisted cart.
    async fn write(&self, cart: &Cart) -> Result<()>;

    /// Append one entry to the pending log.
    async fn append_log(&self, entry: &PendingMutation) -> Result<()>;

    /// Remove entries from the pending log. Unknown ids are ignored.
    async fn remove_from_log(&self, ids: &[MutationId]) -> Result<()>;

    /// Append `entry` and replace the cart as one unit.
    ///
    /// The default is built from the primitives above and is only atomic as
    /// long as the rollback succeeds; backends that can write both in one
    /// step should override it.
    async fn commit(&self, cart: &Cart, entry: &PendingMutation) -> Result<()> {
        self.append_log(entry).await?;
        if let Err(e) = self.write(cart).await {
            if let Err(rollback) = self.remove_from_log(&[entry.id.clone()]).await {
                tracing::error!(
                    mutation_id = %entry.id,
                    error = %rollback,
                    "Failed to roll back log entry after cart write failure"
                );
            }
            return Err(e);
        }
        Ok(())
    }
}

/// In-memory backend with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    state: Mutex<CartSnapshot>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_log: AtomicBool,
    fail_remove: AtomicBool,
}

impl MemoryPersistence {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-populated with a snapshot.
    pub fn with_snapshot(snapshot: CartSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Make `read` and `read_log` fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `write` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `append_log` and `remove_from_log` fail.
    pub fn set_fail_log(&self, fail: bool) {
        self.fail_log.store(fail, Ordering::SeqCst);
    }

    /// Make only `remove_from_log` fail.
    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Copy of what is currently "on disk".
    pub fn snapshot(&self) -> Result<CartSnapshot> {
        self.state
            .lock()
            .map(|s| s.clone())
            .map_err(|_| Error::Storage("memory backend poisoned".into()))
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("injected {what} failure")));
        }
        Ok(())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CartSnapshot) -> T) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Storage("memory backend poisoned".into()))?;
        Ok(f(&mut state))
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn read(&self) -> Result<Cart> {
        Self::check(&self.fail_reads, "read")?;
        self.with_state(|s| s.cart.clone())
    }

    async fn read_log(&self) -> Result<Vec<PendingMutation>> {
        Self::check(&self.fail_reads, "read")?;
        self.with_state(|s| s.pending.clone())
    }

    async fn write(&self, cart: &Cart) -> Result<()> {
        Self::check(&self.fail_writes, "write")?;
        self.with_state(|s| s.cart = cart.clone())
    }

    async fn append_log(&self, entry: &PendingMutation) -> Result<()> {
        Self::check(&self.fail_log, "log")?;
        self.with_state(|s| s.pending.push(entry.clone()))
    }

    async fn remove_from_log(&self, ids: &[MutationId]) -> Result<()> {
        Self::check(&self.fail_log, "log")?;
        Self::check(&self.fail_remove, "remove")?;
        self.with_state(|s| s.pending.retain(|p| !ids.contains(&p.id)))
    }

    async fn commit(&self, cart: &Cart, entry: &PendingMutation) -> Result<()> {
        Self::check(&self.fail_log, "log")?;
        Self::check(&self.fail_writes, "write")?;
        self.with_state(|s| {
            s.pending.push(entry.clone());
            s.cart = cart.clone();
        })
    }
}

/// Backend that keeps cart and log in a single JSON snapshot file.
///
/// Every primitive rewrites the whole file through a temporary file and a
/// rename, so a crash leaves either the old or the new snapshot.
#[derive(Debug)]
pub struct JsonFilePersistence {
    path: PathBuf,
    cache: tokio::sync::Mutex<Option<CartSnapshot>>,
}

impl JsonFilePersistence {
    /// Use the snapshot file at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: tokio::sync::Mutex::new(None),
        }
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_file(&self) -> Result<CartSnapshot> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => CartSnapshot::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CartSnapshot::default()),
            Err(e) => Err(Error::storage(e)),
        }
    }

    async fn store_file(&self, snapshot: &CartSnapshot) -> Result<()> {
        let json = snapshot.to_json_pretty()?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(Error::storage)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(Error::storage)
    }

    /// Run `f` against a copy of the snapshot and persist the result.
    /// The cache only changes once the file write succeeded.
    async fn update(&self, f: impl FnOnce(&mut CartSnapshot) + Send) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let mut next = match cache.as_ref() {
            Some(snapshot) => snapshot.clone(),
            None => self.load_file().await?,
        };
        f(&mut next);
        self.store_file(&next).await?;
        *cache = Some(next);
        Ok(())
    }

    async fn current(&self) -> Result<CartSnapshot> {
        let mut cache = self.cache.lock().await;
        if let Some(snapshot) = cache.as_ref() {
            return Ok(snapshot.clone());
        }
        let snapshot = self.load_file().await?;
        *cache = Some(snapshot.clone());
        Ok(snapshot)
    }
}

#[async_trait]
impl Persistence for JsonFilePersistence {
    async fn read(&self) -> Result<Cart> {
        Ok(self.current().await?.cart)
    }

    async fn read_log(&self) -> Result<Vec<PendingMutation>> {
        Ok(self.current().await?.pending)
    }

    async fn write(&self, cart: &Cart) -> Result<()> {
        let cart = cart.clone();
        self.update(move |s| s.cart = cart).await
    }

    async fn append_log(&self, entry: &PendingMutation) -> Result<()> {
        let entry = entry.clone();
        self.update(move |s| s.pending.push(entry)).await
    }

    async fn remove_from_log(&self, ids: &[MutationId]) -> Result<()> {
        let ids = ids.to_vec();
        self.update(move |s| s.pending.retain(|p| !ids.contains(&p.id)))
            .await
    }

    async fn commit(&self, cart: &Cart, entry: &PendingMutation) -> Result<()> {
        let cart = cart.clone();
        let entry = entry.clone();
        self.update(move |s| {
            s.pending.push(entry);
            s.cart = cart;
        })
        .await
    }
}
