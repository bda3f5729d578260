//! Remote authority client.
//!
//! The coordinator only sees [`RemoteSyncClient`]: one call per batch, pass
//! or fail. Transport retry lives in [`RetryingClient`]; [`HttpSyncClient`] is
//! a ready-made JSON-over-HTTP transport.

mod http;
mod retry;

pub use http::{ErrorBody, HttpSyncClient, SyncBatchRequest, SyncBatchResponse};
pub use retry::{RetryPolicy, RetryingClient};

use crate::{error::Result, PendingMutation};
use async_trait::async_trait;
use std::sync::Arc;

/// Sends pending mutations to the remote authority.
///
/// Implementations must treat a batch atomically: either every mutation is
/// applied remotely and `Ok` is returned, or none is and an error is.
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
    async fn sync_batch(&self, batch: &[PendingMutation]) -> Result<()>;
}

#[async_trait]
impl<T: RemoteSyncClient + ?Sized> RemoteSyncClient for Arc<T> {
    async fn sync_batch(&self, batch: &[PendingMutation]) -> Result<()> {
        (**self).sync_batch(batch).await
    }
}
