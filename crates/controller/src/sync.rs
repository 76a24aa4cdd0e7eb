//! The user-supplied reconcile function.

use std::future::Future;

use async_trait::async_trait;
use relevel_core::Resource;
use tokio_util::sync::CancellationToken;

use crate::context::SyncContext;

/// Outcome of one sync invocation. Any error schedules a rate-limited retry.
pub type SyncResult = anyhow::Result<()>;

/// Reconciles the state named by a [`SyncContext`].
///
/// Implemented for async closures `Fn(CancellationToken, SyncContext<R>)`,
/// and for structs that embed their own state.
#[async_trait]
pub trait SyncFn<R: Resource>: Send + Sync {
    /// Drive the observed state toward the desired state.
    ///
    /// `cancel` fires when the controller shuts down.
    async fn sync(&self, cancel: CancellationToken, ctx: SyncContext<R>) -> SyncResult;
}

#[async_trait]
impl<R, F, Fut> SyncFn<R> for F
where
    R: Resource,
    F: Fn(CancellationToken, SyncContext<R>) -> Fut + Send + Sync,
    Fut: Future<Output = SyncResult> + Send + 'static,
{
    async fn sync(&self, cancel: CancellationToken, ctx: SyncContext<R>) -> SyncResult {
        (self)(cancel, ctx).await
    }
}
