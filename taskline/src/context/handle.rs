//! The per-stage handle passed to stage bodies.

use super::rollback::RollbackAction;
use crate::cancellation::CancellationToken;
use parking_lot::Mutex;
use std::sync::Arc;

/// Bridge between a stage's body and the executor.
///
/// A fresh handle is created immediately before each stage is entered and is
/// not reused. It covers the two cross-cutting concerns a body has:
/// observing the merged cancellation signal, and registering rollback
/// actions for the work the body has already done.
///
/// Rollback registration is order-preserving and append-only; there is no
/// unregistration. Register each undo right after the corresponding
/// acquisition so the rollback set always reflects the true state of the
/// world:
///
/// ```rust,ignore
/// let server = api.create_server(&spec).await?;
/// let id = server.id.clone();
/// handle.defer_rollback("delete server", move |_ctx| async move {
///     api.delete_server(&id).await
/// });
/// ```
pub struct StageHandle {
    /// Name of the stage this handle belongs to.
    stage: String,
    /// The merged cancellation signal, shared with the executor.
    token: Arc<CancellationToken>,
    /// Rollback actions registered by the body, in registration order.
    rollbacks: Mutex<Vec<RollbackAction>>,
}

impl StageHandle {
    /// Creates a handle for one stage execution.
    pub(crate) fn new(stage: impl Into<String>, token: Arc<CancellationToken>) -> Arc<Self> {
        Arc::new(Self {
            stage: stage.into(),
            token,
            rollbacks: Mutex::new(Vec::new()),
        })
    }

    /// Returns the name of the stage this handle was created for.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns whether the merged cancellation signal has tripped.
    ///
    /// Bodies are never interrupted preemptively; poll this (or await
    /// [`cancelled`](Self::cancelled)) at internally blocking steps and
    /// return early when it trips.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until the merged cancellation signal trips.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns the shared cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Registers a rollback action for work this stage has performed.
    ///
    /// The action runs if and only if the pipeline as a whole does not
    /// succeed - whether the failure happens in a later stage or in this
    /// stage after registration. Actions across all stages are drained in
    /// a single flat LIFO.
    pub fn defer_rollback<F, Fut>(&self, name: impl Into<String>, action: F)
    where
        F: FnOnce(super::RollbackContext) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.rollbacks
            .lock()
            .push(RollbackAction::new(name, action));
    }

    /// Returns the number of rollback actions currently registered.
    #[must_use]
    pub fn pending_rollbacks(&self) -> usize {
        self.rollbacks.lock().len()
    }

    /// Transfers the registered actions to the executor, in registration
    /// order. Called once at the stage boundary.
    pub(crate) fn drain_rollbacks(&self) -> Vec<RollbackAction> {
        std::mem::take(&mut *self.rollbacks.lock())
    }
}

impl std::fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandle")
            .field("stage", &self.stage)
            .field("pending_rollbacks", &self.pending_rollbacks())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
