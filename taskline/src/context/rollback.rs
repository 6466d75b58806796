//! Rollback actions and the context they run under.

use crate::cancellation::CancellationToken;
use futures::future::BoxFuture;
use std::sync::Arc;

/// The boxed body of a rollback action.
pub type RollbackFn = Box<dyn FnOnce(RollbackContext) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// A named, run-once undo callable registered by a stage.
///
/// Ownership starts with the [`StageHandle`](super::StageHandle) that
/// registered it and transfers to the executor at the stage boundary.
pub struct RollbackAction {
    name: String,
    run: RollbackFn,
}

impl RollbackAction {
    /// Creates a new rollback action.
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(RollbackContext) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move |ctx| Box::pin(action(ctx))),
        }
    }

    /// Returns the diagnostic name of the action.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consumes the action and runs it under the given context.
    pub(crate) async fn invoke(self, ctx: RollbackContext) -> anyhow::Result<()> {
        (self.run)(ctx).await
    }
}

impl std::fmt::Debug for RollbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackAction")
            .field("name", &self.name)
            .finish()
    }
}

/// The context a rollback action runs under.
///
/// The wrapped token is freshly created per rollback pass and nothing ever
/// cancels it: pressing the interrupt again while cleanups are draining must
/// not skip the ones still pending. The token is exposed anyway so rollback
/// bodies can be written against the same surface as forward bodies.
#[derive(Debug, Clone)]
pub struct RollbackContext {
    token: Arc<CancellationToken>,
}

impl RollbackContext {
    /// Creates a detached context, insulated from the forward signal.
    #[must_use]
    pub(crate) fn detached() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns whether the context is cancelled. Always false in practice.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the context's cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }
}
