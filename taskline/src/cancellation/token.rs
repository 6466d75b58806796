//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

/// A token for cooperative cancellation.
///
/// The token offers the three capabilities stage bodies and the executor
/// need: a non-blocking check ([`is_cancelled`](Self::is_cancelled)), an
/// async wait ([`cancelled`](Self::cancelled)), and child derivation
/// ([`child`](Self::child)).
///
/// Cancellation is idempotent - only the first cancellation reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Callbacks to invoke on cancellation.
    callbacks: RwLock<Vec<CancelCallback>>,
    /// Derived children still alive. Weak, so a dropped child leaves
    /// nothing behind; dead entries are pruned on each derivation.
    children: RwLock<Vec<Weak<Self>>>,
    /// Wakes tasks blocked in `cancelled()`.
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Requests cancellation with a reason.
    ///
    /// This is idempotent - only the first reason is kept.
    /// Callbacks are invoked immediately. Panics in callbacks are logged
    /// and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        // Only set if not already cancelled (first reason wins)
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            *self.reason.write() = Some(reason.clone());

            self.notify.notify_waiters();

            let callbacks: Vec<CancelCallback> = {
                let mut lock = self.callbacks.write();
                std::mem::take(&mut *lock)
            };

            for callback in callbacks {
                if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    callback();
                })) {
                    warn!("cancellation callback panicked: {:?}", e);
                }
            }

            let children: Vec<Weak<Self>> = {
                let mut lock = self.children.write();
                std::mem::take(&mut *lock)
            };

            for child in children {
                if let Some(child) = child.upgrade() {
                    child.cancel(reason.clone());
                }
            }
        }
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_cancelled() {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback();
            })) {
                warn!("cancellation callback panicked: {:?}", e);
            }
        } else {
            self.callbacks.write().push(Box::new(callback));
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Waits until cancellation is requested.
    ///
    /// Returns immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before re-checking so a concurrent cancel
            // between the check and the await cannot be missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Derives a child token that is cancelled whenever this token is.
    ///
    /// The child carries the parent's reason. Cancelling the child does
    /// not affect the parent. The parent holds only a weak reference, so
    /// dropping the child releases it; dead entries are pruned on each
    /// derivation, keeping a long-lived parent's registry bounded by the
    /// number of live children.
    #[must_use]
    pub fn child(&self) -> Arc<Self> {
        let child = Self::new();

        {
            let mut children = self.children.write();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }

        // A cancel may have drained the registry before the push landed.
        if self.is_cancelled() {
            child.cancel(
                self.reason()
                    .unwrap_or_else(|| "parent cancelled".to_string()),
            );
        }

        child
    }

    #[cfg(test)]
    pub(crate) fn tracked_children(&self) -> usize {
        self.children.read().len()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
