//! Process-interrupt subscription merged into a cancellation token.

use super::CancellationToken;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Reason recorded on the token when the process interrupt fires.
pub(crate) const INTERRUPT_REASON: &str = "interrupt signal received";

/// A scoped subscription to the process interrupt signal (SIGINT / Ctrl-C).
///
/// The subscription lives for one pipeline execution: it is taken on entry
/// to execute and dropped on exit, so the crate never keeps a permanent
/// process-wide handler of its own. The first interrupt observed while the
/// subscription is alive cancels the given token.
#[derive(Debug)]
pub struct InterruptSubscription {
    listener: JoinHandle<()>,
}

impl InterruptSubscription {
    /// Subscribes to the process interrupt, forwarding it into `token`.
    ///
    /// On unix the signal listener is installed synchronously before this
    /// returns, so an interrupt raised immediately afterwards is observed
    /// rather than hitting the default handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal listener cannot be registered with
    /// the OS.
    #[cfg(unix)]
    pub fn subscribe(token: Arc<CancellationToken>) -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let listener = tokio::spawn(async move {
            if interrupt.recv().await.is_some() {
                token.cancel(INTERRUPT_REASON);
            }
        });

        Ok(Self { listener })
    }

    /// Subscribes to the process interrupt, forwarding it into `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal listener cannot be registered with
    /// the OS.
    #[cfg(not(unix))]
    pub fn subscribe(token: Arc<CancellationToken>) -> std::io::Result<Self> {
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel(INTERRUPT_REASON);
            }
        });

        Ok(Self { listener })
    }
}

impl Drop for InterruptSubscription {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
