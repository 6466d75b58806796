//! Development-time tracing setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes a tracing subscriber for development logging.
///
/// Reads `RUST_LOG`, defaulting to `warn` when unset. Output goes to
/// stderr in compact format. Calling this twice is an error in
/// `tracing-subscriber`, so binaries should call it exactly once at
/// startup; the library never calls it.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
