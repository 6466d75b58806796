//! Observability helpers.
//!
//! The library itself only emits `tracing` events; this module offers an
//! opt-in subscriber setup for binaries and tests that want to see them.

pub mod logging;
