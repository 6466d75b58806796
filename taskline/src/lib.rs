//! # Taskline
//!
//! A typed, sequential task pipeline runner with ordered rollback on
//! failure or cancellation.
//!
//! Taskline lets a caller compose a chain of stages, each consuming the
//! previous stage's output and producing the next stage's input, and
//! guarantees that if any stage fails - by returning an error or through
//! external cancellation - every rollback action registered by entered
//! stages is undone in reverse registration order before control returns:
//!
//! - **Typed chaining**: adjacent stages with disagreeing carried-value
//!   types are rejected at compile time
//! - **Cooperative cancellation**: the caller's token and the process
//!   interrupt merge into one signal shared by every stage handle
//! - **Deterministic cleanup**: one flat LIFO of rollback actions across
//!   all stages, drained to completion even under repeated interrupts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use taskline::prelude::*;
//!
//! let pipeline = Pipeline::<ServerSpec>::begin()
//!     .then("create server", |handle, spec| async move {
//!         let server = api.create_server(&spec).await?;
//!         let id = server.id.clone();
//!         handle.defer_rollback("delete server", move |_ctx| async move {
//!             api.delete_server(&id).await
//!         });
//!         Ok(server)
//!     })
//!     .then("attach volume", |handle, server| async move {
//!         // ...
//!         Ok(server)
//!     });
//!
//! let parent = CancellationToken::new();
//! let server = pipeline.execute(&parent, spec).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod errors;
pub mod observability;
pub mod pipeline;

pub use cancellation::{CancellationToken, InterruptSubscription};
pub use context::{RollbackContext, RunIdentity, StageHandle};
pub use errors::{ExecuteError, FailureCause, RollbackFailure};
pub use pipeline::{Pipeline, RunState};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, InterruptSubscription};
    pub use crate::context::{RollbackContext, RunIdentity, StageHandle};
    pub use crate::errors::{ExecuteError, FailureCause, RollbackFailure};
    pub use crate::pipeline::{Pipeline, RunState};
}
