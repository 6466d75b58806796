//! Per-execution and per-stage context types.
//!
//! This module provides:
//! - `RunIdentity` identifying a single execution for diagnostics
//! - `StageHandle`, the per-stage view handed to stage bodies
//! - `RollbackAction` and `RollbackContext` for the rollback protocol

mod handle;
mod identity;
mod rollback;

pub use handle::StageHandle;
pub use identity::RunIdentity;
pub use rollback::{RollbackAction, RollbackContext};
