//! Pipeline building and execution.
//!
//! This module provides:
//! - The typed pipeline builder (compile-time chaining contract)
//! - The sequential executor with its rollback pass
//! - The per-execution run state machine

mod builder;
mod executor;
mod state;

#[cfg(test)]
mod integration_tests;

pub use builder::Pipeline;
pub use state::RunState;
