//! Cooperative cancellation for pipeline execution.
//!
//! This module provides:
//! - `CancellationToken` for cooperative cancellation with async waiting
//! - `InterruptSubscription` for merging the process interrupt signal
//!   into a token for the duration of an execution

mod interrupt;
mod token;

pub use interrupt::InterruptSubscription;
pub use token::CancellationToken;
