//! Error types for the taskline pipeline runner.
//!
//! The taxonomy mirrors the execution model: a primary cause (stage failure
//! or cancellation) fixed by the first non-success outcome, with any
//! rollback failures attached as subordinate information. Chain mismatches
//! are not represented here at all - adjacent-stage type agreement is
//! enforced by the type parameters on [`Pipeline::then`](crate::Pipeline::then),
//! so an ill-typed chain does not compile.

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// The primary cause of a failed execution.
#[derive(Debug, Error)]
pub enum FailureCause {
    /// The body of a stage returned an error.
    #[error("stage '{stage}' failed: {error}")]
    Stage {
        /// The failing stage's name.
        stage: String,
        /// The error the body returned.
        error: anyhow::Error,
    },

    /// The merged cancellation signal tripped before or during a stage.
    #[error("pipeline cancelled{}: {reason}{}",
        stage.as_deref().map(|s| format!(" at stage '{s}'")).unwrap_or_default(),
        error.as_ref().map(|e| format!(" (stage returned: {e})")).unwrap_or_default())]
    Cancelled {
        /// The stage that was running when the trip was observed, if any.
        stage: Option<String>,
        /// The cancellation reason.
        reason: String,
        /// The error the interrupted body returned, if the trip was
        /// observed through a body error. Never swallowed; rendered in the
        /// message and exposed through `Error::source`.
        error: Option<anyhow::Error>,
    },

    /// An invariant of the runner itself was violated. Unreachable through
    /// the typed builder API.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A rollback action that failed during the rollback pass.
///
/// Never suppresses the primary cause; surfaced alongside it in
/// [`ExecuteError::rollback_failures`], in rollback (reverse registration)
/// order.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackFailure {
    /// The diagnostic name the action was registered under.
    pub action: String,
    /// The rendered error the action returned.
    pub error: String,
}

/// The aggregate error returned by a non-successful execution.
#[derive(Debug)]
pub struct ExecuteError {
    /// The primary cause. Fixed by the first non-success outcome.
    pub cause: FailureCause,
    /// Rollback failures, in the order the rollback pass hit them.
    pub rollback_failures: Vec<RollbackFailure>,
}

impl ExecuteError {
    /// Creates an aggregate error with no rollback failures.
    #[must_use]
    pub fn new(cause: FailureCause) -> Self {
        Self {
            cause,
            rollback_failures: Vec::new(),
        }
    }

    /// Attaches the rollback failures collected during the rollback pass.
    #[must_use]
    pub fn with_rollback_failures(mut self, failures: Vec<RollbackFailure>) -> Self {
        self.rollback_failures = failures;
        self
    }

    /// Returns whether the primary cause is a cancellation.
    ///
    /// Callers should use this rather than matching on the message; the
    /// exact cancellation wording is not part of the contract.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, FailureCause::Cancelled { .. })
    }

    /// Returns the name of the stage the failure is attributed to, if any.
    #[must_use]
    pub fn failing_stage(&self) -> Option<&str> {
        match &self.cause {
            FailureCause::Stage { stage, .. } => Some(stage),
            FailureCause::Cancelled { stage, .. } => stage.as_deref(),
            FailureCause::Internal(_) => None,
        }
    }

    /// Converts to a dictionary representation for structured reporting.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        let kind = match &self.cause {
            FailureCause::Stage { .. } => "stage",
            FailureCause::Cancelled { .. } => "cancelled",
            FailureCause::Internal(_) => "internal",
        };
        map.insert("kind".to_string(), serde_json::json!(kind));
        map.insert(
            "message".to_string(),
            serde_json::json!(self.cause.to_string()),
        );
        if let Some(stage) = self.failing_stage() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        if !self.rollback_failures.is_empty() {
            map.insert(
                "rollback_failures".to_string(),
                serde_json::json!(self.rollback_failures),
            );
        }

        map
    }
}

impl std::fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cause)?;
        if !self.rollback_failures.is_empty() {
            write!(
                f,
                " ({} rollback action(s) failed:",
                self.rollback_failures.len()
            )?;
            for (i, failure) in self.rollback_failures.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, " '{}': {}", failure.action, failure.error)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecuteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            FailureCause::Stage { error, .. }
            | FailureCause::Cancelled {
                error: Some(error), ..
            } => Some(error.as_ref()),
            _ => None,
        }
    }
}
