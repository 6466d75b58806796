//! Identity for a single pipeline execution.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identity of one pipeline execution, used in tracing fields.
#[derive(Debug, Clone)]
pub struct RunIdentity {
    /// Unique id for this execution.
    pub run_id: Uuid,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
}

impl RunIdentity {
    /// Creates a fresh run identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Milliseconds elapsed since the execution started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}
