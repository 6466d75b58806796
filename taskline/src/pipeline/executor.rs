//! Sequential execution with ordered rollback.
//!
//! The executor drives the registered stages in order, threading the carried
//! value from one to the next, and on any terminal outcome other than
//! success drains the accumulated rollback actions in reverse registration
//! order before returning. Scheduling is single-threaded and cooperative:
//! stages never run concurrently, and a tripped signal only takes effect
//! when a body observes it or at the next stage boundary.

use super::builder::{CarriedValue, ErasedStageError, Pipeline};
use super::state::RunState;
use crate::cancellation::{CancellationToken, InterruptSubscription};
use crate::context::{RollbackAction, RollbackContext, RunIdentity, StageHandle};
use crate::errors::{ExecuteError, FailureCause, RollbackFailure};
use std::sync::Arc;
use tracing::{debug, warn};

impl<In, Out> Pipeline<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Runs the pipeline to completion.
    ///
    /// A child cancellation signal is derived from `parent` and from a
    /// process-interrupt subscription held for the duration of this call;
    /// every stage handle shares it. On success the final stage's output is
    /// returned. On any non-success outcome every rollback action registered
    /// by entered stages is invoked in reverse registration order (a single
    /// flat LIFO across stages, including actions the failing stage
    /// registered before its error), and the aggregate error is returned
    /// with the primary cause dominant.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError`] when a stage fails, when the merged signal
    /// trips, or when the interrupt subscription cannot be installed.
    pub async fn execute(
        self,
        parent: &Arc<CancellationToken>,
        seed: In,
    ) -> Result<Out, ExecuteError> {
        let identity = RunIdentity::new();
        let run_id = identity.run_id;

        let signal = parent.child();
        let _interrupt = InterruptSubscription::subscribe(signal.clone()).map_err(|e| {
            ExecuteError::new(FailureCause::Internal(format!(
                "failed to subscribe to the process interrupt: {e}"
            )))
        })?;

        let total = self.stages.len();
        debug!(run_id = %run_id, stages = total, "pipeline starting");

        let mut state = RunState::Fresh;
        let mut rollbacks: Vec<RollbackAction> = Vec::new();
        // Option so the slot stays definitely initialized across the
        // failure paths, where the moved-in value never comes back.
        let mut carried: Option<CarriedValue> = Some(Box::new(seed));
        let mut failure: Option<FailureCause> = None;

        for (index, stage) in self.stages.into_iter().enumerate() {
            let name = stage.name;

            if signal.is_cancelled() {
                let reason = cancel_reason(&signal);
                warn!(run_id = %run_id, stage = %name, reason = %reason, "cancelled before stage");
                transition(&mut state, RunState::Failing(index));
                failure = Some(FailureCause::Cancelled {
                    stage: None,
                    reason,
                    error: None,
                });
                break;
            }

            transition(&mut state, RunState::Running(index));
            debug!(run_id = %run_id, stage = %name, index, "entering stage");

            let Some(input) = carried.take() else {
                transition(&mut state, RunState::Failing(index));
                failure = Some(FailureCause::Internal(format!(
                    "carried value missing entering stage '{name}'"
                )));
                break;
            };

            let handle = StageHandle::new(name.clone(), signal.clone());
            let result = (stage.body)(handle.clone(), input).await;

            // Stage boundary: the handle's rollbacks become part of the
            // global sequence whether the body succeeded or failed. Partial
            // work inside a failing stage still gets undone.
            rollbacks.extend(handle.drain_rollbacks());

            match result {
                Ok(output) => {
                    debug!(run_id = %run_id, stage = %name, "stage completed");
                    carried = Some(output);
                }
                Err(ErasedStageError::Body(error)) => {
                    transition(&mut state, RunState::Failing(index));
                    failure = Some(if signal.is_cancelled() {
                        let reason = cancel_reason(&signal);
                        warn!(run_id = %run_id, stage = %name, reason = %reason, error = %error, "stage cancelled");
                        FailureCause::Cancelled {
                            stage: Some(name),
                            reason,
                            error: Some(error),
                        }
                    } else {
                        warn!(run_id = %run_id, stage = %name, error = %error, "stage failed");
                        FailureCause::Stage { stage: name, error }
                    });
                    break;
                }
                Err(ErasedStageError::Type { expected }) => {
                    transition(&mut state, RunState::Failing(index));
                    failure = Some(FailureCause::Internal(format!(
                        "carried value does not match input type {expected} of stage '{name}'"
                    )));
                    break;
                }
            }
        }

        match failure {
            None => {
                transition(&mut state, RunState::Succeeded);
                debug!(run_id = %run_id, elapsed_ms = identity.elapsed_ms(), "pipeline succeeded");
                let value = carried.ok_or_else(|| {
                    ExecuteError::new(FailureCause::Internal(
                        "carried value missing after successful run".to_string(),
                    ))
                })?;
                value.downcast::<Out>().map(|v| *v).map_err(|_| {
                    ExecuteError::new(FailureCause::Internal(
                        "final carried value does not match the pipeline output type".to_string(),
                    ))
                })
            }
            Some(cause) => {
                let failures = run_rollback(run_id, rollbacks).await;
                transition(&mut state, RunState::Aborted);
                warn!(
                    run_id = %run_id,
                    elapsed_ms = identity.elapsed_ms(),
                    rollback_failures = failures.len(),
                    "pipeline aborted"
                );
                Err(ExecuteError::new(cause).with_rollback_failures(failures))
            }
        }
    }
}

/// Drains the global rollback sequence in reverse registration order.
///
/// Each action runs under a detached context so repeated interrupts cannot
/// skip pending cleanups. A failing action is recorded and never stops the
/// actions after it.
async fn run_rollback(run_id: uuid::Uuid, mut rollbacks: Vec<RollbackAction>) -> Vec<RollbackFailure> {
    let mut failures = Vec::new();
    let ctx = RollbackContext::detached();

    for action in rollbacks.drain(..).rev() {
        let name = action.name().to_string();
        debug!(run_id = %run_id, action = %name, "running rollback action");

        match action.invoke(ctx.clone()).await {
            Ok(()) => {}
            Err(error) => {
                warn!(run_id = %run_id, action = %name, error = %error, "rollback action failed");
                failures.push(RollbackFailure {
                    action: name,
                    error: format!("{error:#}"),
                });
            }
        }
    }

    failures
}

fn cancel_reason(signal: &Arc<CancellationToken>) -> String {
    signal
        .reason()
        .unwrap_or_else(|| "cancellation requested".to_string())
}

fn transition(state: &mut RunState, next: RunState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal run-state transition {state} -> {next}"
    );
    *state = next;
}
