//! The per-execution run state machine.

/// State of a single pipeline execution.
///
/// Transitions: `Fresh -> Running(0)`, `Running(i) -> Running(i + 1)`,
/// `Running(i) -> Succeeded`, and on any non-success outcome
/// `Fresh | Running(i) -> Failing(i) -> Aborted`. `Succeeded` and `Aborted`
/// are terminal. The executor asserts these transitions in debug builds and
/// carries the state into its tracing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Execution has not entered its first stage yet.
    Fresh,
    /// The stage at this index is running.
    Running(usize),
    /// Every stage completed and the final value was returned.
    Succeeded,
    /// A non-success outcome was observed at this stage index; the rollback
    /// pass is running.
    Failing(usize),
    /// The rollback pass finished and the aggregate error was returned.
    Aborted,
}

impl RunState {
    /// Returns whether the state is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Aborted)
    }

    /// Returns whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Fresh, Self::Running(0)) => true,
            (Self::Running(i), Self::Running(j)) => j == i + 1,
            (Self::Running(_), Self::Succeeded) => true,
            // An empty pipeline succeeds without entering a stage.
            (Self::Fresh, Self::Succeeded) => true,
            (Self::Fresh, Self::Failing(0)) => true,
            (Self::Running(i), Self::Failing(j)) => j == i || j == i + 1,
            (Self::Failing(_), Self::Aborted) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Running(i) => write!(f, "running({i})"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failing(i) => write!(f, "failing({i})"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}
