use crate::backend::BackendError;
use crate::resolution::ResolutionError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Idle,
    Started,
    InProgress,
    Completed,
    Errored,
    TimedOut,
}

impl CompletionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CompletionState::Completed | CompletionState::Errored | CompletionState::TimedOut
        )
    }
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompletionState::Idle => "idle",
            CompletionState::Started => "started",
            CompletionState::InProgress => "in_progress",
            CompletionState::Completed => "completed",
            CompletionState::Errored => "errored",
            CompletionState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    /// Final output text. `None` when the output region was missing or blank.
    pub text: Option<String>,
    pub elapsed: Duration,
    /// Whether a busy or thinking signal was ever seen.
    pub signal_observed: bool,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    /// The operation may still be running on the page.
    #[error("Operation did not finish within {budget:?} (last state: {last_state})")]
    TimedOut {
        budget: Duration,
        last_state: CompletionState,
    },

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid error pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
