//! Error types shared by the whole runtime.

use crate::machine::ReadinessIssue;
use crate::metronome::DeadlineExceeded;
use thiserror::Error;

/// Errors raised by states, the machine and the metronome.
#[derive(Debug, Error)]
pub enum FsmError {
    /// Malformed state, record field or scheduler argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A placeholder action was invoked outside testing mode.
    #[error("State '{state}' does not implement in_loop")]
    NotImplemented { state: String },

    /// A periodic tick overran its step while strict timing was enabled.
    #[error(transparent)]
    DeadlineExceeded(#[from] DeadlineExceeded),

    /// The machine is not runnable from its default start state.
    #[error("Readiness check failed: {}", format_issues(.issues))]
    ReadinessCheckFailed { issues: Vec<ReadinessIssue> },

    /// Application error reported from a state action.
    #[error("Action failed in state '{state}': {message}")]
    ActionFailed { state: String, message: String },

    #[error("Failed to install interrupt handler: {0}")]
    InterruptHandler(#[from] ctrlc::Error),

    #[error("Failed to spawn metronome thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FsmError {
    /// Wrap an application error raised while running `state`.
    pub fn action(state: impl Into<String>, error: impl std::fmt::Display) -> Self {
        FsmError::ActionFailed {
            state: state.into(),
            message: error.to_string(),
        }
    }

    /// True for overruns detected by a strict metronome.
    pub fn is_deadline(&self) -> bool {
        matches!(self, FsmError::DeadlineExceeded(_))
    }
}

fn format_issues(issues: &[ReadinessIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_error_carries_state_and_message() {
        let err = FsmError::action("Idle", "sensor offline");
        assert_eq!(
            err.to_string(),
            "Action failed in state 'Idle': sensor offline"
        );
        assert!(!err.is_deadline());
    }

    #[test]
    fn readiness_error_lists_every_issue() {
        let err = FsmError::ReadinessCheckFailed {
            issues: vec![ReadinessIssue::NoStates, ReadinessIssue::MissingStart],
        };
        let text = err.to_string();
        assert!(text.contains("no states"));
        assert!(text.contains("\"start\""));
    }
}
