//! Readiness check for machines.
//!
//! Uses stillwater's `Validation` so that every problem is reported in a
//! single pass rather than only the first one.

use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Name of the state a machine runs when no other is given.
pub const START_STATE: &str = "start";

/// A reason why a machine is not runnable from its default start state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadinessIssue {
    #[error("machine has no states")]
    NoStates,

    #[error("no state named \"start\"")]
    MissingStart,
}

/// Check a set of state names, accumulating every issue found.
pub fn check_states<'a, I>(names: I) -> Validation<(), NonEmptyVec<ReadinessIssue>>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();

    let not_empty: Validation<(), NonEmptyVec<ReadinessIssue>> = if names.is_empty() {
        Validation::fail(ReadinessIssue::NoStates)
    } else {
        Validation::success(())
    };

    let has_start: Validation<(), NonEmptyVec<ReadinessIssue>> = if names.contains(&START_STATE) {
        Validation::success(())
    } else {
        Validation::fail(ReadinessIssue::MissingStart)
    };

    Validation::all_vec(vec![not_empty, has_start]).map(|_| ())
}
