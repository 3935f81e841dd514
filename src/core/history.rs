//! Transition history tracking.
//!
//! The machine appends one record each time `current_state` changes
//! between two dispatch iterations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Record of a single observed transition.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::core::StateTransition;
/// use chrono::Utc;
///
/// let transition = StateTransition {
///     from: "Idle".to_string(),
///     to: Some("Stop".to_string()),
///     timestamp: Utc::now(),
///     iterations: 11,
/// };
/// assert!(!transition.is_halt());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// The state being left
    pub from: String,
    /// The state requested next, `None` when the machine was told to halt
    pub to: Option<String>,
    /// When the transition was observed
    pub timestamp: DateTime<Utc>,
    /// Number of `in_loop` invocations performed during the activation
    pub iterations: u64,
}

impl StateTransition {
    pub fn is_halt(&self) -> bool {
        self.to.is_none()
    }
}

/// Ordered history of transitions.
///
/// A history built with [`with_limit`](Self::with_limit) keeps only the most
/// recent entries, so long-running machines do not grow without bound.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::core::{StateHistory, StateTransition};
/// use chrono::Utc;
///
/// let mut history = StateHistory::new();
/// history.record(StateTransition {
///     from: "Idle".to_string(),
///     to: Some("Stop".to_string()),
///     timestamp: Utc::now(),
///     iterations: 11,
/// });
/// history.record(StateTransition {
///     from: "Stop".to_string(),
///     to: None,
///     timestamp: Utc::now(),
///     iterations: 1,
/// });
///
/// assert_eq!(history.get_path(), vec!["Idle", "Stop"]);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateHistory {
    transitions: VecDeque<StateTransition>,
    limit: Option<usize>,
}

impl StateHistory {
    /// Unbounded history.
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// History retaining at most `limit` transitions, oldest evicted first.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            transitions: VecDeque::new(),
            limit,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn record(&mut self, transition: StateTransition) {
        self.transitions.push_back(transition);
        if let Some(limit) = self.limit {
            while self.transitions.len() > limit {
                self.transitions.pop_front();
            }
        }
    }

    /// Names of the states traversed, in order.
    ///
    /// Starts with the first retained state left and ends with the last
    /// state entered; a final halt contributes no name.
    pub fn get_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        if let Some(first) = self.transitions.front() {
            path.push(first.from.as_str());
        }
        for transition in &self.transitions {
            if let Some(to) = transition.to.as_deref() {
                path.push(to);
            }
        }
        path
    }

    /// Time between the first and last retained transition.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.transitions.front(), self.transitions.back()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    pub fn transitions(&self) -> &VecDeque<StateTransition> {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(from: &str, to: Option<&str>) -> StateTransition {
        StateTransition {
            from: from.to_string(),
            to: to.map(str::to_string),
            timestamp: Utc::now(),
            iterations: 1,
        }
    }

    #[test]
    fn new_history_is_empty() {
        let history = StateHistory::new();
        assert!(history.is_empty());
        assert!(history.get_path().is_empty());
        assert!(history.duration().is_none());
    }

    #[test]
    fn get_path_returns_state_sequence() {
        let mut history = StateHistory::new();
        history.record(transition("start", Some("Idle")));
        history.record(transition("Idle", Some("Stop")));

        assert_eq!(history.get_path(), vec!["start", "Idle", "Stop"]);
    }

    #[test]
    fn halt_is_not_part_of_the_path() {
        let mut history = StateHistory::new();
        history.record(transition("Stop", None));

        assert_eq!(history.get_path(), vec!["Stop"]);
        assert!(history.transitions()[0].is_halt());
    }

    #[test]
    fn duration_calculates_elapsed_time() {
        let mut history = StateHistory::new();
        history.record(transition("start", Some("Idle")));
        std::thread::sleep(Duration::from_millis(10));
        history.record(transition("Idle", None));

        assert!(history.duration().unwrap() >= Duration::from_millis(10));
    }

    #[test]
    fn history_serializes_correctly() {
        let mut history = StateHistory::new();
        history.record(transition("start", Some("Idle")));

        let json = serde_json::to_string(&history).unwrap();
        let deserialized: StateHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(history.transitions(), deserialized.transitions());
    }

    #[test]
    fn limit_evicts_oldest_transitions() {
        let mut history = StateHistory::with_limit(Some(3));
        for i in 0..10 {
            let from = format!("S{i}");
            let to = format!("S{}", i + 1);
            history.record(transition(&from, Some(&to)));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.limit(), Some(3));
        assert_eq!(history.get_path(), vec!["S7", "S8", "S9", "S10"]);
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let mut history = StateHistory::with_limit(Some(0));
        history.record(transition("start", None));
        assert!(history.is_empty());
    }

    #[test]
    fn clear_forgets_transitions() {
        let mut history = StateHistory::new();
        history.record(transition("start", None));
        history.clear();
        assert!(history.is_empty());
    }
}
