//! State lifecycle contract.
//!
//! A state is entered once, runs its `in_loop` action one or more times
//! and is exited once when the machine moves elsewhere. Every hook receives
//! the machine's shared parameter record.

use super::error::FsmError;
use super::params::{Params, ParamsRecord};
use std::time::Duration;

/// Trait for machine states.
///
/// Only [`in_loop`](State::in_loop) is required. A state with a non-zero
/// [`timing`](State::timing) is driven periodically by the machine's
/// metronome, so its action must tolerate being called repeatedly.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::core::{FsmError, Params, ParamsRecord, State};
///
/// struct Idle;
///
/// impl State for Idle {
///     fn name(&self) -> &str {
///         "Idle"
///     }
///
///     fn in_loop(&mut self, params: &mut Params) -> Result<(), FsmError> {
///         let count = params.get_as::<u32>("count").unwrap_or(0) + 1;
///         params.set_as("count", count)?;
///         if count > 10 {
///             params.transition_to("Stop");
///         }
///         Ok(())
///     }
/// }
///
/// let mut params = Params::new(["count"]);
/// let mut idle = Idle;
/// idle.in_loop(&mut params).unwrap();
/// assert_eq!(params.get_as::<u32>("count"), Some(1));
/// ```
pub trait State<P: ParamsRecord = Params>: Send {
    /// Unique name of the state within its machine.
    fn name(&self) -> &str;

    /// Period of the action. Zero runs the action once per entry.
    fn timing(&self) -> Duration {
        Duration::ZERO
    }

    /// Hook invoked once when the state becomes current.
    ///
    /// Returns a description that the machine logs.
    fn on_enter(&mut self, _params: &mut P) -> String {
        format!("> Entering {} state.", self.name())
    }

    /// The state's action. Writes the next state into the record to
    /// request a transition.
    fn in_loop(&mut self, params: &mut P) -> Result<(), FsmError>;

    /// Hook invoked once when the machine leaves the state.
    fn on_exit(&mut self, _params: &mut P) {}

    fn describe(&self, params: &P) -> String {
        format!(
            "#<S.{}: @params: {:?}, @timing: {}>",
            self.name(),
            params,
            self.timing().as_secs_f64()
        )
    }
}

/// Paradigm state with no real action.
///
/// Its `in_loop` fails with [`FsmError::NotImplemented`] unless `testing`
/// is enabled, in which case it refreshes the record and keeps itself
/// current. Useful as a stand-in while wiring a machine together.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseState {
    name: String,
    timing: Duration,
    testing: bool,
}

impl BaseState {
    pub fn new(name: impl Into<String>) -> Result<Self, FsmError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FsmError::InvalidArgument(
                "state name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            timing: Duration::ZERO,
            testing: false,
        })
    }

    pub fn with_timing(mut self, timing: Duration) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    pub fn set_timing(&mut self, timing: Duration) {
        self.timing = timing;
    }

    pub fn set_testing(&mut self, testing: bool) {
        self.testing = testing;
    }

    pub fn is_testing(&self) -> bool {
        self.testing
    }
}

impl<P: ParamsRecord> State<P> for BaseState {
    fn name(&self) -> &str {
        &self.name
    }

    fn timing(&self) -> Duration {
        self.timing
    }

    fn in_loop(&mut self, params: &mut P) -> Result<(), FsmError> {
        if !self.testing {
            return Err(FsmError::NotImplemented {
                state: self.name.clone(),
            });
        }
        params.update();
        params.transition_to(&self.name);
        Ok(())
    }
}
