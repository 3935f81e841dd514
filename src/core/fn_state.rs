//! States built from closures.

use super::error::FsmError;
use super::params::{Params, ParamsRecord};
use super::state::State;
use std::fmt;
use std::time::Duration;

type Action<P> = Box<dyn FnMut(&mut P) -> Result<(), FsmError> + Send>;
type Hook<P> = Box<dyn FnMut(&mut P) + Send>;

/// A state whose action is a closure.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::core::{FnState, Params, ParamsRecord, State};
/// use std::time::Duration;
///
/// let mut looping = FnState::new("loop", |params: &mut Params| {
///     let counter = params.get_as::<u64>("counter").unwrap_or(0);
///     params.set_as("counter", counter + 1)
/// })
/// .unwrap()
/// .with_timing(Duration::from_millis(10));
///
/// let mut params = Params::new(["counter"]);
/// looping.in_loop(&mut params).unwrap();
/// assert_eq!(params.get_as::<u64>("counter"), Some(1));
/// assert_eq!(looping.timing(), Duration::from_millis(10));
/// ```
pub struct FnState<P: ParamsRecord = Params> {
    name: String,
    timing: Duration,
    action: Action<P>,
    on_enter: Option<Hook<P>>,
    on_exit: Option<Hook<P>>,
}

impl<P: ParamsRecord> FnState<P> {
    pub fn new<F>(name: impl Into<String>, action: F) -> Result<Self, FsmError>
    where
        F: FnMut(&mut P) -> Result<(), FsmError> + Send + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(FsmError::InvalidArgument(
                "state name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            timing: Duration::ZERO,
            action: Box::new(action),
            on_enter: None,
            on_exit: None,
        })
    }

    pub fn with_timing(mut self, timing: Duration) -> Self {
        self.timing = timing;
        self
    }

    /// Run `hook` every time the state is entered.
    pub fn with_on_enter<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut P) + Send + 'static,
    {
        self.on_enter = Some(Box::new(hook));
        self
    }

    /// Run `hook` every time the state is left.
    pub fn with_on_exit<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut P) + Send + 'static,
    {
        self.on_exit = Some(Box::new(hook));
        self
    }
}

impl<P: ParamsRecord> State<P> for FnState<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn timing(&self) -> Duration {
        self.timing
    }

    fn on_enter(&mut self, params: &mut P) -> String {
        if let Some(hook) = self.on_enter.as_mut() {
            hook(params);
        }
        format!("> Entering {} state.", self.name)
    }

    fn in_loop(&mut self, params: &mut P) -> Result<(), FsmError> {
        (self.action)(params)
    }

    fn on_exit(&mut self, params: &mut P) {
        if let Some(hook) = self.on_exit.as_mut() {
            hook(params);
        }
    }
}

impl<P: ParamsRecord> fmt::Debug for FnState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnState")
            .field("name", &self.name)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}
