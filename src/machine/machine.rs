//! The state dispatch loop.

use super::config::MachineConfig;
use super::readiness::{check_states, ReadinessIssue, START_STATE};
use super::shutdown::ShutdownHandle;
use crate::core::{
    ErrorInfo, FsmError, Params, ParamsRecord, State, StateHistory, StateTransition,
};
use crate::metronome::{Operation, Tick};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::{debug, info, warn};

/// A finite state machine running named states over a shared record.
///
/// States are selected by the name stored in the record's
/// `current_state`. Untimed states run their action once per dispatch
/// iteration; timed states are driven by the machine's metronome every
/// `timing` until they change `current_state` or shutdown is requested.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::core::{FnState, Params, ParamsRecord};
/// use metronome_fsm::machine::Machine;
///
/// let mut machine = Machine::with_fields(["count"]);
/// machine.params_mut().set_as("count", 0).unwrap();
///
/// machine
///     .add(FnState::new("Idle", |params: &mut Params| {
///         let count = params.get_as::<u32>("count").unwrap_or(0) + 1;
///         params.set_as("count", count)?;
///         if count > 10 {
///             params.transition_to("Stop");
///         }
///         Ok(())
///     }).unwrap())
///     .unwrap();
/// machine
///     .add(FnState::new("Stop", |params: &mut Params| {
///         params.halt();
///         Ok(())
///     }).unwrap())
///     .unwrap();
///
/// machine.run("Idle").unwrap();
/// assert_eq!(machine.params().get_as::<u32>("count"), Some(11));
/// assert_eq!(machine.history().get_path(), vec!["Idle", "Stop"]);
/// ```
pub struct Machine<P: ParamsRecord = Params> {
    params: P,
    states: HashMap<String, Box<dyn State<P>>>,
    metronome: Option<Operation>,
    shutdown: ShutdownHandle,
    history: StateHistory,
    config: MachineConfig,
    halted: bool,
}

impl Machine<Params> {
    /// Create a machine over a dynamic [`Params`] record declaring `fields`.
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Params::new(fields))
    }
}

impl<P: ParamsRecord> Machine<P> {
    pub fn new(params: P) -> Self {
        Self::with_config(params, MachineConfig::default())
    }

    pub fn with_config(mut params: P, config: MachineConfig) -> Self {
        params.set_current_state(None);
        Self {
            params,
            states: HashMap::new(),
            metronome: None,
            shutdown: ShutdownHandle::new(),
            history: StateHistory::with_limit(config.history_limit),
            config,
            halted: false,
        }
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut P {
        &mut self.params
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Names of the registered states, in no particular order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The shared metronome, created when the first timed state was added.
    pub fn metronome(&self) -> Option<&Operation> {
        self.metronome.as_ref()
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    /// Handle other threads can use to stop the machine.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// True once the machine halted or shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.halted || self.shutdown.is_requested()
    }

    /// Request shutdown on Ctrl-C.
    pub fn install_interrupt_handler(&self) -> Result<(), FsmError> {
        self.shutdown.install_interrupt_handler()
    }

    /// Register a state under its name.
    ///
    /// Adding a name twice replaces the earlier state.
    pub fn add<S>(&mut self, state: S) -> Result<(), FsmError>
    where
        S: State<P> + 'static,
    {
        self.add_boxed(Box::new(state))
    }

    pub fn add_boxed(&mut self, state: Box<dyn State<P>>) -> Result<(), FsmError> {
        let name = state.name().to_owned();
        if name.is_empty() {
            return Err(FsmError::InvalidArgument(
                "state name must not be empty".to_string(),
            ));
        }
        if !state.timing().is_zero() && self.metronome.is_none() {
            self.metronome = Some(build_metronome(&self.config)?);
        }
        if self.states.insert(name.clone(), state).is_some() {
            warn!(state = %name, "replacing previously added state");
        }
        Ok(())
    }

    /// Accumulated readiness issues for running from `"start"`.
    pub fn readiness(&self) -> Validation<(), NonEmptyVec<ReadinessIssue>> {
        check_states(self.state_names())
    }

    /// Check that the machine can run from its default start state.
    ///
    /// With `verbose`, each issue is logged as a warning.
    pub fn validate(&self, verbose: bool) -> Result<(), FsmError> {
        match self.readiness() {
            Validation::Success(_) => Ok(()),
            Validation::Failure(issues) => {
                let issues: Vec<ReadinessIssue> = issues.iter().cloned().collect();
                if verbose {
                    for issue in &issues {
                        warn!(%issue, "machine is not ready");
                    }
                }
                Err(FsmError::ReadinessCheckFailed { issues })
            }
        }
    }

    pub fn is_ready(&self, verbose: bool) -> bool {
        self.validate(verbose).is_ok()
    }

    /// Describe every registered state, sorted by name.
    pub fn describe(&self) -> String {
        let mut names: Vec<&String> = self.states.keys().collect();
        names.sort();
        let mut description = format!("Machine with {} states", names.len());
        for name in names {
            description.push_str("\n  ");
            description.push_str(&self.states[name].describe(&self.params));
        }
        description
    }

    /// Run from the `"start"` state.
    pub fn run_from_start(&mut self) -> Result<(), FsmError> {
        self.run(START_STATE)
    }

    /// Run the dispatch loop from `from_state` until the machine halts,
    /// shutdown is requested, or an action fails.
    ///
    /// A failing action or a strict-timing overrun is written to the
    /// record's `error_info` and returned.
    pub fn run(&mut self, from_state: &str) -> Result<(), FsmError> {
        self.params.set_current_state(Some(from_state.to_owned()));
        self.halted = false;
        if !self.states.contains_key(from_state) {
            warn!(state = from_state, "no such state, halting");
            self.halted = true;
        }

        let result = self.dispatch();
        if let Err(e) = &result {
            warn!(error = %e, "machine stopped on error");
        }
        info!("shutdown complete");
        result
    }

    fn dispatch(&mut self) -> Result<(), FsmError> {
        let mut previous: Option<String> = None;
        let mut active: Option<String> = None;
        let mut activation_iterations: u64 = 0;

        while !self.halted && !self.shutdown.is_requested() {
            let Some(current) = self.params.current_state().map(str::to_owned) else {
                self.halted = true;
                break;
            };
            let Some(state) = self.states.get_mut(&current) else {
                self.halted = true;
                break;
            };

            if previous.as_deref() != Some(current.as_str()) {
                let description = state.on_enter(&mut self.params);
                info!(state = %current, "{description}");
                active = Some(current.clone());
                activation_iterations = 0;
            }
            previous = Some(current.clone());

            let timing = state.timing();
            let outcome = if timing.is_zero() {
                if self.config.debug_logging {
                    debug!(state = %current, "running action");
                }
                state.in_loop(&mut self.params).map(|_| 1)
            } else {
                self.run_timed(&current, timing)
            };
            match outcome {
                Ok(iterations) => activation_iterations += iterations,
                Err(e) => {
                    self.params
                        .set_error_info(Some(ErrorInfo::from_error(Some(&current), &e)));
                    return Err(e);
                }
            }

            let next = self.params.current_state().map(str::to_owned);
            if next.as_deref() != Some(current.as_str()) {
                if let Some(state) = self.states.get_mut(&current) {
                    state.on_exit(&mut self.params);
                }
                active = None;
                debug!(from = %current, to = ?next, "transition");
                self.history.record(StateTransition {
                    from: current,
                    to: next.clone(),
                    timestamp: Utc::now(),
                    iterations: activation_iterations,
                });
            }

            if !next.as_deref().is_some_and(|name| self.states.contains_key(name)) {
                if let Some(name) = next.as_deref() {
                    warn!(state = name, "no such state, halting");
                }
                self.halted = true;
            }
        }

        if let Some(name) = active {
            if let Some(state) = self.states.get_mut(&name) {
                state.on_exit(&mut self.params);
            }
        }
        Ok(())
    }

    fn run_timed(&mut self, current: &str, timing: Duration) -> Result<u64, FsmError> {
        let Self {
            params,
            states,
            metronome,
            shutdown,
            config,
            ..
        } = self;
        let metronome = match metronome {
            Some(metronome) => metronome,
            slot @ None => slot.insert(build_metronome(config)?),
        };

        metronome.set_interval(timing)?;
        warn!("State {current} is enabling metronome!");
        let debug_logging = config.debug_logging;

        let result = metronome.run(None, |tick, previous_tet| {
            let before = params.current_state().map(str::to_owned);
            let Some(state) = before.as_deref().and_then(|name| states.get_mut(name)) else {
                return Ok(Tick::Stop);
            };
            if debug_logging {
                debug!(state = state.name(), tick, ?previous_tet, "running action");
            }
            state.in_loop(params)?;

            let after = params.current_state();
            if after.is_none() || after != before.as_deref() || shutdown.is_requested() {
                Ok(Tick::Stop)
            } else {
                Ok(Tick::Continue)
            }
        });

        warn!("State {current} is stopping metronome!");
        result
    }
}

fn build_metronome(config: &MachineConfig) -> Result<Operation, FsmError> {
    let step = config.default_step()?;
    Ok(Operation::new(step)?.with_strict_timing(config.strict_timing))
}

impl<P: ParamsRecord> fmt::Debug for Machine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.state_names().collect();
        names.sort_unstable();
        f.debug_struct("Machine")
            .field("states", &names)
            .field("params", &self.params)
            .field("metronome", &self.metronome)
            .field("config", &self.config)
            .field("halted", &self.halted)
            .finish()
    }
}
