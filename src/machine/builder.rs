//! Builder for constructing machines.

use super::config::MachineConfig;
use super::machine::Machine;
use crate::core::{FsmError, Params, ParamsRecord, State};

/// Builder for constructing machines with a fluent API.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::core::{BaseState, Params};
/// use metronome_fsm::machine::{MachineBuilder, MachineConfig};
///
/// let machine = MachineBuilder::new(Params::new(["count"]))
///     .config(MachineConfig::default().with_debug_logging(true))
///     .state(BaseState::new("start").unwrap().with_testing(true))
///     .require_ready(true)
///     .build()
///     .unwrap();
///
/// assert!(machine.contains("start"));
/// ```
pub struct MachineBuilder<P: ParamsRecord = Params> {
    params: P,
    config: MachineConfig,
    states: Vec<Box<dyn State<P>>>,
    require_ready: bool,
}

impl<P: ParamsRecord> MachineBuilder<P> {
    pub fn new(params: P) -> Self {
        Self {
            params,
            config: MachineConfig::default(),
            states: Vec::new(),
            require_ready: false,
        }
    }

    pub fn config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a state. Later states replace earlier ones with the same name.
    pub fn state<S>(mut self, state: S) -> Self
    where
        S: State<P> + 'static,
    {
        self.states.push(Box::new(state));
        self
    }

    /// Add multiple boxed states at once.
    pub fn states(mut self, states: Vec<Box<dyn State<P>>>) -> Self {
        self.states.extend(states);
        self
    }

    /// Fail the build unless a `"start"` state is present.
    pub fn require_ready(mut self, required: bool) -> Self {
        self.require_ready = required;
        self
    }

    /// Build the machine.
    ///
    /// Installs the Ctrl-C handler when the configuration asks for it.
    pub fn build(self) -> Result<Machine<P>, FsmError> {
        self.config.default_step()?;
        let trap_interrupt = self.config.trap_interrupt;
        let verbose = self.config.debug_logging;

        let mut machine = Machine::with_config(self.params, self.config);
        for state in self.states {
            machine.add_boxed(state)?;
        }

        if self.require_ready {
            machine.validate(verbose)?;
        }
        if trap_interrupt {
            machine.install_interrupt_handler()?;
        }
        Ok(machine)
    }
}
