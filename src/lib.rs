//! Metronome FSM: a cooperative finite state machine runtime
//!
//! Built for small control programs where each state runs a bounded action,
//! either once per entry or periodically at a fixed cadence, and where tick
//! deadlines may need to be enforced.
//!
//! # Core Concepts
//!
//! - **State**: three-phase lifecycle (`on_enter`, `in_loop`, `on_exit`) via the `State` trait
//! - **Params**: shared record carrying `current_state`, `error_info` and user data
//! - **Machine**: dispatch loop selecting the active state by name
//! - **Metronome**: periodic scheduler detecting overrunning ticks
//!
//! # Example
//!
//! ```rust
//! use metronome_fsm::core::{FnState, Params, ParamsRecord};
//! use metronome_fsm::machine::Machine;
//! use std::time::Duration;
//!
//! let mut machine = Machine::with_fields(["counter"]);
//!
//! let looping = FnState::new("loop", |params: &mut Params| {
//!     let counter = params.get_as::<u64>("counter").unwrap_or(0) + 1;
//!     params.set_as("counter", counter)?;
//!     if counter == 3 {
//!         params.halt();
//!     }
//!     Ok(())
//! })
//! .unwrap()
//! .with_timing(Duration::from_millis(10));
//!
//! machine.add(looping).unwrap();
//! machine.run("loop").unwrap();
//!
//! assert_eq!(machine.params().get_as::<u64>("counter"), Some(3));
//! ```

pub mod core;
pub mod machine;
mod macros;
pub mod metronome;

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}

// Re-export commonly used types
pub use crate::core::{BaseState, FnState, FsmError, Params, ParamsRecord, State};
pub use machine::{Machine, MachineBuilder, MachineConfig, ShutdownHandle};
pub use metronome::{DeadlineExceeded, Operation, Tick};
