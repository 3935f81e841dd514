//! Core types shared by the machine and its states.
//!
//! This module contains:
//! - The `State` lifecycle contract and two ready-made states
//! - The shared parameter record and its `ParamsRecord` contract
//! - Transition history tracking
//! - The crate-wide `FsmError`

mod error;
mod fn_state;
mod history;
mod params;
mod state;

pub use error::FsmError;
pub use fn_state::FnState;
pub use history::{StateHistory, StateTransition};
pub use params::{ErrorInfo, Params, ParamsRecord};
pub use state::{BaseState, State};
