//! The state machine runtime.
//!
//! - `Machine`: owns the states and the shared record, runs the dispatch loop
//! - `MachineBuilder`: fluent construction with readiness enforcement
//! - `MachineConfig`: runtime options, loadable from TOML
//! - `ShutdownHandle`: cooperative cancellation, optionally wired to Ctrl-C

mod builder;
mod config;
#[allow(clippy::module_inception)]
mod machine;
mod readiness;
mod shutdown;

pub use builder::MachineBuilder;
pub use config::MachineConfig;
pub use machine::Machine;
pub use readiness::{check_states, ReadinessIssue, START_STATE};
pub use shutdown::ShutdownHandle;
