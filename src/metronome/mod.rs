//! Periodic task scheduling with deadline detection.
//!
//! An [`Operation`] invokes a callback at a fixed cadence. Invocations never
//! overlap: a tick that falls due while the previous one is still running is
//! dropped, or reported as [`DeadlineExceeded`] when strict timing is on.

mod error;
mod operation;

pub use error::DeadlineExceeded;
pub use operation::{Operation, Tick};
