//! Counter State Machine
//!
//! An untimed `Idle` state counts to eleven, then hands over to a timed
//! `Blink` state ticking every 100ms until Ctrl-C or five blinks.
//!
//! Key concepts:
//! - Closure-backed states
//! - Periodic states driven by the metronome
//! - Cooperative shutdown on Ctrl-C
//!
//! Run with: cargo run --example counter

use metronome_fsm::core::{FnState, Params, ParamsRecord};
use metronome_fsm::machine::{MachineBuilder, MachineConfig};
use metronome_fsm::params;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("=== Counter State Machine ===\n");

    let idle = FnState::new("start", |params: &mut Params| {
        let count = params.get_as::<u32>("count").unwrap_or(0) + 1;
        params.set_as("count", count)?;
        if count > 10 {
            params.transition_to("Blink");
        }
        Ok(())
    })?;

    let blink = FnState::new("Blink", |params: &mut Params| {
        let blinks = params.get_as::<u32>("blinks").unwrap_or(0) + 1;
        params.set_as("blinks", blinks)?;
        println!("  blink #{blinks}");
        if blinks == 5 {
            params.halt();
        }
        Ok(())
    })?
    .with_timing(Duration::from_millis(100))
    .with_on_exit(|params| {
        println!("  Blink left after {:?} blinks", params.get_as::<u32>("blinks"));
    });

    let mut machine = MachineBuilder::new(params! { count => 0, blinks => 0 })
        .config(MachineConfig::default().with_trap_interrupt(true))
        .state(idle)
        .state(blink)
        .require_ready(true)
        .build()?;

    println!("{}\n", machine.describe());
    machine.run_from_start()?;

    println!("\nVisited: {:?}", machine.history().get_path());
    println!("Count:   {:?}", machine.params().get_as::<u32>("count"));
    println!("\n=== Example Complete ===");
    Ok(())
}
