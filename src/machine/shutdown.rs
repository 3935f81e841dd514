//! Cooperative shutdown flag.

use crate::core::FsmError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shareable handle that asks a running machine to stop.
///
/// The machine checks the flag at the top of each dispatch iteration and
/// after every periodic tick; an action already running is not interrupted.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the machine can run again.
    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    /// Request shutdown when the process receives Ctrl-C.
    ///
    /// Only one handler can be installed per process.
    pub fn install_interrupt_handler(&self) -> Result<(), FsmError> {
        let handle = self.clone();
        ctrlc::set_handler(move || {
            info!("interrupt received, shutting down");
            handle.request();
        })?;
        Ok(())
    }
}
