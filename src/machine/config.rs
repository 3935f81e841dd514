//! Machine configuration.

use crate::core::FsmError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Runtime options for a [`Machine`](super::Machine).
///
/// Every field has a default, so a configuration file only needs the keys
/// it changes.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::machine::MachineConfig;
///
/// let config = MachineConfig::from_toml_str("strict_timing = true").unwrap();
/// assert!(config.strict_timing);
/// assert!(!config.debug_logging);
/// assert_eq!(config.default_step_secs, 0.5);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Log every dispatch iteration and tick
    pub debug_logging: bool,
    /// Turn metronome overruns into `DeadlineExceeded` errors
    pub strict_timing: bool,
    /// Initial metronome step, replaced per state at dispatch time
    pub default_step_secs: f64,
    /// Install a Ctrl-C handler that requests shutdown when the machine is built
    pub trap_interrupt: bool,
    /// Most recent transitions kept in the machine's history, `None` for all
    pub history_limit: Option<usize>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            strict_timing: false,
            default_step_secs: 0.5,
            trap_interrupt: false,
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
        }
    }
}

impl MachineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, FsmError> {
        let config: Self = toml::from_str(content).map_err(|e| FsmError::Config(e.to_string()))?;
        config.default_step()?;
        Ok(config)
    }

    /// Load a TOML file. A missing file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FsmError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| FsmError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
            .map_err(|e| FsmError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    pub fn default_step(&self) -> Result<Duration, FsmError> {
        Duration::try_from_secs_f64(self.default_step_secs)
            .ok()
            .filter(|step| !step.is_zero())
            .ok_or_else(|| {
                FsmError::Config(format!(
                    "default_step_secs must be a positive number of seconds, got {}",
                    self.default_step_secs
                ))
            })
    }

    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    pub fn with_strict_timing(mut self, strict: bool) -> Self {
        self.strict_timing = strict;
        self
    }

    pub fn with_trap_interrupt(mut self, trap: bool) -> Self {
        self.trap_interrupt = trap;
        self
    }

    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = MachineConfig::from_toml_str("").unwrap();
        assert_eq!(config, MachineConfig::default());
        assert_eq!(config.default_step().unwrap(), Duration::from_millis(500));
        assert_eq!(config.history_limit, Some(1024));
    }

    #[test]
    fn full_document_overrides_everything() {
        let config = MachineConfig::from_toml_str(
            r#"
            debug_logging = true
            strict_timing = true
            default_step_secs = 0.01
            trap_interrupt = true
            history_limit = 64
            "#,
        )
        .unwrap();

        assert!(config.debug_logging);
        assert!(config.strict_timing);
        assert!(config.trap_interrupt);
        assert_eq!(config.history_limit, Some(64));
        assert_eq!(config.default_step().unwrap(), Duration::from_millis(10));
    }

    #[test]
    fn non_positive_step_is_rejected() {
        let err = MachineConfig::from_toml_str("default_step_secs = 0.0").unwrap_err();
        assert!(matches!(err, FsmError::Config(_)));

        let err = MachineConfig::from_toml_str("default_step_secs = -1.0").unwrap_err();
        assert!(matches!(err, FsmError::Config(_)));
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = MachineConfig::from_toml_str("strict_timing = \"yes\"").unwrap_err();
        assert!(matches!(err, FsmError::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = MachineConfig::from_file("/nonexistent/metronome-fsm.toml").unwrap();
        assert_eq!(config, MachineConfig::default());
    }
}
