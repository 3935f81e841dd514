//! Deadline overrun report.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// A tick became due while the previous invocation was still running and
/// strict timing was enabled.
#[derive(Debug, Clone, Error, PartialEq)]
#[error(
    "Deadline exceeded at iteration {iteration}: TET {tet:?} for step {step:?} ({:.1}%)",
    overrun_percent(.tet, .step)
)]
pub struct DeadlineExceeded {
    /// Execution time of the overrunning invocation
    pub tet: Duration,
    /// Configured step at the time of the overrun
    pub step: Duration,
    /// Index of the overrunning invocation
    pub iteration: u64,
    /// When the missed tick was due
    pub timestamp: DateTime<Utc>,
}

impl DeadlineExceeded {
    /// Overrun ratio, `tet / step * 100`.
    pub fn ratio(&self) -> f64 {
        overrun_percent(&self.tet, &self.step)
    }
}

fn overrun_percent(tet: &Duration, step: &Duration) -> f64 {
    if step.is_zero() {
        return f64::INFINITY;
    }
    tet.as_secs_f64() / step.as_secs_f64() * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_percentage_of_step() {
        let report = DeadlineExceeded {
            tet: Duration::from_millis(15),
            step: Duration::from_millis(10),
            iteration: 3,
            timestamp: Utc::now(),
        };

        assert!((report.ratio() - 150.0).abs() < 1e-9);
        assert!(report.to_string().contains("150.0%"));
        assert!(report.to_string().contains("iteration 3"));
    }
}
