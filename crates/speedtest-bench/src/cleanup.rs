//! Ordered, independently guarded cleanup steps.

use std::fmt::Display;

use tracing::{debug, warn};

use crate::results::CleanupOutcome;

/// Runs cleanup steps in order. A failing step is logged and recorded and
/// never prevents the next one from running.
#[derive(Debug, Default)]
pub struct CleanupReport {
    outcomes: Vec<CleanupOutcome>,
}

impl CleanupReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one step and record its outcome.
    pub fn step<T, E: Display>(&mut self, name: &'static str, f: impl FnOnce() -> Result<T, E>) {
        let error = match f() {
            Ok(_) => {
                debug!(step = name, "Cleanup step finished");
                None
            }
            Err(e) => {
                warn!(step = name, error = %e, "Cleanup step failed");
                Some(e.to_string())
            }
        };
        self.outcomes.push(CleanupOutcome { step: name, error });
    }

    pub fn into_outcomes(self) -> Vec<CleanupOutcome> {
        self.outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_do_not_stop_later_steps() {
        let mut ran = Vec::new();
        let mut report = CleanupReport::new();
        report.step("first", || -> Result<(), String> {
            ran.push(1);
            Err("boom".to_string())
        });
        report.step("second", || -> Result<(), String> {
            ran.push(2);
            Ok(())
        });

        let outcomes = report.into_outcomes();
        assert_eq!(ran, [1, 2]);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].error.as_deref(), Some("boom"));
        assert!(outcomes[1].succeeded());
    }
}
