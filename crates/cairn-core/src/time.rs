//! The process-wide simulation clock.
//!
//! [`TimeManager`] is the single authoritative time record on each
//! process. The evolution driver is its only writer, mutating it exactly
//! once per cycle; every other component reads it through a shared
//! reference. After the distributed minimum-reduction the `dt` field is
//! numerically identical on every rank before any block begins its step.

use crate::error::SetupError;

/// Configured bounds for a run.
///
/// Either limit ending the loop is a normal (`Complete`) exit. Validation
/// happens once, at driver construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeConfig {
    /// Simulation end time. The final step is clamped so the run lands on
    /// this value exactly.
    pub time_limit: f64,
    /// Maximum number of cycles to execute.
    pub cycle_limit: u64,
    /// Emit a cycle-diagnostics line every this many cycles; 0 disables
    /// cycle diagnostics entirely.
    pub output_cadence: u64,
}

impl TimeConfig {
    /// Check structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::InvalidTimeConfig`] when `time_limit` is not
    /// finite-positive or `cycle_limit` is zero.
    pub fn validate(&self) -> Result<(), SetupError> {
        if !self.time_limit.is_finite() || self.time_limit <= 0.0 {
            return Err(SetupError::InvalidTimeConfig {
                reason: format!("time_limit must be finite and positive, got {}", self.time_limit),
            });
        }
        if self.cycle_limit == 0 {
            return Err(SetupError::InvalidTimeConfig {
                reason: "cycle_limit must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Process-wide time state: current time, step size, and cycle count.
///
/// `dt` starts at infinity so that the first global step selection is
/// driven purely by the block estimates — the 2× growth cap is vacuous
/// until a real step has been taken.
#[derive(Clone, Debug)]
pub struct TimeManager {
    /// Current simulation time.
    pub time: f64,
    /// Current global step size.
    pub dt: f64,
    /// Completed cycle count.
    pub cycle: u64,
    /// Simulation end time.
    pub time_limit: f64,
    /// Maximum cycle count.
    pub cycle_limit: u64,
    /// Cycle-diagnostics cadence; 0 disables.
    pub output_cadence: u64,
}

impl TimeManager {
    /// Build a time manager from a validated [`TimeConfig`].
    pub fn new(config: &TimeConfig) -> Self {
        Self {
            time: 0.0,
            dt: f64::INFINITY,
            cycle: 0,
            time_limit: config.time_limit,
            cycle_limit: config.cycle_limit,
            output_cadence: config.output_cadence,
        }
    }

    /// Whether the evolution loop should run another cycle.
    pub fn keep_going(&self) -> bool {
        self.time < self.time_limit && self.cycle < self.cycle_limit
    }

    /// Advance the clock by the current step: `time += dt`, `cycle += 1`.
    ///
    /// Called exactly once per cycle, by the driver only.
    pub fn advance(&mut self) {
        self.time += self.dt;
        self.cycle += 1;
    }

    /// Whether the current cycle is on the diagnostics cadence.
    pub fn output_due(&self) -> bool {
        self.output_cadence != 0 && self.cycle % self.output_cadence == 0
    }
}
