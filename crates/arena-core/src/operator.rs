//! Operator control state for the cycle scheduler.
//!
//! Shared between the scheduler loop and whoever may end it early (the
//! engine binary's Ctrl-C handler, a test). The stop flag is an atomic so it
//! can sit behind an [`Arc`](std::sync::Arc) without a lock. [`OperatorState`]
//! is also the [`CycleControl`] the scheduler hands to each cycle, so a stop
//! request is honoured at the next phase boundary.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::cycle::CycleControl;

/// Reason why the scheduler ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerEndReason {
    /// Ran the configured number of cycles.
    MaxCyclesReached,
    /// An operator issued a stop command.
    OperatorStop,
    /// No active agents remain.
    Extinction,
}

/// Shared operator control state.
#[derive(Debug)]
pub struct OperatorState {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Pause between cycles in milliseconds.
    cycle_interval_ms: u64,

    /// Maximum number of cycles (0 = unlimited).
    max_cycles: u64,
}

impl OperatorState {
    /// Create a new operator state from configuration.
    pub const fn new(config: &SchedulerConfig) -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            cycle_interval_ms: config.cycle_interval_ms,
            max_cycles: config.max_cycles,
        }
    }

    /// Request a clean stop. A running cycle stops at its next phase
    /// boundary; no new cycle starts.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Pause between cycles in milliseconds.
    pub const fn cycle_interval_ms(&self) -> u64 {
        self.cycle_interval_ms
    }

    /// Whether `cycles_run` has reached the limit (`0` means unlimited).
    pub const fn cycle_limit_reached(&self, cycles_run: u64) -> bool {
        self.max_cycles > 0 && cycles_run >= self.max_cycles
    }

    /// Configured maximum cycles.
    pub const fn max_cycles(&self) -> u64 {
        self.max_cycles
    }
}

impl CycleControl for OperatorState {
    fn should_stop(&self) -> bool {
        self.is_stop_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbounded() -> SchedulerConfig {
        SchedulerConfig {
            cycle_interval_ms: 1000,
            max_cycles: 0,
        }
    }

    #[test]
    fn initial_state_is_running() {
        let state = OperatorState::new(&unbounded());
        assert!(!state.is_stop_requested());
        assert!(!state.should_stop());
        assert_eq!(state.cycle_interval_ms(), 1000);
    }

    #[test]
    fn stop_request_reaches_cycle_control() {
        let state = OperatorState::new(&unbounded());
        state.request_stop();
        assert!(state.is_stop_requested());
        assert!(state.should_stop());
    }

    #[test]
    fn zero_max_cycles_means_unlimited() {
        let state = OperatorState::new(&unbounded());
        assert!(!state.cycle_limit_reached(1_000_000));
        let bounded = OperatorState::new(&SchedulerConfig {
            cycle_interval_ms: 0,
            max_cycles: 3,
        });
        assert!(!bounded.cycle_limit_reached(2));
        assert!(bounded.cycle_limit_reached(3));
        assert_eq!(bounded.max_cycles(), 3);
    }
}
