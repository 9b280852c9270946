//! Periodic evolution cycles with operator controls.
//!
//! [`run_scheduler`] drives cycles back to back with support for:
//!
//! - **Bounded runs**: stop after `max_cycles`
//! - **Fixed interval** between cycles
//! - **Clean stop**: a stop request lands at the next phase boundary
//! - **Extinction**: stop once no active agent remains
//!
//! Cycles never overlap: the next one starts only after the previous one
//! returned and the callback finished.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use arena_events::EventStore;

use crate::arena::Arena;
use crate::cycle::CycleOutcome;
use crate::operator::{OperatorState, SchedulerEndReason};
use crate::shared::SharedArena;

/// Result of a scheduler run.
#[derive(Debug, Clone)]
pub struct SchedulerResult {
    /// Why the scheduler stopped.
    pub end_reason: SchedulerEndReason,
    /// Cycles attempted.
    pub cycles_run: u64,
    /// Cycles that completed.
    pub cycles_completed: u64,
    /// Cycles that failed or were cancelled.
    pub cycles_failed: u64,
    /// Outcome of the last cycle attempted.
    pub last_outcome: Option<CycleOutcome>,
}

/// Callback invoked after every cycle, with the arena read-locked.
///
/// Implementations persist the log, publish stats, and the like. A callback
/// must not fail the scheduler; it logs its own errors.
pub trait CycleCallback<S: EventStore>: Send {
    /// Called after each cycle, successful or not.
    fn on_cycle(
        &mut self,
        outcome: &CycleOutcome,
        arena: &Arena<S>,
    ) -> impl Future<Output = ()> + Send;
}

/// A callback that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl<S: EventStore> CycleCallback<S> for NoOpCallback {
    async fn on_cycle(&mut self, _outcome: &CycleOutcome, _arena: &Arena<S>) {}
}

/// Run evolution cycles until a termination condition is met.
pub async fn run_scheduler<S, C>(
    arena: &SharedArena<S>,
    operator: &Arc<OperatorState>,
    callback: &mut C,
) -> SchedulerResult
where
    S: EventStore,
    C: CycleCallback<S>,
{
    let mut result = SchedulerResult {
        end_reason: SchedulerEndReason::OperatorStop,
        cycles_run: 0,
        cycles_completed: 0,
        cycles_failed: 0,
        last_outcome: None,
    };

    info!(
        max_cycles = operator.max_cycles(),
        cycle_interval_ms = operator.cycle_interval_ms(),
        "Scheduler starting"
    );

    loop {
        // --- Check stop request (before cycle) ---
        if operator.is_stop_requested() {
            info!("Operator stop requested");
            return finish(result, SchedulerEndReason::OperatorStop);
        }

        // --- Run one cycle ---
        let outcome = arena.run_cycle(operator.as_ref()).await;
        result.cycles_run = result.cycles_run.saturating_add(1);
        if outcome.success {
            result.cycles_completed = result.cycles_completed.saturating_add(1);
        } else {
            result.cycles_failed = result.cycles_failed.saturating_add(1);
        }

        // --- Notify callback ---
        let active = {
            let guard = arena.read().await;
            callback.on_cycle(&outcome, &guard).await;
            guard.state().registry().active_count()
        };
        result.last_outcome = Some(outcome);

        // --- Check stop request (a cancelled cycle ends here) ---
        if operator.is_stop_requested() {
            info!("Operator stop requested");
            return finish(result, SchedulerEndReason::OperatorStop);
        }

        // --- Check extinction ---
        if active == 0 {
            info!(cycles_run = result.cycles_run, "No active agents left -- extinction");
            return finish(result, SchedulerEndReason::Extinction);
        }

        // --- Check cycle limit ---
        if operator.cycle_limit_reached(result.cycles_run) {
            info!(
                cycles_run = result.cycles_run,
                max_cycles = operator.max_cycles(),
                "Cycle limit reached"
            );
            return finish(result, SchedulerEndReason::MaxCyclesReached);
        }

        // --- Sleep for cycle interval ---
        let interval_ms = operator.cycle_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
        }
    }
}

const fn finish(mut result: SchedulerResult, reason: SchedulerEndReason) -> SchedulerResult {
    result.end_reason = reason;
    result
}

/// Log the end of a scheduler run.
pub fn log_scheduler_end(result: &SchedulerResult) {
    info!(
        reason = ?result.end_reason,
        cycles_run = result.cycles_run,
        cycles_completed = result.cycles_completed,
        cycles_failed = result.cycles_failed,
        "Scheduler ended"
    );

    match result.last_outcome.as_ref().and_then(|o| o.report.as_ref()) {
        Some(report) => info!(
            cycle = report.cycle_number,
            agents_killed = report.agents_killed,
            agents_graduated = report.agents_graduated,
            agents_mutated = report.agents_mutated,
            allocated = %report.capital_snapshot.allocated_capital,
            unallocated = %report.capital_snapshot.unallocated_capital,
            "Final cycle summary"
        ),
        None => warn!("Scheduler ended without a completed final cycle"),
    }
}
