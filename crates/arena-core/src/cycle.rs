//! The evolution cycle state machine.
//!
//! One cycle moves through `ALLOCATE -> KILL -> GRADUATE -> MUTATE ->
//! COMPLETE` and returns to idle. Completing a cycle appends a
//! `CapitalConservationCheck` event followed by `EvolutionCycleComplete`,
//! whose payload lists every event the cycle produced. Only then does the
//! cycle index advance.
//!
//! A [`CycleControl`] is consulted before every phase, so a stop request
//! never interrupts a phase halfway. A failed or cancelled cycle keeps the
//! events it already appended and simply has no closing event.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use arena_events::EventStore;
use arena_ledger::ConservationResult;
use arena_types::{
    CapitalConservationCheckDetails, CapitalSnapshot, CyclePhase, EventId, EventType,
    EvolutionCycleCompleteDetails,
};

use crate::arena::Arena;
use crate::error::{ArenaError, CycleError};

/// Decides whether a cycle may start its next phase.
pub trait CycleControl: Send + Sync {
    /// Whether to stop before the next phase.
    fn should_stop(&self) -> bool;
}

/// Control that never stops a cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStop;

impl CycleControl for NeverStop {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Index of the completed cycle.
    pub cycle_number: u64,
    /// Capital moved by the allocation phase.
    pub capital_allocated: Decimal,
    /// Agents killed.
    pub agents_killed: u32,
    /// Agents graduated.
    pub agents_graduated: u32,
    /// Children spawned by mutation.
    pub agents_mutated: u32,
    /// Ledger totals at completion.
    pub capital_snapshot: CapitalSnapshot,
    /// Every event the cycle appended before its closing event.
    pub sub_events: Vec<EventId>,
    /// The `EvolutionCycleComplete` event.
    pub completion_event: EventId,
}

/// Result of [`Arena::safe_run_evolution`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    /// Whether the cycle completed.
    pub success: bool,
    /// What went wrong, if it did not.
    pub error: Option<String>,
    /// The completed cycle.
    pub report: Option<CycleReport>,
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn step(phase: CyclePhase) -> impl FnOnce(ArenaError) -> CycleError {
    move |source| CycleError::Step { phase, source }
}

impl<S: EventStore> Arena<S> {
    /// Run one full evolution cycle.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Step`] naming the phase that failed.
    pub fn run_evolution_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.run_evolution_cycle_with(&NeverStop)
    }

    /// Run one full evolution cycle, checking `control` between phases.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Cancelled`] if `control` stops the cycle, or
    /// [`CycleError::Step`] naming the phase that failed.
    pub fn run_evolution_cycle_with(
        &mut self,
        control: &dyn CycleControl,
    ) -> Result<CycleReport, CycleError> {
        self.cycle_events = Some(Vec::new());
        let result = self.run_phases(control);
        self.cycle_events = None;
        self.phase = CyclePhase::Idle;
        result
    }

    /// Run one cycle, logging and returning any failure instead of
    /// propagating it.
    pub fn safe_run_evolution(&mut self) -> CycleOutcome {
        self.safe_run_evolution_with(&NeverStop)
    }

    /// [`safe_run_evolution`](Self::safe_run_evolution) with a stop control.
    pub fn safe_run_evolution_with(&mut self, control: &dyn CycleControl) -> CycleOutcome {
        let cycle = self.cycle();
        match self.run_evolution_cycle_with(control) {
            Ok(report) => CycleOutcome {
                success: true,
                error: None,
                report: Some(report),
            },
            Err(err) => {
                match &err {
                    CycleError::Cancelled { before } => {
                        warn!(cycle, %before, "Evolution cycle cancelled");
                    }
                    CycleError::Step { phase, source } => {
                        error!(cycle, %phase, error = %source, "Evolution cycle failed");
                    }
                }
                if let Err(conservation) = self.check_conservation() {
                    error!(cycle, error = %conservation, "Ledger out of balance after failed cycle");
                }
                CycleOutcome {
                    success: false,
                    error: Some(err.to_string()),
                    report: None,
                }
            }
        }
    }

    fn enter(&mut self, phase: CyclePhase, control: &dyn CycleControl) -> Result<(), CycleError> {
        if control.should_stop() {
            return Err(CycleError::Cancelled { before: phase });
        }
        self.phase = phase;
        Ok(())
    }

    fn run_phases(&mut self, control: &dyn CycleControl) -> Result<CycleReport, CycleError> {
        let cycle_number = self.cycle();
        info!(
            cycle = cycle_number,
            active_agents = self.state().registry().active_count(),
            "Evolution cycle starting"
        );

        self.enter(CyclePhase::Allocate, control)?;
        let allocation = self
            .allocate_capital()
            .map_err(step(CyclePhase::Allocate))?;

        self.enter(CyclePhase::Kill, control)?;
        let killed = self
            .kill_underperformers()
            .map_err(step(CyclePhase::Kill))?;

        self.enter(CyclePhase::Graduate, control)?;
        let graduated = self
            .graduate_eligible()
            .map_err(step(CyclePhase::Graduate))?;

        self.enter(CyclePhase::Mutate, control)?;
        let mutated = self
            .mutate_top_performers()
            .map_err(step(CyclePhase::Mutate))?;

        self.enter(CyclePhase::Complete, control)?;
        let completion = self
            .close_cycle(cycle_number, killed.len(), graduated.len(), mutated.len())
            .map_err(step(CyclePhase::Complete))?;

        let report = CycleReport {
            capital_allocated: allocation.allocated,
            ..completion
        };
        info!(
            cycle = report.cycle_number,
            allocated = %report.capital_allocated,
            agents_killed = report.agents_killed,
            agents_graduated = report.agents_graduated,
            agents_mutated = report.agents_mutated,
            sub_events = report.sub_events.len(),
            unallocated = %report.capital_snapshot.unallocated_capital,
            "Evolution cycle complete"
        );
        Ok(report)
    }

    /// Audit conservation, then append the closing event.
    fn close_cycle(
        &mut self,
        cycle_number: u64,
        killed: usize,
        graduated: usize,
        mutated: usize,
    ) -> Result<CycleReport, ArenaError> {
        let last = |arena: &Self| {
            arena
                .cycle_events
                .as_ref()
                .and_then(|ids| ids.last().copied())
        };

        let result = self.state().ledger().verify_conservation();
        let (conserved, discrepancy) = result.as_pair();
        let audit = CapitalConservationCheckDetails {
            snapshot: self.state().ledger().snapshot(),
            conserved,
            discrepancy,
        };
        let event = self
            .event(EventType::CapitalConservationCheck, None, &audit)?
            .caused_by(last(self));
        self.emit(event)?;
        if let ConservationResult::Anomaly(anomaly) = result {
            error!(
                cycle = cycle_number,
                discrepancy = %anomaly.discrepancy,
                leak = %anomaly.leak,
                "Capital conservation violated"
            );
            return Err(ArenaError::CapitalConservation { anomaly });
        }

        let sub_events = self.cycle_events.clone().unwrap_or_default();
        let capital_snapshot = self.state().ledger().snapshot();
        let details = EvolutionCycleCompleteDetails {
            cycle_number,
            agents_killed: count(killed),
            agents_graduated: count(graduated),
            agents_mutated: count(mutated),
            capital_snapshot,
            sub_events,
        };
        let event = self
            .event(EventType::EvolutionCycleComplete, None, &details)?
            .caused_by(last(self));
        let completion = self.emit(event)?;

        Ok(CycleReport {
            cycle_number,
            capital_allocated: Decimal::ZERO,
            agents_killed: details.agents_killed,
            agents_graduated: details.agents_graduated,
            agents_mutated: details.agents_mutated,
            capital_snapshot: details.capital_snapshot,
            sub_events: details.sub_events,
            completion_event: completion.event_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::ArenaConfig;

    /// Stops once `allowed` phases have been entered.
    struct StopAfter {
        allowed: usize,
        seen: AtomicUsize,
    }

    impl CycleControl for StopAfter {
        fn should_stop(&self) -> bool {
            self.seen.fetch_add(1, Ordering::SeqCst) >= self.allowed
        }
    }

    fn arena() -> Arena {
        let mut config = ArenaConfig::default();
        config.mutation.seed = Some(1);
        let Ok(mut arena) = Arena::new(config) else {
            panic!("default config is valid");
        };
        for _ in 0..4 {
            let _ = arena.spawn_agent("Tactical-Trader", None);
        }
        arena
    }

    #[test]
    fn completed_cycle_advances_index_and_returns_to_idle() {
        let mut arena = arena();
        let Ok(report) = arena.run_evolution_cycle() else {
            panic!("cycle failed");
        };
        assert_eq!(report.cycle_number, 1);
        assert_eq!(arena.cycle(), 2);
        assert_eq!(arena.phase(), CyclePhase::Idle);
        assert_eq!(report.agents_mutated, 3);
    }

    #[test]
    fn cancellation_lands_between_phases() {
        let mut arena = arena();
        let control = StopAfter {
            allowed: 2,
            seen: AtomicUsize::new(0),
        };
        let result = arena.run_evolution_cycle_with(&control);
        assert!(matches!(
            result,
            Err(CycleError::Cancelled {
                before: CyclePhase::Graduate
            })
        ));
        assert_eq!(arena.cycle(), 1);
        assert_eq!(arena.phase(), CyclePhase::Idle);
        assert!(arena.verify_conservation().0);
    }

    #[test]
    fn safe_run_reports_instead_of_failing() {
        let mut arena = arena();
        let control = StopAfter {
            allowed: 0,
            seen: AtomicUsize::new(0),
        };
        let outcome = arena.safe_run_evolution_with(&control);
        assert!(!outcome.success);
        assert!(outcome.report.is_none());
        assert!(outcome.error.is_some_and(|e| e.contains("ALLOCATE")));
    }
}
