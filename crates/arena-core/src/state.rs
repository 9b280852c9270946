//! The arena reducer: capital ledger plus population registry.
//!
//! [`ArenaState`] is the aggregate that every event is folded into. The live
//! arena and replay share the same two-step path:
//!
//! 1. [`ArenaState::check`] validates a pending event against the current
//!    state and turns it into a [`Transition`] without changing anything.
//! 2. [`ArenaState::commit`] applies the transition.
//!
//! Replay goes through [`ArenaState::apply`], which runs the same two steps
//! on an already stored event.
//!
//! The arena appends the event to its log between the two steps, so a
//! rejected event is never stored and a stored event is always applied.
//! Policy (who should be killed, who may graduate) lives in the arena; the
//! reducer only checks that an event is consistent with the state.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use arena_agents::PopulationRegistry;
use arena_ledger::{CapitalLedger, EntryStamp, LedgerError};
use arena_types::{
    AgentGraduatedDetails, AgentId, AgentKilledDetails, AgentMutatedDetails, AgentSpawnedDetails,
    AgentStatus, CapitalAllocatedDetails, CapitalConservationCheckDetails, CapitalDisposition,
    Event, EventId, EventType, EvolutionCycleCompleteDetails, NewEvent, PerformanceRecordedDetails,
    PerformanceSnapshot,
};

use crate::error::{ArenaError, ValidationError};

/// A validated state change, ready to commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Register a new agent.
    Spawn {
        /// The new agent.
        agent_id: AgentId,
        /// Its strategy, parameters, and lineage.
        details: AgentSpawnedDetails,
    },
    /// Move capital from the pool to an agent.
    Allocate {
        /// The receiving agent.
        agent_id: AgentId,
        /// Amount moved.
        amount: Decimal,
    },
    /// Kill an agent and release its capital.
    Kill {
        /// The agent.
        agent_id: AgentId,
    },
    /// Graduate an agent out of the simulation tier.
    Graduate {
        /// The agent.
        agent_id: AgentId,
        /// Where its capital goes.
        disposition: CapitalDisposition,
    },
    /// Append one evaluation period.
    Performance {
        /// The agent.
        agent_id: AgentId,
        /// The period's P&L and capital.
        snapshot: PerformanceSnapshot,
        /// Fitness after the period.
        fitness: f64,
    },
    /// Close the current cycle.
    CycleComplete,
    /// A record-only event (mutation lineage, conservation audit).
    Record,
}

/// Everything derived from the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct ArenaState {
    ledger: CapitalLedger,
    registry: PopulationRegistry,
    cycle: u64,
    last_performance: BTreeMap<AgentId, EventId>,
}

impl ArenaState {
    /// Fresh state: an unallocated pool of `arena_capital`, no agents, cycle 1.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NegativeCapital`] for a negative pool.
    pub fn genesis(arena_capital: Decimal) -> Result<Self, LedgerError> {
        Ok(Self {
            ledger: CapitalLedger::new(arena_capital)?,
            registry: PopulationRegistry::new(),
            cycle: 1,
            last_performance: BTreeMap::new(),
        })
    }

    /// Rebuild state by folding `events`, in order, from genesis.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Integrity`] naming the first event that does not
    /// apply.
    pub fn fold<'a>(
        arena_capital: Decimal,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> Result<Self, ArenaError> {
        let mut state = Self::genesis(arena_capital).map_err(ValidationError::from)?;
        for event in events {
            state.apply(event).map_err(|source| ArenaError::Integrity {
                event_id: event.event_id,
                source,
            })?;
        }
        Ok(state)
    }

    /// The capital ledger.
    pub const fn ledger(&self) -> &CapitalLedger {
        &self.ledger
    }

    /// The population registry.
    pub const fn registry(&self) -> &PopulationRegistry {
        &self.registry
    }

    /// Index of the cycle in progress (starts at 1).
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The most recent `PerformanceRecorded` event for an agent.
    pub fn last_performance(&self, agent_id: AgentId) -> Option<EventId> {
        self.last_performance.get(&agent_id).copied()
    }

    /// Whether every active agent's capital matches its ledger balance and
    /// every ledger balance belongs to an active agent.
    pub fn registry_matches_ledger(&self) -> bool {
        let agents_match = self
            .registry
            .iter()
            .all(|a| a.capital_allocated == self.ledger.allocation(a.id));
        let balances_owned = self.ledger.allocations().keys().all(|id| {
            self.registry
                .get(*id)
                .is_some_and(|a| a.status.is_active())
        });
        agents_match && balances_owned
    }

    /// Validate a pending event without changing anything.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn check(&self, event: &NewEvent) -> Result<Transition, ValidationError> {
        self.plan(event.event_type, event.agent_id, event.cycle, &event.data)
    }

    /// Validate and apply a stored event.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found; the state is unchanged
    /// unless the failure came from the commit step.
    pub fn apply(&mut self, event: &Event) -> Result<(), ValidationError> {
        let transition = self.plan(event.event_type, event.agent_id, event.cycle, &event.data)?;
        self.commit(
            transition,
            EntryStamp {
                event_id: event.event_id,
                at: event.timestamp,
            },
        )
    }

    /// Validate an event's fields against the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] describing the first inconsistency.
    pub fn plan(
        &self,
        event_type: EventType,
        agent_id: Option<AgentId>,
        cycle: u64,
        data: &serde_json::Value,
    ) -> Result<Transition, ValidationError> {
        if cycle != self.cycle {
            return Err(ValidationError::CycleMismatch {
                expected: self.cycle,
                found: cycle,
            });
        }
        let agent = || agent_id.ok_or(ValidationError::MissingAgent(event_type));

        match event_type {
            EventType::AgentSpawned => {
                let agent_id = agent()?;
                let details: AgentSpawnedDetails = decode(event_type, data)?;
                self.registry.check_spawn(agent_id)?;
                if let Some(parent_id) = details.parent_id {
                    let parent = self.registry.require(parent_id)?;
                    if details.generation != parent.generation.saturating_add(1) {
                        return Err(ValidationError::Policy(format!(
                            "child generation {} does not follow parent generation {}",
                            details.generation, parent.generation
                        )));
                    }
                }
                Ok(Transition::Spawn { agent_id, details })
            }
            EventType::CapitalAllocated => {
                let agent_id = agent()?;
                let details: CapitalAllocatedDetails = decode(event_type, data)?;
                self.registry.require_active(agent_id)?;
                self.ledger.check_allocate(details.amount)?;
                if details.amount > details.requested
                    || details.clamped != (details.amount < details.requested)
                {
                    return Err(ValidationError::Policy(format!(
                        "allocation of {} against request {} has clamped={}",
                        details.amount, details.requested, details.clamped
                    )));
                }
                let expected_total = self
                    .ledger
                    .allocated()
                    .checked_add(details.amount)
                    .ok_or(LedgerError::Overflow { agent_id })?;
                if details.total_allocated != expected_total {
                    return Err(ValidationError::Policy(format!(
                        "total_allocated {} does not match ledger total {expected_total}",
                        details.total_allocated
                    )));
                }
                Ok(Transition::Allocate {
                    agent_id,
                    amount: details.amount,
                })
            }
            EventType::AgentKilled => {
                let agent_id = agent()?;
                let details: AgentKilledDetails = decode(event_type, data)?;
                self.registry.require_active(agent_id)?;
                self.check_balance(agent_id, details.final_capital)?;
                Ok(Transition::Kill { agent_id })
            }
            EventType::AgentGraduated => {
                let agent_id = agent()?;
                let details: AgentGraduatedDetails = decode(event_type, data)?;
                self.registry.require_active(agent_id)?;
                self.check_balance(agent_id, details.capital)?;
                Ok(Transition::Graduate {
                    agent_id,
                    disposition: details.disposition,
                })
            }
            EventType::AgentMutated => {
                let agent_id = agent()?;
                let details: AgentMutatedDetails = decode(event_type, data)?;
                if agent_id != details.child_id {
                    return Err(ValidationError::Policy(format!(
                        "mutation event filed under {agent_id} names child {}",
                        details.child_id
                    )));
                }
                let child = self.registry.require(details.child_id)?;
                self.registry.require(details.parent_id)?;
                if child.parent_id != Some(details.parent_id) {
                    return Err(ValidationError::Policy(format!(
                        "agent {} is not a child of {}",
                        details.child_id, details.parent_id
                    )));
                }
                Ok(Transition::Record)
            }
            EventType::PerformanceRecorded => {
                let agent_id = agent()?;
                let details: PerformanceRecordedDetails = decode(event_type, data)?;
                let snapshot = PerformanceSnapshot {
                    pnl: details.pnl,
                    capital: details.capital,
                };
                PopulationRegistry::check_performance(snapshot, details.fitness_score)?;
                self.registry.require_active(agent_id)?;
                Ok(Transition::Performance {
                    agent_id,
                    snapshot,
                    fitness: details.fitness_score,
                })
            }
            EventType::CapitalConservationCheck => {
                let _: CapitalConservationCheckDetails = decode(event_type, data)?;
                Ok(Transition::Record)
            }
            EventType::EvolutionCycleComplete => {
                let details: EvolutionCycleCompleteDetails = decode(event_type, data)?;
                if details.cycle_number != self.cycle {
                    return Err(ValidationError::CycleMismatch {
                        expected: self.cycle,
                        found: details.cycle_number,
                    });
                }
                Ok(Transition::CycleComplete)
            }
        }
    }

    /// Apply a planned transition.
    ///
    /// # Errors
    ///
    /// Only fails if the state changed since the transition was planned.
    pub fn commit(&mut self, transition: Transition, stamp: EntryStamp) -> Result<(), ValidationError> {
        match transition {
            Transition::Spawn { agent_id, details } => {
                self.registry.spawn(agent_id, stamp.event_id, &details)?;
            }
            Transition::Allocate { agent_id, amount } => {
                self.registry.require_active(agent_id)?;
                self.ledger.allocate(agent_id, amount, stamp)?;
                self.registry
                    .set_capital(agent_id, self.ledger.allocation(agent_id))?;
            }
            Transition::Kill { agent_id } => {
                self.registry.require_active(agent_id)?;
                self.ledger.release(agent_id, stamp)?;
                self.registry.retire(agent_id, AgentStatus::Killed)?;
                self.last_performance.remove(&agent_id);
            }
            Transition::Graduate {
                agent_id,
                disposition,
            } => {
                self.registry.require_active(agent_id)?;
                match disposition {
                    CapitalDisposition::TransferredOut => {
                        self.ledger.transfer_out(agent_id, stamp)?;
                    }
                    CapitalDisposition::Released => {
                        self.ledger.release(agent_id, stamp)?;
                    }
                }
                self.registry.retire(agent_id, AgentStatus::Graduated)?;
                self.last_performance.remove(&agent_id);
            }
            Transition::Performance {
                agent_id,
                snapshot,
                fitness,
            } => {
                self.registry
                    .record_performance(agent_id, snapshot, fitness)?;
                self.last_performance.insert(agent_id, stamp.event_id);
            }
            Transition::CycleComplete => {
                self.cycle = self.cycle.saturating_add(1);
            }
            Transition::Record => {}
        }
        Ok(())
    }

    fn check_balance(&self, agent_id: AgentId, claimed: Decimal) -> Result<(), ValidationError> {
        let held = self.ledger.allocation(agent_id);
        if claimed == held {
            Ok(())
        } else {
            Err(ValidationError::Policy(format!(
                "event claims {claimed} for agent {agent_id} but the ledger holds {held}"
            )))
        }
    }
}

fn decode<T: DeserializeOwned>(
    event_type: EventType,
    data: &serde_json::Value,
) -> Result<T, ValidationError> {
    T::deserialize(data).map_err(|source| ValidationError::Payload { event_type, source })
}
