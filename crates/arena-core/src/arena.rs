//! The Arena manager: one capital pool, one population, one event log.
//!
//! Every mutating operation follows the same path through [`Arena::emit`]:
//! validate the event against the current [`ArenaState`], append it to the
//! [`EventStore`], then apply it. Nothing reaches the log that the state
//! would refuse, and nothing changes the state without a stored event.
//!
//! Operations are synchronous and take `&mut self`, so one arena has a single
//! writer by construction. [`SharedArena`](crate::SharedArena) wraps an arena
//! in a lock for use from async tasks.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use arena_agents::{
    BuiltinTemplates, GraduationCheck, StrategyTemplates, check_graduation, check_kill,
    fitness_score, mutate_params, resolve_params,
};
use arena_events::{EventFilter, EventStore, EventStoreError, MemoryEventStore};
use arena_ledger::{ConservationResult, EntryStamp, LedgerError, floor_cents};
use arena_types::{
    Agent, AgentGraduatedDetails, AgentId, AgentKilledDetails, AgentMutatedDetails,
    AgentSpawnedDetails, CapitalAllocatedDetails, CapitalBreakdown, CyclePhase, Event, EventId,
    EventType, KillReason, NewEvent, Params, PerformanceRecordedDetails, PerformanceSnapshot,
};

use crate::config::ArenaConfig;
use crate::error::{ArenaError, ValidationError};
use crate::state::ArenaState;

/// What one call to [`Arena::allocate_capital`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationReport {
    /// One `CapitalAllocated` event per funded agent, in ranking order.
    pub events: Vec<Event>,
    /// Sum of the amounts moved by this call.
    pub allocated: Decimal,
    /// Agents whose top-up was clamped to the pool.
    pub clamped: usize,
    /// Agents the pool could not fund.
    pub starved: Vec<AgentId>,
}

/// The two events a mutation produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// The new child.
    pub child: Agent,
    /// `AgentSpawned` for the child.
    pub spawn_event: Event,
    /// `AgentMutated` linking child and parent.
    pub mutated_event: Event,
}

/// One row of the arena leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSummary {
    /// The agent.
    pub id: AgentId,
    /// Its strategy.
    pub strategy_name: String,
    /// Current fitness.
    pub fitness_score: f64,
    /// Periods evaluated.
    pub age: u32,
    /// Capital held.
    pub capital_allocated: Decimal,
    /// Mutation depth.
    pub generation: u32,
}

impl From<&Agent> for AgentSummary {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            strategy_name: agent.strategy_name.clone(),
            fitness_score: agent.fitness_score,
            age: agent.age,
            capital_allocated: agent.capital_allocated,
            generation: agent.generation,
        }
    }
}

/// How the configured total capital splits across tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapitalTiers {
    /// Total capital under management.
    pub total: Decimal,
    /// Stable reserve, outside the arena.
    pub stable_reserve: Decimal,
    /// The simulation-tier pool.
    pub arena: Decimal,
    /// The proving-tier allocation, outside the arena.
    pub proving: Decimal,
}

/// Arena-wide statistics for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArenaStats {
    /// Competing agents.
    pub active_agents: usize,
    /// Killed agents.
    pub killed_agents: usize,
    /// Graduated agents.
    pub graduated_agents: usize,
    /// All agents ever spawned.
    pub total_agents: usize,
    /// Cycle in progress.
    pub cycle: u64,
    /// Events in the log.
    pub total_events: usize,
    /// Ledger breakdown.
    pub capital: CapitalBreakdown,
    /// Configured tier split.
    pub tiers: CapitalTiers,
    /// The five fittest active agents.
    pub top_agents: Vec<AgentSummary>,
}

/// Number of agents listed in [`ArenaStats::top_agents`].
const TOP_AGENTS: usize = 5;

/// An arena instance.
///
/// Owns its capital pool, population, and event log. Running several
/// experiments means several independent instances.
pub struct Arena<S: EventStore = MemoryEventStore> {
    config: ArenaConfig,
    store: S,
    state: ArenaState,
    templates: Box<dyn StrategyTemplates>,
    rng: StdRng,
    /// Phase of the cycle in progress, `Idle` between cycles.
    pub(crate) phase: CyclePhase,
    /// Ids appended during the cycle in progress.
    pub(crate) cycle_events: Option<Vec<EventId>>,
}

impl<S: EventStore> core::fmt::Debug for Arena<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("cycle", &self.state.cycle())
            .field("phase", &self.phase)
            .field("events", &self.store.len())
            .field("agents", &self.state.registry().len())
            .finish_non_exhaustive()
    }
}

impl Arena<MemoryEventStore> {
    /// Create an arena with an in-memory event log.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Config`] if the configuration is invalid.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        Self::with_store(config, MemoryEventStore::new())
    }
}

impl<S: EventStore> Arena<S> {
    /// Create an arena over `store`, folding any events it already holds.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Config`] for an invalid configuration or
    /// [`ArenaError::Integrity`] if a stored event does not apply.
    pub fn with_store(config: ArenaConfig, store: S) -> Result<Self, ArenaError> {
        config.validate()?;
        let arena_capital = config.capital.arena_capital();
        let state = ArenaState::fold(arena_capital, store.replay(None).iter())?;
        let rng = config
            .mutation
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

        info!(
            arena_capital = %arena_capital,
            cycle = state.cycle(),
            events = store.len(),
            agents = state.registry().len(),
            "Arena opened"
        );

        Ok(Self {
            config,
            store,
            state,
            templates: Box::new(BuiltinTemplates),
            rng,
            phase: CyclePhase::Idle,
            cycle_events: None,
        })
    }

    /// Replace the strategy template provider.
    #[must_use]
    pub fn with_templates(mut self, templates: impl StrategyTemplates + 'static) -> Self {
        self.templates = Box::new(templates);
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The arena configuration.
    pub const fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// The derived state.
    pub const fn state(&self) -> &ArenaState {
        &self.state
    }

    /// The event log.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Cycle in progress.
    pub const fn cycle(&self) -> u64 {
        self.state.cycle()
    }

    /// Current phase of the evolution cycle.
    pub const fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Look up an agent.
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.state.registry().get(id)
    }

    /// Active agents ranked by fitness, best first.
    pub fn ranked_agents(&self) -> Vec<&Agent> {
        self.state.registry().ranked()
    }

    /// Capital the simulation tier was opened with.
    pub const fn arena_capital(&self) -> Decimal {
        self.state.ledger().initial_capital()
    }

    /// Strategy names the template provider can spawn.
    pub fn strategies(&self) -> Vec<String> {
        self.templates.strategies()
    }

    // -----------------------------------------------------------------------
    // Event path
    // -----------------------------------------------------------------------

    /// Validate, append, and apply one event.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Validation`] if the event is refused; nothing is
    /// appended in that case.
    pub(crate) fn emit(&mut self, event: NewEvent) -> Result<Event, ArenaError> {
        if let Some(cause) = event.caused_by
            && !self.store.contains(cause)
        {
            return Err(ValidationError::Causality(EventStoreError::UnknownCause {
                caused_by: cause,
            })
            .into());
        }
        let transition = self.state.check(&event)?;
        let stored = self.store.append(event)?;
        let stamp = EntryStamp {
            event_id: stored.event_id,
            at: stored.timestamp,
        };
        self.state
            .commit(transition, stamp)
            .map_err(|source| ArenaError::Integrity {
                event_id: stored.event_id,
                source,
            })?;
        if let Some(ids) = self.cycle_events.as_mut() {
            ids.push(stored.event_id);
        }
        trace!(
            event_id = %stored.event_id,
            event_type = %stored.event_type,
            sequence = stored.sequence,
            "Event applied"
        );
        Ok(stored)
    }

    pub(crate) fn event<T: Serialize>(
        &self,
        event_type: EventType,
        agent_id: Option<AgentId>,
        details: &T,
    ) -> Result<NewEvent, ArenaError> {
        Ok(NewEvent::new(event_type, agent_id, self.state.cycle(), details)?)
    }

    // -----------------------------------------------------------------------
    // Population
    // -----------------------------------------------------------------------

    /// Spawn a fresh agent running `strategy_name`.
    ///
    /// `params` are merged over the strategy's template defaults. The agent
    /// starts with zero capital, zero fitness, and age 0.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Validation`] for an unknown strategy.
    pub fn spawn_agent(
        &mut self,
        strategy_name: &str,
        params: Option<Params>,
    ) -> Result<Agent, ArenaError> {
        let params = resolve_params(self.templates.as_ref(), strategy_name, params)?;
        let agent_id = AgentId::new();
        let details = AgentSpawnedDetails {
            strategy_name: strategy_name.to_owned(),
            params,
            parent_id: None,
            generation: 0,
        };
        let event = self.event(EventType::AgentSpawned, Some(agent_id), &details)?;
        self.emit(event)?;
        info!(agent_id = %agent_id, strategy = strategy_name, "Agent spawned");
        Ok(self.state.registry().require(agent_id)?.clone())
    }

    /// Record one evaluation period for an active agent.
    ///
    /// When `fitness` is `None` it is computed from the agent's history
    /// including this period.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Validation`] for an unknown or inactive agent or
    /// non-finite values.
    pub fn record_performance(
        &mut self,
        agent_id: AgentId,
        pnl: f64,
        capital: f64,
        fitness: Option<f64>,
    ) -> Result<Event, ArenaError> {
        let agent = self.state.registry().require_active(agent_id)?;
        let snapshot = PerformanceSnapshot { pnl, capital };
        let score = fitness.unwrap_or_else(|| {
            let mut history = agent.performance_history.clone();
            history.push(snapshot);
            fitness_score(&history)
        });
        let details = PerformanceRecordedDetails {
            pnl,
            capital,
            fitness_score: score,
        };
        let event = self.event(EventType::PerformanceRecorded, Some(agent_id), &details)?;
        let stored = self.emit(event)?;
        debug!(agent_id = %agent_id, pnl, fitness = score, "Performance recorded");
        Ok(stored)
    }

    // -----------------------------------------------------------------------
    // Capital
    // -----------------------------------------------------------------------

    /// Top active agents up toward an equal ticket, best-ranked first.
    ///
    /// The ticket is the managed pool divided by the number of active
    /// agents, clamped to the configured bounds and rounded down to cents.
    /// Top-ups are funded only from unallocated capital, so one call can
    /// never move more than the pool holds. Once the pool cannot fund a
    /// meaningful top-up, the remaining agents receive nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Allocation`] when a top-up exceeds the pool and
    /// clamping is disabled. Allocations made before the failure stay.
    pub fn allocate_capital(&mut self) -> Result<AllocationReport, ArenaError> {
        let ranked: Vec<(AgentId, Decimal)> = self
            .state
            .registry()
            .ranked()
            .iter()
            .map(|a| (a.id, a.capital_allocated))
            .collect();
        let mut report = AllocationReport::default();
        if ranked.is_empty() {
            return Ok(report);
        }

        let policy = self.config.allocation.clone();
        let pool = self.state.ledger().total_capital();
        let share = pool
            .checked_div(Decimal::from(ranked.len()))
            .unwrap_or(Decimal::ZERO);
        let ticket = floor_cents(share.clamp(policy.min_allocation, policy.max_allocation_per_agent));

        for (agent_id, held) in ranked {
            let overflow = || ValidationError::Ledger(LedgerError::Overflow { agent_id });
            let requested = ticket.checked_sub(held).ok_or_else(overflow)?;
            if requested <= Decimal::ZERO {
                continue;
            }
            let available = self.state.ledger().unallocated();
            let amount = requested.min(available);
            let clamped = amount < requested;
            if clamped && !policy.lenient {
                return Err(ArenaError::Allocation {
                    requested,
                    available,
                });
            }
            if amount < policy.min_allocation.min(requested) || amount <= Decimal::ZERO {
                report.starved.push(agent_id);
                continue;
            }
            if clamped {
                warn!(
                    agent_id = %agent_id,
                    requested = %requested,
                    amount = %amount,
                    "Allocation clamped to available capital"
                );
                report.clamped = report.clamped.saturating_add(1);
            }

            let total_allocated = self
                .state
                .ledger()
                .allocated()
                .checked_add(amount)
                .ok_or_else(overflow)?;
            let allocated = report.allocated.checked_add(amount).ok_or_else(overflow)?;
            let details = CapitalAllocatedDetails {
                amount,
                requested,
                clamped,
                total_allocated,
                arena_capital: pool,
            };
            let event = self.event(EventType::CapitalAllocated, Some(agent_id), &details)?;
            report.events.push(self.emit(event)?);
            report.allocated = allocated;
        }

        if !report.starved.is_empty() {
            warn!(
                starved = report.starved.len(),
                unallocated = %self.state.ledger().unallocated(),
                "Pool exhausted before every agent was funded"
            );
        }
        info!(
            ticket = %ticket,
            funded = report.events.len(),
            allocated = %report.allocated,
            unallocated = %self.state.ledger().unallocated(),
            "Capital allocated"
        );
        Ok(report)
    }

    /// Conservation result as `(ok, discrepancy)`.
    pub fn verify_conservation(&self) -> (bool, Decimal) {
        self.state.ledger().verify_conservation().as_pair()
    }

    /// Verify conservation, failing loudly on any anomaly.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::CapitalConservation`] with the anomaly.
    pub fn check_conservation(&self) -> Result<Decimal, ArenaError> {
        match self.state.ledger().verify_conservation() {
            ConservationResult::Balanced { discrepancy } => Ok(discrepancy),
            ConservationResult::Anomaly(anomaly) => {
                Err(ArenaError::CapitalConservation { anomaly })
            }
        }
    }

    /// Ledger totals and per-agent allocations.
    pub fn get_breakdown(&self) -> CapitalBreakdown {
        self.state.ledger().breakdown()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Kill every active agent that meets a kill condition.
    ///
    /// Each kill releases the agent's capital to the pool and links to the
    /// agent's latest performance record.
    ///
    /// # Errors
    ///
    /// Returns the first error from appending a kill; earlier kills stay.
    pub fn kill_underperformers(&mut self) -> Result<Vec<Event>, ArenaError> {
        let doomed: Vec<(AgentId, KillReason, f64)> = self
            .state
            .registry()
            .active()
            .filter_map(|a| {
                check_kill(a, &self.config.lifecycle).map(|reason| (a.id, reason, a.fitness_score))
            })
            .collect();

        let mut events = Vec::with_capacity(doomed.len());
        for (agent_id, reason, final_fitness) in doomed {
            let details = AgentKilledDetails {
                reason,
                final_fitness,
                final_capital: self.state.ledger().allocation(agent_id),
            };
            let event = self
                .event(EventType::AgentKilled, Some(agent_id), &details)?
                .caused_by(self.state.last_performance(agent_id));
            events.push(self.emit(event)?);
            info!(
                agent_id = %agent_id,
                %reason,
                final_fitness,
                released = %details.final_capital,
                "Agent killed"
            );
        }
        Ok(events)
    }

    /// Graduate one agent out of the simulation tier.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Validation`] if the agent is unknown, inactive,
    /// or fails the graduation policy.
    pub fn graduate_to_proving(&mut self, agent_id: AgentId) -> Result<Event, ArenaError> {
        let agent = self.state.registry().require_active(agent_id)?;
        if let GraduationCheck::Ineligible(reason) =
            check_graduation(agent, &self.config.lifecycle)
        {
            return Err(ValidationError::Policy(format!(
                "agent {agent_id} cannot graduate: {reason}"
            ))
            .into());
        }
        let details = AgentGraduatedDetails {
            fitness_score: agent.fitness_score,
            age: agent.age,
            performance_history_snapshot: agent.performance_history.clone(),
            capital: self.state.ledger().allocation(agent_id),
            disposition: self.config.capital.graduation_disposition,
        };
        let event = self
            .event(EventType::AgentGraduated, Some(agent_id), &details)?
            .caused_by(self.state.last_performance(agent_id));
        let stored = self.emit(event)?;
        info!(
            agent_id = %agent_id,
            fitness = details.fitness_score,
            age = details.age,
            capital = %details.capital,
            disposition = ?details.disposition,
            "Agent graduated to proving"
        );
        Ok(stored)
    }

    /// Graduate every eligible active agent.
    ///
    /// # Errors
    ///
    /// Returns the first graduation error; earlier graduations stay.
    pub fn graduate_eligible(&mut self) -> Result<Vec<Event>, ArenaError> {
        let eligible: Vec<AgentId> = self
            .state
            .registry()
            .active()
            .filter(|a| check_graduation(a, &self.config.lifecycle).is_eligible())
            .map(|a| a.id)
            .collect();
        eligible
            .into_iter()
            .map(|id| self.graduate_to_proving(id))
            .collect()
    }

    /// Spawn a child of `parent_id` with perturbed parameters.
    ///
    /// Appends `AgentSpawned` for the child, then `AgentMutated`; both link
    /// to the parent's spawn event. The child starts with zero capital.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Validation`] if the parent is unknown or
    /// inactive, or the population is at its cap.
    pub fn mutate_agent(&mut self, parent_id: AgentId) -> Result<Mutation, ArenaError> {
        let (strategy_name, parent_params, generation, parent_spawn) = {
            let parent = self.state.registry().require_active(parent_id)?;
            (
                parent.strategy_name.clone(),
                parent.params.clone(),
                parent.generation,
                parent.spawn_event_id,
            )
        };
        let active = self.state.registry().active_count();
        if active >= self.config.lifecycle.max_population {
            return Err(ValidationError::Policy(format!(
                "population cap {} reached",
                self.config.lifecycle.max_population
            ))
            .into());
        }

        let (params, mutation_delta) =
            mutate_params(&parent_params, self.config.mutation.range, &mut self.rng)?;
        let child_id = AgentId::new();

        let spawned = AgentSpawnedDetails {
            strategy_name,
            params,
            parent_id: Some(parent_id),
            generation: generation.saturating_add(1),
        };
        let event = self
            .event(EventType::AgentSpawned, Some(child_id), &spawned)?
            .caused_by(Some(parent_spawn));
        let spawn_event = self.emit(event)?;

        let mutated = AgentMutatedDetails {
            child_id,
            parent_id,
            mutation_delta,
        };
        let event = self
            .event(EventType::AgentMutated, Some(child_id), &mutated)?
            .caused_by(Some(parent_spawn));
        let mutated_event = self.emit(event)?;

        info!(
            child_id = %child_id,
            parent_id = %parent_id,
            generation = spawned.generation,
            changed = mutated.mutation_delta.len(),
            "Agent mutated"
        );
        Ok(Mutation {
            child: self.state.registry().require(child_id)?.clone(),
            spawn_event,
            mutated_event,
        })
    }

    /// Mutate the top `mutation.top_n` ranked agents, stopping at the
    /// population cap.
    ///
    /// # Errors
    ///
    /// Returns the first mutation error; earlier children stay.
    pub fn mutate_top_performers(&mut self) -> Result<Vec<Mutation>, ArenaError> {
        let parents: Vec<AgentId> = self
            .state
            .registry()
            .ranked()
            .iter()
            .take(self.config.mutation.top_n)
            .map(|a| a.id)
            .collect();

        let mut children = Vec::with_capacity(parents.len());
        for parent_id in parents {
            if self.state.registry().active_count() >= self.config.lifecycle.max_population {
                info!(
                    max_population = self.config.lifecycle.max_population,
                    "Population cap reached, skipping further mutation"
                );
                break;
            }
            children.push(self.mutate_agent(parent_id)?);
        }
        Ok(children)
    }

    // -----------------------------------------------------------------------
    // Log access
    // -----------------------------------------------------------------------

    /// Stored events matching `filter`, in append order.
    pub fn query(&self, filter: &EventFilter) -> Vec<Event> {
        self.store.query(filter)
    }

    /// Every event, or only those about `agent_id`, in append order.
    pub fn replay(&self, agent_id: Option<AgentId>) -> Vec<Event> {
        self.store.replay(agent_id)
    }

    /// Fold the whole log from genesis.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Integrity`] if a stored event does not apply.
    pub fn replay_state(&self) -> Result<ArenaState, ArenaError> {
        ArenaState::fold(self.arena_capital(), self.store.replay(None).iter())
    }

    /// Whether folding the log reproduces the live state exactly.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Integrity`] if a stored event does not apply.
    pub fn verify_replay(&self) -> Result<bool, ArenaError> {
        Ok(self.replay_state()? == self.state)
    }

    /// Counts, capital, and the leaderboard.
    pub fn get_arena_stats(&self) -> ArenaStats {
        let registry = self.state.registry();
        let counts = registry.counts();
        let capital = &self.config.capital;
        ArenaStats {
            active_agents: counts.active,
            killed_agents: counts.killed,
            graduated_agents: counts.graduated,
            total_agents: counts.total(),
            cycle: self.state.cycle(),
            total_events: self.store.len(),
            capital: self.get_breakdown(),
            tiers: CapitalTiers {
                total: capital.total_capital,
                stable_reserve: capital.stable_reserve(),
                arena: self.arena_capital(),
                proving: capital.proving_capital(),
            },
            top_agents: registry
                .ranked()
                .into_iter()
                .take(TOP_AGENTS)
                .map(AgentSummary::from)
                .collect(),
        }
    }
}
