//! The population registry: every agent record of one arena.
//!
//! The [`PopulationRegistry`] owns [`Agent`] records keyed by id. Killed and
//! graduated agents stay in the registry with their final status so that
//! history queries and replay comparisons see the whole population.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use arena_types::{
    Agent, AgentId, AgentSpawnedDetails, AgentStatus, EventId, PerformanceSnapshot,
};

use crate::error::AgentError;

/// Agent counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulationCounts {
    /// Competing agents.
    pub active: usize,
    /// Killed agents.
    pub killed: usize,
    /// Graduated agents.
    pub graduated: usize,
}

impl PopulationCounts {
    /// All agents ever registered.
    pub const fn total(&self) -> usize {
        self.active
            .saturating_add(self.killed)
            .saturating_add(self.graduated)
    }
}

/// Tracks each agent's lifecycle state and performance history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationRegistry {
    /// All agents, active or not.
    agents: BTreeMap<AgentId, Agent>,
    /// Spawn order assigned to the next agent.
    next_spawn_order: u64,
}

impl PopulationRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
            next_spawn_order: 0,
        }
    }

    /// Number of agents ever registered.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent was ever registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Look up an agent by id.
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// Look up an agent that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::AgentNotFound`].
    pub fn require(&self, id: AgentId) -> Result<&Agent, AgentError> {
        self.agents.get(&id).ok_or(AgentError::AgentNotFound(id))
    }

    /// Look up an agent that must exist and be active.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::AgentNotFound`] or [`AgentError::NotActive`].
    pub fn require_active(&self, id: AgentId) -> Result<&Agent, AgentError> {
        let agent = self.require(id)?;
        if !agent.status.is_active() {
            return Err(AgentError::NotActive {
                agent_id: id,
                status: agent.status,
            });
        }
        Ok(agent)
    }

    /// Every agent, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Active agents, ordered by id.
    pub fn active(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values().filter(|a| a.status.is_active())
    }

    /// Number of active agents.
    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Active agents ranked by fitness, best first; ties go to the earlier spawn.
    pub fn ranked(&self) -> Vec<&Agent> {
        let mut ranked: Vec<&Agent> = self.active().collect();
        ranked.sort_by(|a, b| {
            b.fitness_score
                .total_cmp(&a.fitness_score)
                .then(a.spawn_order.cmp(&b.spawn_order))
        });
        ranked
    }

    /// Counts by status.
    pub fn counts(&self) -> PopulationCounts {
        self.agents
            .values()
            .fold(PopulationCounts::default(), |mut c, a| {
                match a.status {
                    AgentStatus::Active => c.active = c.active.saturating_add(1),
                    AgentStatus::Killed => c.killed = c.killed.saturating_add(1),
                    AgentStatus::Graduated => c.graduated = c.graduated.saturating_add(1),
                }
                c
            })
    }

    /// Check that `id` is free.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::DuplicateAgent`].
    pub fn check_spawn(&self, id: AgentId) -> Result<(), AgentError> {
        if self.agents.contains_key(&id) {
            return Err(AgentError::DuplicateAgent(id));
        }
        Ok(())
    }

    /// Register a new agent with zero capital, zero fitness, and age 0.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::DuplicateAgent`] if `id` is taken.
    pub fn spawn(
        &mut self,
        id: AgentId,
        spawn_event_id: EventId,
        details: &AgentSpawnedDetails,
    ) -> Result<&Agent, AgentError> {
        self.check_spawn(id)?;
        let agent = Agent {
            id,
            strategy_name: details.strategy_name.clone(),
            params: details.params.clone(),
            fitness_score: 0.0,
            age: 0,
            days_negative: 0,
            performance_history: Vec::new(),
            capital_allocated: Decimal::ZERO,
            status: AgentStatus::Active,
            parent_id: details.parent_id,
            generation: details.generation,
            spawn_event_id,
            spawn_order: self.next_spawn_order,
        };
        self.next_spawn_order = self.next_spawn_order.saturating_add(1);
        Ok(self.agents.entry(id).or_insert(agent))
    }

    /// Set an active agent's allocated capital.
    ///
    /// # Errors
    ///
    /// Fails if the agent is missing or inactive.
    pub fn set_capital(&mut self, id: AgentId, amount: Decimal) -> Result<(), AgentError> {
        self.require_active(id)?;
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.capital_allocated = amount;
        }
        Ok(())
    }

    /// Validate a performance record before applying it.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidPerformance`] for non-finite values or
    /// negative capital.
    pub fn check_performance(
        snapshot: PerformanceSnapshot,
        fitness: f64,
    ) -> Result<(), AgentError> {
        if !snapshot.pnl.is_finite() || !snapshot.capital.is_finite() || !fitness.is_finite() {
            return Err(AgentError::InvalidPerformance {
                reason: "values must be finite".to_owned(),
            });
        }
        if snapshot.capital < 0.0 {
            return Err(AgentError::InvalidPerformance {
                reason: format!("capital cannot be negative: {}", snapshot.capital),
            });
        }
        Ok(())
    }

    /// Append one evaluation period to an active agent.
    ///
    /// Age grows by one; the negative streak grows on a loss and resets
    /// otherwise; fitness is replaced.
    ///
    /// # Errors
    ///
    /// Fails if the agent is missing or inactive, or the record is invalid.
    pub fn record_performance(
        &mut self,
        id: AgentId,
        snapshot: PerformanceSnapshot,
        fitness: f64,
    ) -> Result<&Agent, AgentError> {
        Self::check_performance(snapshot, fitness)?;
        self.require_active(id)?;
        let agent = self
            .agents
            .get_mut(&id)
            .ok_or(AgentError::AgentNotFound(id))?;
        agent.performance_history.push(snapshot);
        agent.age = agent.age.saturating_add(1);
        agent.days_negative = if snapshot.pnl < 0.0 {
            agent.days_negative.saturating_add(1)
        } else {
            0
        };
        agent.fitness_score = fitness;
        Ok(&*agent)
    }

    /// Move an active agent to a terminal status, zeroing its capital.
    ///
    /// # Errors
    ///
    /// Fails if the agent is missing or already inactive.
    pub fn retire(&mut self, id: AgentId, status: AgentStatus) -> Result<&Agent, AgentError> {
        self.require_active(id)?;
        let agent = self
            .agents
            .get_mut(&id)
            .ok_or(AgentError::AgentNotFound(id))?;
        agent.status = status;
        agent.capital_allocated = Decimal::ZERO;
        tracing::debug!(agent_id = %id, ?status, "Agent left the active population");
        Ok(&*agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> AgentSpawnedDetails {
        AgentSpawnedDetails {
            strategy_name: "DeFi-Yield-Farmer".to_owned(),
            params: arena_types::Params::new(),
            parent_id: None,
            generation: 0,
        }
    }

    fn spawn(reg: &mut PopulationRegistry) -> AgentId {
        let id = AgentId::new();
        let _ = reg.spawn(id, EventId::new(), &details());
        id
    }

    #[test]
    fn spawn_starts_empty_and_active() {
        let mut reg = PopulationRegistry::new();
        let id = spawn(&mut reg);
        let Some(agent) = reg.get(id) else {
            panic!("agent missing");
        };
        assert_eq!(agent.capital_allocated, Decimal::ZERO);
        assert_eq!(agent.age, 0);
        assert!(agent.fitness_score.abs() < f64::EPSILON);
        assert!(agent.status.is_active());
    }

    #[test]
    fn duplicate_spawn_is_rejected() {
        let mut reg = PopulationRegistry::new();
        let id = spawn(&mut reg);
        assert!(matches!(
            reg.spawn(id, EventId::new(), &details()),
            Err(AgentError::DuplicateAgent(_))
        ));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn performance_updates_streak_and_age() {
        let mut reg = PopulationRegistry::new();
        let id = spawn(&mut reg);
        let loss = PerformanceSnapshot {
            pnl: -5.0,
            capital: 95.0,
        };
        let gain = PerformanceSnapshot {
            pnl: 5.0,
            capital: 100.0,
        };
        let _ = reg.record_performance(id, loss, -0.1);
        let _ = reg.record_performance(id, loss, -0.2);
        assert_eq!(reg.get(id).map(|a| a.days_negative), Some(2));
        let _ = reg.record_performance(id, gain, 0.1);
        let agent = reg.get(id);
        assert_eq!(agent.map(|a| a.days_negative), Some(0));
        assert_eq!(agent.map(|a| a.age), Some(3));
        assert_eq!(agent.map(|a| a.performance_history.len()), Some(3));
    }

    #[test]
    fn invalid_performance_is_rejected() {
        let mut reg = PopulationRegistry::new();
        let id = spawn(&mut reg);
        let bad = PerformanceSnapshot {
            pnl: f64::NAN,
            capital: 1.0,
        };
        assert!(reg.record_performance(id, bad, 0.0).is_err());
        assert_eq!(reg.get(id).map(|a| a.age), Some(0));
    }

    #[test]
    fn ranking_breaks_ties_by_spawn_order() {
        let mut reg = PopulationRegistry::new();
        let first = spawn(&mut reg);
        let second = spawn(&mut reg);
        let best = spawn(&mut reg);
        let snap = PerformanceSnapshot {
            pnl: 1.0,
            capital: 10.0,
        };
        let _ = reg.record_performance(best, snap, 1.0);
        let ranked: Vec<AgentId> = reg.ranked().iter().map(|a| a.id).collect();
        assert_eq!(ranked, vec![best, first, second]);
    }

    #[test]
    fn retired_agents_leave_the_active_set() {
        let mut reg = PopulationRegistry::new();
        let a = spawn(&mut reg);
        let b = spawn(&mut reg);
        let _ = reg.set_capital(a, Decimal::new(100, 0));
        let _ = reg.retire(a, AgentStatus::Killed);
        let _ = reg.retire(b, AgentStatus::Graduated);
        assert_eq!(reg.active_count(), 0);
        assert_eq!(reg.get(a).map(|x| x.capital_allocated), Some(Decimal::ZERO));
        assert!(reg.retire(a, AgentStatus::Killed).is_err());
        assert!(reg.set_capital(a, Decimal::ONE).is_err());

        let counts = reg.counts();
        assert_eq!((counts.active, counts.killed, counts.graduated), (0, 1, 1));
        assert_eq!(counts.total(), 2);
    }
}
