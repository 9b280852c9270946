//! End-to-end arena scenarios: allocation, kills, graduation, mutation, and
//! full evolution cycles against a fixed capital pool.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use rust_decimal::Decimal;

use arena_core::config::CapitalConfig;
use arena_core::{Arena, ArenaConfig};
use arena_events::{EventFilter, EventStore};
use arena_types::{
    AgentId, AgentKilledDetails, AgentStatus, CapitalAllocatedDetails, EventType,
    EvolutionCycleCompleteDetails, KillReason,
};

fn arena_with_total(total: i64) -> Arena {
    let mut config = ArenaConfig {
        capital: CapitalConfig::with_total(Decimal::new(total, 0)),
        ..ArenaConfig::default()
    };
    config.mutation.seed = Some(2024);
    Arena::new(config).expect("valid config")
}

fn spawn_n(arena: &mut Arena, n: usize) -> Vec<AgentId> {
    (0..n)
        .map(|i| {
            let strategy = if i % 2 == 0 {
                "DeFi-Yield-Farmer"
            } else {
                "Tactical-Trader"
            };
            arena.spawn_agent(strategy, None).expect("spawn").id
        })
        .collect()
}

fn assert_conserved(arena: &Arena) {
    let (ok, discrepancy) = arena.verify_conservation();
    assert!(ok, "conservation failed, discrepancy {discrepancy}");
    assert!(discrepancy.abs() < Decimal::new(1, 2));
    assert!(arena.state().registry_matches_ledger());
}

#[test]
fn five_agents_share_the_pool() {
    let mut arena = arena_with_total(100_000);
    let arena_capital = arena.arena_capital();
    assert_eq!(arena_capital, Decimal::new(53_600, 0));
    spawn_n(&mut arena, 5);

    let report = arena.allocate_capital().unwrap();

    assert_eq!(report.events.len(), 5);
    let allocated = arena.query(&EventFilter::all().event_type(EventType::CapitalAllocated));
    assert_eq!(allocated.len(), 5);
    assert!(report.allocated <= arena_capital);
    assert!(arena.get_breakdown().allocated_capital <= arena_capital);
    for event in &allocated {
        let details: CapitalAllocatedDetails = event.details().unwrap();
        assert!(!details.clamped);
        assert_eq!(details.amount, Decimal::new(10_000, 0));
    }
    assert_conserved(&arena);
}

#[test]
fn chronic_loser_is_killed_and_capital_returns() {
    let mut arena = arena_with_total(100_000);
    let id = spawn_n(&mut arena, 1)[0];
    arena.allocate_capital().unwrap();
    let held = arena.get_breakdown().allocated_capital;
    assert!(held > Decimal::ZERO);

    let mut capital = 10_000.0;
    let mut last = None;
    for _ in 0..31 {
        capital -= 10.0;
        last = Some(arena.record_performance(id, -10.0, capital, Some(-1.0)).unwrap());
    }
    let agent = arena.agent(id).unwrap();
    assert_eq!(agent.days_negative, 31);
    assert!((agent.fitness_score + 1.0).abs() < f64::EPSILON);

    let killed = arena.kill_underperformers().unwrap();

    assert_eq!(killed.len(), 1);
    let event = &killed[0];
    assert_eq!(event.event_type, EventType::AgentKilled);
    assert_eq!(event.agent_id, Some(id));
    assert_eq!(event.caused_by, last.map(|e| e.event_id));
    let details: AgentKilledDetails = event.details().unwrap();
    assert_eq!(details.reason, KillReason::Underperformance);
    assert_eq!(details.final_capital, held);

    let breakdown = arena.get_breakdown();
    assert_eq!(breakdown.unallocated_capital, arena.arena_capital());
    assert!(breakdown.allocations.is_empty());
    assert_eq!(arena.agent(id).map(|a| a.status), Some(AgentStatus::Killed));
    assert_conserved(&arena);
}

#[test]
fn proven_winner_graduates_out_of_the_ledger() {
    let mut arena = arena_with_total(100_000);
    let id = spawn_n(&mut arena, 1)[0];
    arena.allocate_capital().unwrap();
    let held = arena.get_breakdown().allocated_capital;

    let mut capital = 10_000.0;
    for _ in 0..35 {
        capital += 50.0;
        arena.record_performance(id, 50.0, capital, Some(2.5)).unwrap();
    }

    let event = arena.graduate_to_proving(id).unwrap();

    assert_eq!(event.event_type, EventType::AgentGraduated);
    let graduated = arena.query(
        &EventFilter::all()
            .event_type(EventType::AgentGraduated)
            .agent(id),
    );
    assert_eq!(graduated.len(), 1);

    let breakdown = arena.get_breakdown();
    assert!(!breakdown.allocations.contains_key(&id));
    assert_eq!(breakdown.transferred_out_capital, held);
    assert_eq!(breakdown.total_capital, arena.arena_capital() - held);
    assert_eq!(arena.agent(id).map(|a| a.status), Some(AgentStatus::Graduated));
    assert_conserved(&arena);
}

#[test]
fn hundred_agents_never_overflow_the_pool() {
    for total in [100_000, 10_000, 1_000] {
        let mut arena = arena_with_total(total);
        let arena_capital = arena.arena_capital();
        spawn_n(&mut arena, 100);

        let report = arena.allocate_capital().unwrap();

        assert!(
            report.allocated <= arena_capital,
            "allocated {} of {arena_capital}",
            report.allocated
        );
        let breakdown = arena.get_breakdown();
        assert!(breakdown.allocated_capital <= arena_capital);
        assert_eq!(breakdown.allocated_capital, report.allocated);
        assert_eq!(report.events.len() + report.starved.len(), 100);
        assert_conserved(&arena);
    }
}

#[test]
fn cycle_complete_references_its_sub_events() {
    let mut arena = arena_with_total(100_000);
    spawn_n(&mut arena, 6);
    let before = arena.store().len();

    let report = arena.run_evolution_cycle().unwrap();

    let complete = arena.query(&EventFilter::all().event_type(EventType::EvolutionCycleComplete));
    assert_eq!(complete.len(), 1);
    let closing = &complete[0];
    let details: EvolutionCycleCompleteDetails = closing.details().unwrap();
    assert_eq!(details.cycle_number, 1);

    let appended: Vec<_> = arena
        .replay(None)
        .into_iter()
        .skip(before)
        .filter(|e| e.event_type != EventType::EvolutionCycleComplete)
        .map(|e| e.event_id)
        .collect();
    assert_eq!(details.sub_events, appended);
    assert_eq!(report.sub_events, appended);
    assert_eq!(closing.caused_by, appended.last().copied());
    assert_eq!(details.agents_mutated, 3);

    let audits = arena.query(&EventFilter::all().event_type(EventType::CapitalConservationCheck));
    assert_eq!(audits.len(), 1);
    assert_eq!(arena.cycle(), 2);
    assert_conserved(&arena);
}

#[test]
fn mutation_links_child_to_parent() {
    let mut arena = arena_with_total(100_000);
    let parent = arena.spawn_agent("Tactical-Trader", None).unwrap();

    let mutation = arena.mutate_agent(parent.id).unwrap();

    let cause = mutation.mutated_event.caused_by.expect("mutation has a cause");
    let cause_event = arena.store().get(cause).expect("cause is stored");
    assert_eq!(cause_event.agent_id, Some(parent.id));
    assert_eq!(mutation.spawn_event.caused_by, Some(parent.spawn_event_id));
    assert!(mutation.spawn_event.sequence < mutation.mutated_event.sequence);

    assert_eq!(mutation.child.parent_id, Some(parent.id));
    assert_eq!(mutation.child.generation, 1);
    assert_eq!(mutation.child.capital_allocated, Decimal::ZERO);
    assert_eq!(mutation.child.strategy_name, parent.strategy_name);
    assert_eq!(mutation.mutated_event.agent_id, Some(mutation.child.id));
    assert_conserved(&arena);
}

#[test]
fn every_operation_leaves_a_matching_event() {
    let mut arena = arena_with_total(100_000);
    let ids = spawn_n(&mut arena, 2);
    arena.allocate_capital().unwrap();
    arena.record_performance(ids[0], 5.0, 10_005.0, None).unwrap();
    arena.mutate_agent(ids[0]).unwrap();

    for (event_type, agent) in [
        (EventType::AgentSpawned, ids[1]),
        (EventType::CapitalAllocated, ids[1]),
        (EventType::PerformanceRecorded, ids[0]),
    ] {
        let found = arena.query(&EventFilter::all().event_type(event_type).agent(agent));
        assert!(!found.is_empty(), "no {event_type} for {agent}");
    }
    assert_eq!(
        arena
            .query(&EventFilter::all().event_type(EventType::AgentMutated))
            .len(),
        1
    );
}

#[test]
fn killed_agent_cannot_be_touched_again() {
    let mut arena = arena_with_total(100_000);
    let id = spawn_n(&mut arena, 1)[0];
    for _ in 0..31 {
        arena.record_performance(id, -1.0, 100.0, Some(-0.5)).unwrap();
    }
    assert_eq!(arena.kill_underperformers().unwrap().len(), 1);
    let before = arena.store().len();

    assert!(arena.record_performance(id, 1.0, 100.0, None).is_err());
    assert!(arena.graduate_to_proving(id).is_err());
    assert!(arena.mutate_agent(id).is_err());
    assert!(arena.kill_underperformers().unwrap().is_empty());
    assert_eq!(arena.store().len(), before);
}
