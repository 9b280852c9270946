//! `SQLite` backend against an in-memory database: schema, idempotent
//! appends, queries, flush and reload.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use rust_decimal::Decimal;

use arena_core::config::{CapitalConfig, SchedulerConfig};
use arena_core::{Arena, ArenaConfig, OperatorState, SharedArena, run_scheduler};
use arena_db::{DbError, EventTable, LedgerTable, PersistCallback, SqliteDb, load_arena, persist_arena};
use arena_events::EventStore;
use arena_types::{AgentId, EventType};

fn config(total: i64) -> ArenaConfig {
    let mut config = ArenaConfig {
        capital: CapitalConfig::with_total(Decimal::new(total, 0)),
        ..ArenaConfig::default()
    };
    config.mutation.seed = Some(5);
    config.lifecycle.max_population = 20;
    config
}

/// Four agents, one cycle, and some performance history.
fn arena() -> (Arena, Vec<AgentId>) {
    let mut arena = Arena::new(config(100_000)).unwrap();
    let ids: Vec<AgentId> = (0..4)
        .map(|_| arena.spawn_agent("DeFi-Yield-Farmer", None).unwrap().id)
        .collect();
    arena.run_evolution_cycle().unwrap();
    for id in &ids {
        arena.record_performance(*id, 12.5, 10_012.5, None).unwrap();
    }
    (arena, ids)
}

#[tokio::test]
async fn migrations_create_the_schema() {
    let db = SqliteDb::in_memory().await.unwrap();

    for table in ["events", "capital_ledger", "arena_state"] {
        assert!(db.table_exists(table).await.unwrap(), "missing {table}");
    }
    assert!(!db.table_exists("agents").await.unwrap());

    assert_eq!(
        db.columns("events").await.unwrap(),
        [
            "sequence",
            "event_id",
            "event_type",
            "agent_id",
            "cycle",
            "timestamp",
            "data",
            "caused_by"
        ]
    );
    assert_eq!(
        db.columns("arena_state").await.unwrap(),
        ["id", "total_capital", "arena_capital", "cycle_number", "updated_at"]
    );
    assert!(db.columns("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn appends_are_idempotent_and_round_trip() {
    let db = SqliteDb::in_memory().await.unwrap();
    let (arena, _) = arena();
    let events = arena.replay(None);
    let table = EventTable::new(db.pool()).with_batch_size(7);

    let written = table.append_events(&events).await.unwrap();
    assert_eq!(written, events.len() as u64);
    assert_eq!(table.append_events(&events).await.unwrap(), 0);
    assert_eq!(table.count().await.unwrap(), events.len() as u64);
    assert_eq!(table.last_sequence().await.unwrap(), arena.store().len() as u64);

    assert_eq!(table.replay(None).await.unwrap(), events);
}

#[tokio::test]
async fn queries_match_the_live_log() {
    let db = SqliteDb::in_memory().await.unwrap();
    let (arena, ids) = arena();
    let table = EventTable::new(db.pool());
    table.append_events(&arena.replay(None)).await.unwrap();

    let allocations = table
        .query_events(Some(EventType::CapitalAllocated), None)
        .await
        .unwrap();
    assert_eq!(allocations.len(), 4);
    assert!(allocations.windows(2).all(|w| w[0].sequence < w[1].sequence));

    let agent = ids[2];
    assert_eq!(table.replay(Some(agent)).await.unwrap(), arena.replay(Some(agent)));

    let spawned = table
        .query_events(Some(EventType::AgentSpawned), Some(agent))
        .await
        .unwrap();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].agent_id, Some(agent));
}

#[tokio::test]
async fn persist_then_load_restores_the_arena() {
    let db = SqliteDb::in_memory().await.unwrap();
    let (arena, _) = arena();

    let report = persist_arena(&db, &arena).await.unwrap();
    assert_eq!(report.events_written, arena.store().len() as u64);
    assert_eq!(
        report.ledger_entries_written,
        arena.state().ledger().entries().len() as u64
    );
    assert_eq!(report.cycle_number, 2);

    let stored_entries = LedgerTable::new(db.pool()).entries(None).await.unwrap();
    assert_eq!(stored_entries, arena.state().ledger().entries());

    let record = LedgerTable::new(db.pool()).arena_state().await.unwrap().unwrap();
    assert_eq!(record.arena_capital, arena.arena_capital());
    assert_eq!(record.cycle_number, arena.cycle());

    let loaded = load_arena(&db, config(100_000)).await.unwrap();
    assert_eq!(loaded.state(), arena.state());
    assert_eq!(loaded.get_breakdown(), arena.get_breakdown());
    assert!(loaded.verify_replay().unwrap());
}

#[tokio::test]
async fn irregular_float_history_survives_a_reload() {
    let db = SqliteDb::in_memory().await.unwrap();
    let mut arena = Arena::new(config(100_000)).unwrap();
    let ids: Vec<AgentId> = (0..4)
        .map(|_| arena.spawn_agent("Tactical-Trader", None).unwrap().id)
        .collect();
    arena.run_evolution_cycle().unwrap();

    for (n, id) in ids.iter().enumerate() {
        let mut capital = 10_000.0_f64;
        for i in 0..200_u32 {
            let pnl = (f64::from(i) * 1.37 + n as f64).sin() * 17.3;
            capital += pnl;
            arena.record_performance(*id, pnl, capital, None).unwrap();
        }
    }
    assert!(
        arena
            .state()
            .registry()
            .active()
            .any(|a| a.fitness_score.fract().abs() > f64::EPSILON)
    );

    persist_arena(&db, &arena).await.unwrap();
    let stored = EventTable::new(db.pool()).replay(None).await.unwrap();
    assert_eq!(stored, arena.replay(None));

    let loaded = load_arena(&db, config(100_000)).await.unwrap();
    assert_eq!(loaded.state(), arena.state());
    for id in &ids {
        let live = arena.agent(*id).unwrap();
        let reloaded = loaded.agent(*id).unwrap();
        assert_eq!(
            live.fitness_score.to_bits(),
            reloaded.fitness_score.to_bits()
        );
        assert_eq!(live.performance_history, reloaded.performance_history);
    }
}

#[tokio::test]
async fn repeated_flushes_only_send_the_tail() {
    let db = SqliteDb::in_memory().await.unwrap();
    let (mut arena, _) = arena();

    persist_arena(&db, &arena).await.unwrap();
    let again = persist_arena(&db, &arena).await.unwrap();
    assert_eq!(again.events_written, 0);
    assert_eq!(again.ledger_entries_written, 0);

    let before = arena.store().len();
    arena.run_evolution_cycle().unwrap();
    let tail = persist_arena(&db, &arena).await.unwrap();
    assert_eq!(tail.events_written, (arena.store().len() - before) as u64);
    assert_eq!(tail.cycle_number, 3);

    let loaded = load_arena(&db, config(100_000)).await.unwrap();
    assert_eq!(loaded.state(), arena.state());
}

#[tokio::test]
async fn load_refuses_a_different_capital_pool() {
    let db = SqliteDb::in_memory().await.unwrap();
    let (arena, _) = arena();
    persist_arena(&db, &arena).await.unwrap();

    let err = load_arena(&db, config(10_000)).await.unwrap_err();
    assert!(matches!(err, DbError::Config(_)));
}

#[tokio::test]
async fn empty_database_loads_a_fresh_arena() {
    let db = SqliteDb::in_memory().await.unwrap();

    let arena = load_arena(&db, config(100_000)).await.unwrap();

    assert!(arena.store().is_empty());
    assert_eq!(arena.cycle(), 1);
    assert!(arena.verify_conservation().0);
}

#[tokio::test]
async fn scheduler_persists_every_cycle() {
    let db = SqliteDb::in_memory().await.unwrap();
    let mut arena = Arena::new(config(100_000)).unwrap();
    for _ in 0..3 {
        arena.spawn_agent("Tactical-Trader", None).unwrap();
    }
    let shared = SharedArena::new(arena);
    let operator = Arc::new(OperatorState::new(&SchedulerConfig {
        cycle_interval_ms: 0,
        max_cycles: 2,
    }));
    let mut callback = PersistCallback::new(db.clone());

    let result = run_scheduler(&shared, &operator, &mut callback).await;

    assert_eq!(result.cycles_completed, 2);
    assert_eq!(callback.flushes(), 2);
    assert_eq!(callback.failures(), 0);

    let live = shared.read().await;
    let stored = EventTable::new(db.pool()).count().await.unwrap();
    assert_eq!(stored, live.store().len() as u64);

    let loaded = load_arena(&db, config(100_000)).await.unwrap();
    assert_eq!(loaded.state(), live.state());
    assert_eq!(loaded.cycle(), 3);
}
