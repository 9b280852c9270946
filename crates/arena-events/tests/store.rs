//! Integration tests for the in-memory event store through the public trait.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use arena_events::{EventFilter, EventStore, MemoryEventStore};
use arena_types::{AgentId, AgentSpawnedDetails, EventType, NewEvent, Params};

fn spawn_event(agent: AgentId) -> NewEvent {
    let details = AgentSpawnedDetails {
        strategy_name: "Tactical-Trader".to_owned(),
        params: Params::new(),
        parent_id: None,
        generation: 0,
    };
    NewEvent::new(EventType::AgentSpawned, Some(agent), 1, &details).unwrap()
}

/// Drive a store through the trait object only.
fn append_all(store: &mut dyn EventStore, events: Vec<NewEvent>) -> Vec<u64> {
    events
        .into_iter()
        .map(|e| store.append(e).unwrap().sequence)
        .collect()
}

#[test]
fn replay_is_insertion_ordered_and_agent_scoped() {
    let mut store = MemoryEventStore::new();
    let a = AgentId::new();
    let b = AgentId::new();

    let seqs = append_all(
        &mut store,
        vec![spawn_event(a), spawn_event(b), spawn_event(a)],
    );
    assert_eq!(seqs, vec![1, 2, 3]);

    let all = store.replay(None);
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].sequence < w[1].sequence));

    let only_a = store.replay(Some(a));
    assert_eq!(only_a.len(), 2);
    assert!(only_a.iter().all(|e| e.agent_id == Some(a)));
}

#[test]
fn query_is_restartable_and_sees_new_events() {
    let mut store = MemoryEventStore::new();
    let agent = AgentId::new();
    store.append(spawn_event(agent)).unwrap();

    let filter = EventFilter::all().event_type(EventType::AgentSpawned);
    let first = store.query(&filter);
    let again = store.query(&filter);
    assert_eq!(first, again);

    store.append(spawn_event(agent)).unwrap();
    assert_eq!(store.query(&filter).len(), 2);
}

#[test]
fn caused_by_must_point_backwards() {
    let mut store = MemoryEventStore::new();
    let agent = AgentId::new();
    let parent = store.append(spawn_event(agent)).unwrap();

    let child = store
        .append(spawn_event(AgentId::new()).caused_by(Some(parent.event_id)))
        .unwrap();
    assert_eq!(child.caused_by, Some(parent.event_id));
    assert_eq!(store.get(child.event_id), Some(child.clone()));

    let dangling = spawn_event(agent).caused_by(Some(arena_types::EventId::new()));
    assert!(store.append(dangling).is_err());
    assert_eq!(store.len(), 2);
}

#[test]
fn cycle_filter_selects_one_cycle() {
    let mut store = MemoryEventStore::new();
    let agent = AgentId::new();
    let mut second_cycle = spawn_event(agent);
    second_cycle.cycle = 2;

    store.append(spawn_event(agent)).unwrap();
    store.append(second_cycle).unwrap();

    let cycle_two = store.query(&EventFilter::all().cycle(2));
    assert_eq!(cycle_two.len(), 1);
    assert_eq!(cycle_two[0].cycle, 2);
}
