//! A lock-guarded arena shared between async tasks.
//!
//! Writers take the lock for one whole logical operation, so readers never
//! see an event appended but not yet applied. Many readers may query at once.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use arena_events::{EventFilter, EventStore, MemoryEventStore};
use arena_types::{CapitalBreakdown, Event};

use crate::arena::{Arena, ArenaStats};
use crate::cycle::{CycleControl, CycleOutcome};

/// Cloneable handle to one arena.
pub struct SharedArena<S: EventStore = MemoryEventStore> {
    inner: Arc<RwLock<Arena<S>>>,
}

impl<S: EventStore> Clone for SharedArena<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: EventStore> core::fmt::Debug for SharedArena<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedArena").finish_non_exhaustive()
    }
}

impl<S: EventStore> SharedArena<S> {
    /// Wrap an arena.
    pub fn new(arena: Arena<S>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(arena)),
        }
    }

    /// Shared access for reads.
    pub async fn read(&self) -> RwLockReadGuard<'_, Arena<S>> {
        self.inner.read().await
    }

    /// Exclusive access for one logical operation.
    pub async fn write(&self) -> RwLockWriteGuard<'_, Arena<S>> {
        self.inner.write().await
    }

    /// Run one isolated evolution cycle under the write lock.
    pub async fn run_cycle(&self, control: &dyn CycleControl) -> CycleOutcome {
        self.inner.write().await.safe_run_evolution_with(control)
    }

    /// Capital breakdown.
    pub async fn breakdown(&self) -> CapitalBreakdown {
        self.inner.read().await.get_breakdown()
    }

    /// Matching events, in append order.
    pub async fn query(&self, filter: &EventFilter) -> Vec<Event> {
        self.inner.read().await.query(filter)
    }

    /// Arena statistics.
    pub async fn stats(&self) -> ArenaStats {
        self.inner.read().await.get_arena_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArenaConfig;
    use crate::cycle::NeverStop;

    #[tokio::test]
    async fn concurrent_readers_see_whole_cycles() {
        let Ok(mut arena) = Arena::new(ArenaConfig::default()) else {
            panic!("default config is valid");
        };
        for _ in 0..3 {
            let _ = arena.spawn_agent("DeFi-Yield-Farmer", None);
        }
        let shared = SharedArena::new(arena);

        let writer = {
            let shared = shared.clone();
            tokio::spawn(async move { shared.run_cycle(&NeverStop).await })
        };
        let reader = {
            let shared = shared.clone();
            tokio::spawn(async move {
                let guard = shared.read().await;
                (guard.verify_conservation().0, guard.state().registry_matches_ledger())
            })
        };

        let outcome = writer.await.ok();
        let observed = reader.await.ok();
        assert!(outcome.is_some_and(|o| o.success));
        assert_eq!(observed, Some((true, true)));
        assert_eq!(shared.stats().await.cycle, 2);
    }
}
