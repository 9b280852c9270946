//! Arena manager, evolution cycle, and orchestration for the Arena engine.
//!
//! This crate turns the ledger, the event store, and the population registry
//! into one event-sourced arena. Every mutating operation appends an event
//! and applies it through the same reducer replay uses, so the log alone
//! reproduces the live state.
//!
//! # Modules
//!
//! - [`arena`] -- [`Arena`], the per-instance manager and its operations
//! - [`config`] -- Configuration loading from `arena-config.yaml` into
//!   strongly-typed structs
//! - [`cycle`] -- The `ALLOCATE -> KILL -> GRADUATE -> MUTATE -> COMPLETE`
//!   state machine and its isolated runner
//! - [`error`] -- [`ArenaError`], [`ValidationError`], [`CycleError`]
//! - [`operator`] -- Cycle limit, interval, and stop controls
//! - [`scheduler`] -- Periodic cycles with a per-cycle callback
//! - [`shared`] -- [`SharedArena`], a lock-guarded handle for async tasks
//! - [`state`] -- [`ArenaState`], the reducer folded from events
//!
//! # Example
//!
//! ```
//! use arena_core::{Arena, ArenaConfig};
//!
//! let mut arena = Arena::new(ArenaConfig::default()).ok();
//! if let Some(arena) = arena.as_mut() {
//!     let _ = arena.spawn_agent("DeFi-Yield-Farmer", None);
//!     let outcome = arena.safe_run_evolution();
//!     assert!(outcome.success);
//!     assert!(arena.verify_conservation().0);
//! }
//! ```

pub mod arena;
pub mod config;
pub mod cycle;
pub mod error;
pub mod operator;
pub mod scheduler;
pub mod shared;
pub mod state;

pub use arena::{AgentSummary, AllocationReport, Arena, ArenaStats, CapitalTiers, Mutation};
pub use config::{ArenaConfig, ConfigError};
pub use cycle::{CycleControl, CycleOutcome, CycleReport, NeverStop};
pub use error::{ArenaError, CycleError, ValidationError};
pub use operator::{OperatorState, SchedulerEndReason};
pub use scheduler::{CycleCallback, NoOpCallback, SchedulerResult, log_scheduler_end, run_scheduler};
pub use shared::SharedArena;
pub use state::{ArenaState, Transition};
