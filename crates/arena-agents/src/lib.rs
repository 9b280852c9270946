//! Agent population, lifecycle policy, and evolution operators for the Arena.
//!
//! This crate is the logic layer for simulation-tier agents. It holds agent
//! records and decides who lives, who graduates, and how children differ from
//! their parents, without touching capital or the event log. The arena
//! manager in `arena-core` turns those decisions into events.
//!
//! # Modules
//!
//! - [`config`] -- Lifecycle and mutation policy ([`LifecycleConfig`], [`MutationConfig`])
//! - [`error`] -- Error types for registry and policy operations ([`AgentError`])
//! - [`fitness`] -- Performance metrics and the multi-factor fitness score
//! - [`lifecycle`] -- Kill and graduation rules
//! - [`mutation`] -- Parameter perturbation for mutated children
//! - [`registry`] -- The [`PopulationRegistry`] of agent records
//! - [`templates`] -- Strategy templates supplying default parameters

pub mod config;
pub mod error;
pub mod fitness;
pub mod lifecycle;
pub mod mutation;
pub mod registry;
pub mod templates;

// Re-export primary types at crate root for convenience.
pub use config::{LifecycleConfig, MutationConfig};
pub use error::AgentError;
pub use fitness::{FitnessMetrics, MIN_FITNESS_SAMPLES, fitness_score};
pub use lifecycle::{GraduationCheck, check_graduation, check_kill, has_positive_trend};
pub use mutation::mutate_params;
pub use registry::{PopulationCounts, PopulationRegistry};
pub use templates::{BuiltinTemplates, StrategyTemplates, resolve_params};
