//! Arena engine binary.
//!
//! Wires together configuration, the `SQLite` store, the arena, and the
//! cycle scheduler, then runs evolution cycles until a termination
//! condition is met.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `arena-config.yaml` (or `ARENA_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the `SQLite` store and run migrations
//! 4. Rebuild the arena from the stored log
//! 5. Seed agents per strategy if the population is empty
//! 6. Run the scheduler, persisting after every cycle
//! 7. Log the final breakdown and conservation result

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use arena_core::config::LoggingConfig;
use arena_core::{Arena, ArenaConfig, OperatorState, SharedArena, log_scheduler_end, run_scheduler};
use arena_db::{PersistCallback, SqliteConfig, SqliteDb, load_arena, persist_arena};
use arena_events::MemoryEventStore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Environment variable naming an alternative config file.
const CONFIG_PATH_ENV: &str = "ARENA_CONFIG";

/// Config file looked up in the working directory by default.
const DEFAULT_CONFIG_PATH: &str = "arena-config.yaml";

/// Application entry point for the Arena engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails or the ledger does
/// not balance at shutdown.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("arena-engine starting");
    info!(
        source = %source.display(),
        total_capital = %config.capital.total_capital,
        arena_capital = %config.capital.arena_capital(),
        max_cycles = config.scheduler.max_cycles,
        cycle_interval_ms = config.scheduler.cycle_interval_ms,
        "Configuration loaded"
    );

    // 3. Open the store.
    let db_config = SqliteConfig::new(&config.storage.database_url)
        .with_max_connections(config.storage.max_connections);
    let db = SqliteDb::connect(&db_config).await?;
    db.run_migrations().await?;

    // 4. Rebuild the arena.
    let scheduler_config = config.scheduler.clone();
    let agents_per_strategy = config.population.agents_per_strategy;
    let mut arena = load_arena(&db, config).await?;

    // 5. Seed the population.
    if arena.state().registry().active_count() == 0 {
        let spawned = seed_population(&mut arena, agents_per_strategy)?;
        persist_arena(&db, &arena).await?;
        info!(agents_spawned = spawned, "Seed agents spawned");
    } else {
        info!(
            active = arena.state().registry().active_count(),
            cycle = arena.cycle(),
            "Resuming existing population"
        );
    }

    // 6. Run the scheduler.
    let shared = SharedArena::new(arena);
    let operator = Arc::new(OperatorState::new(&scheduler_config));
    spawn_ctrl_c_handler(Arc::clone(&operator));

    let mut callback = PersistCallback::new(db.clone());
    let result = run_scheduler(&shared, &operator, &mut callback).await;
    log_scheduler_end(&result);
    if callback.failures() > 0 {
        warn!(failures = callback.failures(), "Some cycles were not persisted");
    }

    // 7. Final flush and report.
    let guard = shared.read().await;
    persist_arena(&db, &*guard).await?;
    db.close().await;

    let breakdown = guard.get_breakdown();
    let (conserved, discrepancy) = guard.verify_conservation();
    info!(
        total_capital = %breakdown.total_capital,
        allocated = %breakdown.allocated_capital,
        unallocated = %breakdown.unallocated_capital,
        transferred_out = %breakdown.transferred_out_capital,
        utilization = breakdown.utilization,
        agents = breakdown.allocations.len(),
        "Final capital breakdown"
    );

    if !conserved {
        error!(%discrepancy, "Capital conservation violated at shutdown");
        return Err(EngineError::Conservation { discrepancy });
    }

    info!(
        end_reason = ?result.end_reason,
        cycles_run = result.cycles_run,
        cycle = guard.cycle(),
        "arena-engine shutdown complete"
    );
    Ok(())
}

/// Load the arena configuration, falling back to defaults when the file
/// does not exist.
fn load_config() -> Result<(ArenaConfig, PathBuf), EngineError> {
    let path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = ArenaConfig::from_file(&path)?;
        Ok((config, path))
    } else {
        let mut config = ArenaConfig::default();
        config.storage.apply_env_overrides();
        Ok((config, PathBuf::from("<defaults>")))
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Spawn `per_strategy` agents for every known strategy.
fn seed_population(
    arena: &mut Arena<MemoryEventStore>,
    per_strategy: u32,
) -> Result<usize, EngineError> {
    let mut spawned = 0_usize;
    for strategy in arena.strategies() {
        for _ in 0..per_strategy {
            arena.spawn_agent(&strategy, None)?;
            spawned = spawned.saturating_add(1);
        }
    }
    Ok(spawned)
}

/// Request a clean stop on Ctrl-C.
///
/// The running cycle halts at its next phase boundary; completed sub-steps
/// stay in the log.
fn spawn_ctrl_c_handler(operator: Arc<OperatorState>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping after the current step");
                operator.request_stop();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}
