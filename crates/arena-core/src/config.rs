//! Configuration loading and typed config structures for the Arena.
//!
//! The canonical configuration lives in `arena-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads and validates the file.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use arena_agents::{LifecycleConfig, MutationConfig};
use arena_ledger::floor_cents;
use arena_types::CapitalDisposition;

/// Environment variable overriding `storage.database_url`.
pub const DATABASE_URL_ENV: &str = "ARENA_DATABASE_URL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level arena configuration.
///
/// Mirrors the structure of `arena-config.yaml`. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Capital pool and tier split.
    #[serde(default)]
    pub capital: CapitalConfig,

    /// Allocation policy.
    #[serde(default)]
    pub allocation: AllocationConfig,

    /// Kill, graduation, and population policy.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Mutation operator settings.
    #[serde(default)]
    pub mutation: MutationConfig,

    /// Initial population seeded by the engine binary.
    #[serde(default)]
    pub population: PopulationConfig,

    /// Evolution cycle scheduling.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Durable storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ArenaConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `ARENA_DATABASE_URL` overrides `storage.database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.storage.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capital.validate()?;
        self.allocation.validate()?;
        if !self.mutation.range.is_finite() || !(0.0..1.0).contains(&self.mutation.range) {
            return Err(ConfigError::Invalid {
                field: "mutation.range",
                reason: format!("must be in [0, 1), got {}", self.mutation.range),
            });
        }
        if self.lifecycle.max_population == 0 {
            return Err(ConfigError::Invalid {
                field: "lifecycle.max_population",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Capital pool configuration.
///
/// `total_capital` is split into a stable reserve, the arena slice managed
/// by the simulation-tier ledger, and a proving allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalConfig {
    /// Total capital under management.
    #[serde(default = "default_total_capital")]
    pub total_capital: Decimal,

    /// Share of total held as stable reserve (default: 0.437).
    #[serde(default = "default_reserve_fraction")]
    pub reserve_fraction: Decimal,

    /// Share of total managed by the simulation tier (default: 0.536).
    #[serde(default = "default_arena_fraction")]
    pub arena_fraction: Decimal,

    /// Share of total set aside for the proving tier (default: 0.027).
    #[serde(default = "default_proving_fraction")]
    pub proving_fraction: Decimal,

    /// What graduation does with an agent's capital (default: transferred out).
    #[serde(default)]
    pub graduation_disposition: CapitalDisposition,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            total_capital: default_total_capital(),
            reserve_fraction: default_reserve_fraction(),
            arena_fraction: default_arena_fraction(),
            proving_fraction: default_proving_fraction(),
            graduation_disposition: CapitalDisposition::default(),
        }
    }
}

impl CapitalConfig {
    /// Config with the given total and default tier split.
    pub fn with_total(total_capital: Decimal) -> Self {
        Self {
            total_capital,
            ..Self::default()
        }
    }

    /// Capital managed by the simulation tier, rounded down to cents.
    pub fn arena_capital(&self) -> Decimal {
        floor_cents(self.total_capital.saturating_mul(self.arena_fraction))
    }

    /// Stable reserve, rounded down to cents.
    pub fn stable_reserve(&self) -> Decimal {
        floor_cents(self.total_capital.saturating_mul(self.reserve_fraction))
    }

    /// Proving-tier allocation, rounded down to cents.
    pub fn proving_capital(&self) -> Decimal {
        floor_cents(self.total_capital.saturating_mul(self.proving_fraction))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.total_capital < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "capital.total_capital",
                reason: format!("must not be negative, got {}", self.total_capital),
            });
        }
        for (field, value) in [
            ("capital.reserve_fraction", self.reserve_fraction),
            ("capital.arena_fraction", self.arena_fraction),
            ("capital.proving_fraction", self.proving_fraction),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be in [0, 1], got {value}"),
                });
            }
        }
        let sum = self
            .reserve_fraction
            .saturating_add(self.arena_fraction)
            .saturating_add(self.proving_fraction);
        if sum > Decimal::ONE {
            return Err(ConfigError::Invalid {
                field: "capital",
                reason: format!("tier fractions sum to {sum}, more than 1"),
            });
        }
        Ok(())
    }
}

fn default_total_capital() -> Decimal {
    Decimal::new(373_261, 0)
}

fn default_reserve_fraction() -> Decimal {
    Decimal::new(437, 3)
}

fn default_arena_fraction() -> Decimal {
    Decimal::new(536, 3)
}

fn default_proving_fraction() -> Decimal {
    Decimal::new(27, 3)
}

/// Allocation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Smallest top-up worth making (default: 100).
    #[serde(default = "default_min_allocation")]
    pub min_allocation: Decimal,

    /// Per-agent cap (default: 10000).
    #[serde(default = "default_max_allocation_per_agent")]
    pub max_allocation_per_agent: Decimal,

    /// Clamp oversized top-ups to the pool instead of failing (default: true).
    #[serde(default = "default_true")]
    pub lenient: bool,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            min_allocation: default_min_allocation(),
            max_allocation_per_agent: default_max_allocation_per_agent(),
            lenient: true,
        }
    }
}

impl AllocationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_allocation <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "allocation.min_allocation",
                reason: "must be positive".to_owned(),
            });
        }
        if self.max_allocation_per_agent < self.min_allocation {
            return Err(ConfigError::Invalid {
                field: "allocation.max_allocation_per_agent",
                reason: format!(
                    "{} is below min_allocation {}",
                    self.max_allocation_per_agent, self.min_allocation
                ),
            });
        }
        Ok(())
    }
}

fn default_min_allocation() -> Decimal {
    Decimal::new(100, 0)
}

fn default_max_allocation_per_agent() -> Decimal {
    Decimal::new(10_000, 0)
}

/// Initial population seeded by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Agents spawned per known strategy at startup (default: 5).
    #[serde(default = "default_agents_per_strategy")]
    pub agents_per_strategy: u32,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            agents_per_strategy: default_agents_per_strategy(),
        }
    }
}

const fn default_agents_per_strategy() -> u32 {
    5
}

/// Evolution cycle scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pause between cycles in milliseconds (default: 1000).
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    /// Stop after this many cycles; 0 runs until stopped (default: 10).
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: default_cycle_interval_ms(),
            max_cycles: default_max_cycles(),
        }
    }
}

const fn default_cycle_interval_ms() -> u64 {
    1000
}

const fn default_max_cycles() -> u64 {
    10
}

/// Durable storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` connection URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum pool connections (default: 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl StorageConfig {
    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(DATABASE_URL_ENV) {
            self.database_url = val;
        }
    }
}

fn default_database_url() -> String {
    "sqlite://arena.db?mode=rwc".to_owned()
}

const fn default_max_connections() -> u32 {
    5
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let parsed: Result<ArenaConfig, _> = serde_yml::from_str("{}");
        let Ok(config) = parsed else {
            panic!("empty config must parse");
        };
        assert_eq!(config.capital.total_capital, Decimal::new(373_261, 0));
        assert_eq!(config.mutation.top_n, 3);
        assert!(config.allocation.lenient);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tier_split_rounds_down_to_cents() {
        let capital = CapitalConfig::default();
        // 373261 * 0.536 = 200067.896
        assert_eq!(capital.arena_capital(), Decimal::new(20_006_789, 2));
        assert_eq!(CapitalConfig::with_total(Decimal::new(100_000, 0)).arena_capital(), Decimal::new(53_600, 0));
    }

    #[test]
    fn nested_sections_parse() {
        let yaml = r"
capital:
  total_capital: 100000
  graduation_disposition: released
allocation:
  min_allocation: 250
  max_allocation_per_agent: 5000
lifecycle:
  retirement_age: 365
mutation:
  seed: 42
scheduler:
  max_cycles: 3
  cycle_interval_ms: 0
";
        let parsed: Result<ArenaConfig, _> = serde_yml::from_str(yaml);
        let Ok(config) = parsed else {
            panic!("config must parse");
        };
        assert_eq!(config.capital.total_capital, Decimal::new(100_000, 0));
        assert_eq!(
            config.capital.graduation_disposition,
            CapitalDisposition::Released
        );
        assert_eq!(config.allocation.min_allocation, Decimal::new(250, 0));
        assert_eq!(config.lifecycle.retirement_age, Some(365));
        assert_eq!(config.mutation.seed, Some(42));
        assert_eq!(config.scheduler.max_cycles, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn oversubscribed_tiers_are_rejected() {
        let mut config = ArenaConfig::default();
        config.capital.arena_fraction = Decimal::new(9, 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "capital", .. })
        ));
    }

    #[test]
    fn inverted_allocation_bounds_are_rejected() {
        let mut config = ArenaConfig::default();
        config.allocation.max_allocation_per_agent = Decimal::new(50, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn project_config_file_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("arena-config.yaml");
        if path.exists() {
            let mut config = match ArenaConfig::from_file(&path) {
                Ok(config) => config,
                Err(e) => panic!("failed to load project config: {e}"),
            };
            config.storage = StorageConfig::default();
            assert_eq!(config, ArenaConfig::default());
        }
    }
}
