//! Policy constants for the agent lifecycle and the mutation operator.
//!
//! These values correspond to the `lifecycle` and `mutation` sections of
//! `arena-config.yaml`. Every field has a default so partial configuration
//! files deserialize cleanly.

use serde::{Deserialize, Serialize};

/// Kill, graduation, retirement, and population policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Agents below this fitness are kill candidates (default: 0.0).
    #[serde(default = "default_kill_threshold")]
    pub kill_threshold: f64,

    /// A kill candidate dies once its negative streak exceeds this many
    /// periods (default: 30).
    #[serde(default = "default_negative_streak_threshold")]
    pub negative_streak_threshold: u32,

    /// Minimum fitness for graduation, exclusive (default: 2.0).
    #[serde(default = "default_graduation_fitness")]
    pub graduation_fitness: f64,

    /// Minimum age in periods for graduation (default: 30).
    #[serde(default = "default_graduation_min_age")]
    pub graduation_min_age: u32,

    /// Number of recent periods inspected for a positive trend (default: 7).
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,

    /// Graduates need a Sharpe ratio above this (default: 1.5).
    #[serde(default = "default_graduation_min_sharpe")]
    pub graduation_min_sharpe: Option<f64>,

    /// Graduates need a win rate above this (default: 0.60).
    #[serde(default = "default_graduation_min_win_rate")]
    pub graduation_min_win_rate: Option<f64>,

    /// Graduates must never have fallen this far from a peak, as a positive
    /// fraction (default: 0.20).
    #[serde(default = "default_graduation_max_drawdown")]
    pub graduation_max_drawdown: Option<f64>,

    /// A drawdown deeper than this kills, as a positive fraction
    /// (default: 0.50).
    #[serde(default = "default_kill_max_drawdown")]
    pub kill_max_drawdown: Option<f64>,

    /// Agents this old with a negative total return are killed
    /// (default: 90).
    #[serde(default = "default_kill_negative_return_age")]
    pub kill_negative_return_age: Option<u32>,

    /// Sharpe floor below which an agent is killed once it reaches
    /// `kill_min_sharpe_age` (default: 0.5).
    #[serde(default = "default_kill_min_sharpe")]
    pub kill_min_sharpe: Option<f64>,

    /// Age from which `kill_min_sharpe` applies (default: 60).
    #[serde(default = "default_kill_min_sharpe_age")]
    pub kill_min_sharpe_age: u32,

    /// Agents older than this are retired. Disabled when `None` (default).
    #[serde(default)]
    pub retirement_age: Option<u32>,

    /// Mutation stops once this many agents are active (default: 100).
    #[serde(default = "default_max_population")]
    pub max_population: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            kill_threshold: default_kill_threshold(),
            negative_streak_threshold: default_negative_streak_threshold(),
            graduation_fitness: default_graduation_fitness(),
            graduation_min_age: default_graduation_min_age(),
            trend_window: default_trend_window(),
            graduation_min_sharpe: default_graduation_min_sharpe(),
            graduation_min_win_rate: default_graduation_min_win_rate(),
            graduation_max_drawdown: default_graduation_max_drawdown(),
            kill_max_drawdown: default_kill_max_drawdown(),
            kill_negative_return_age: default_kill_negative_return_age(),
            kill_min_sharpe: default_kill_min_sharpe(),
            kill_min_sharpe_age: default_kill_min_sharpe_age(),
            retirement_age: None,
            max_population: default_max_population(),
        }
    }
}

const fn default_kill_threshold() -> f64 {
    0.0
}

const fn default_negative_streak_threshold() -> u32 {
    30
}

const fn default_graduation_fitness() -> f64 {
    2.0
}

const fn default_graduation_min_age() -> u32 {
    30
}

const fn default_trend_window() -> usize {
    7
}

const fn default_max_population() -> usize {
    100
}

const fn default_graduation_min_sharpe() -> Option<f64> {
    Some(1.5)
}

const fn default_graduation_min_win_rate() -> Option<f64> {
    Some(0.60)
}

const fn default_graduation_max_drawdown() -> Option<f64> {
    Some(0.20)
}

const fn default_kill_max_drawdown() -> Option<f64> {
    Some(0.50)
}

const fn default_kill_negative_return_age() -> Option<u32> {
    Some(90)
}

const fn default_kill_min_sharpe() -> Option<f64> {
    Some(0.5)
}

const fn default_kill_min_sharpe_age() -> u32 {
    60
}

/// Mutation operator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Maximum relative perturbation of a numeric parameter (default: 0.2,
    /// i.e. each value is scaled by a factor drawn from `[0.8, 1.2]`).
    #[serde(default = "default_mutation_range")]
    pub range: f64,

    /// How many top-ranked agents are mutated per cycle (default: 3).
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Seed for the mutation RNG. Random when `None` (default).
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            range: default_mutation_range(),
            top_n: default_top_n(),
            seed: None,
        }
    }
}

const fn default_mutation_range() -> f64 {
    0.2
}

const fn default_top_n() -> usize {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let c = LifecycleConfig::default();
        assert!(c.kill_threshold.abs() < f64::EPSILON);
        assert_eq!(c.negative_streak_threshold, 30);
        assert_eq!(c.graduation_min_age, 30);
        assert!(c.retirement_age.is_none());
        assert_eq!(c.kill_negative_return_age, Some(90));
        assert_eq!(c.kill_min_sharpe_age, 60);
        assert!(c.graduation_min_sharpe.is_some_and(|s| (s - 1.5).abs() < f64::EPSILON));

        let m = MutationConfig::default();
        assert_eq!(m.top_n, 3);
        assert!((m.range - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let parsed: Result<LifecycleConfig, _> =
            serde_json::from_str(r#"{ "retirement_age": 365 }"#);
        let Ok(c) = parsed else {
            panic!("partial config must parse");
        };
        assert_eq!(c.retirement_age, Some(365));
        assert_eq!(c.max_population, 100);
    }

    #[test]
    fn metric_gates_can_be_switched_off() {
        let parsed: Result<LifecycleConfig, _> =
            serde_json::from_str(r#"{ "kill_max_drawdown": null, "graduation_min_sharpe": null }"#);
        let Ok(c) = parsed else {
            panic!("partial config must parse");
        };
        assert!(c.kill_max_drawdown.is_none());
        assert!(c.graduation_min_sharpe.is_none());
        assert_eq!(c.kill_negative_return_age, Some(90));
    }
}
