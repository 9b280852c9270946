//! Kill and graduation rules for simulation-tier agents.
//!
//! An active agent is killed when:
//! - fitness is below `kill_threshold` **and** `days_negative` exceeds
//!   `negative_streak_threshold` (underperformance), or
//! - its drawdown is deeper than `kill_max_drawdown`, or
//! - its total return is negative at `kill_negative_return_age`, or
//! - its Sharpe ratio is below `kill_min_sharpe` at `kill_min_sharpe_age`, or
//! - `retirement_age` is set and its age exceeds it (retirement).
//!
//! The metric gates only look at agents with at least
//! [`MIN_FITNESS_SAMPLES`] periods of history.
//!
//! An active agent may graduate when its fitness exceeds
//! `graduation_fitness`, it is at least `graduation_min_age` periods old,
//! its Sharpe ratio, win rate and drawdown clear their gates, and its recent
//! history trends upward.
//!
//! These functions only inspect state; the arena manager applies the result.

use arena_types::{Agent, KillReason, PerformanceSnapshot};

use crate::config::LifecycleConfig;
use crate::fitness::{FitnessMetrics, MIN_FITNESS_SAMPLES};

/// Check whether an active agent meets a kill condition.
///
/// Returns `Some(reason)` if the agent should be killed, `None` otherwise.
/// Underperformance takes precedence over the metric gates, and those over
/// retirement.
pub fn check_kill(agent: &Agent, config: &LifecycleConfig) -> Option<KillReason> {
    if !agent.status.is_active() {
        return None;
    }
    if agent.fitness_score < config.kill_threshold
        && agent.days_negative > config.negative_streak_threshold
    {
        return Some(KillReason::Underperformance);
    }
    if let Some(reason) = metric_kill(agent, config) {
        return Some(reason);
    }
    if config.retirement_age.is_some_and(|max| agent.age > max) {
        return Some(KillReason::Retirement);
    }
    None
}

fn metric_kill(agent: &Agent, config: &LifecycleConfig) -> Option<KillReason> {
    if agent.performance_history.len() < MIN_FITNESS_SAMPLES {
        return None;
    }
    let metrics = FitnessMetrics::from_history(&agent.performance_history);
    if config
        .kill_max_drawdown
        .is_some_and(|limit| metrics.max_drawdown < -limit)
    {
        return Some(KillReason::Drawdown);
    }
    if config
        .kill_negative_return_age
        .is_some_and(|age| agent.age >= age && metrics.total_return < 0.0)
    {
        return Some(KillReason::NegativeReturn);
    }
    if config.kill_min_sharpe.is_some_and(|floor| {
        agent.age >= config.kill_min_sharpe_age && metrics.sharpe_ratio < floor
    }) {
        return Some(KillReason::LowSharpe);
    }
    None
}

/// Outcome of a graduation eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraduationCheck {
    /// Every criterion is met.
    Eligible,
    /// At least one criterion failed; the first failure is described.
    Ineligible(String),
}

impl GraduationCheck {
    /// Whether the agent may graduate.
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Check an agent against the graduation policy.
pub fn check_graduation(agent: &Agent, config: &LifecycleConfig) -> GraduationCheck {
    if !agent.status.is_active() {
        return GraduationCheck::Ineligible(format!("status is {:?}", agent.status));
    }
    if agent.fitness_score <= config.graduation_fitness {
        return GraduationCheck::Ineligible(format!(
            "fitness {:.3} not above {:.3}",
            agent.fitness_score, config.graduation_fitness
        ));
    }
    if agent.age < config.graduation_min_age {
        return GraduationCheck::Ineligible(format!(
            "age {} below minimum {}",
            agent.age, config.graduation_min_age
        ));
    }
    let metrics = FitnessMetrics::from_history(&agent.performance_history);
    if let Some(min) = config.graduation_min_sharpe
        && metrics.sharpe_ratio <= min
    {
        return GraduationCheck::Ineligible(format!(
            "sharpe {:.3} not above {min:.3}",
            metrics.sharpe_ratio
        ));
    }
    if let Some(min) = config.graduation_min_win_rate
        && metrics.win_rate <= min
    {
        return GraduationCheck::Ineligible(format!(
            "win rate {:.3} not above {min:.3}",
            metrics.win_rate
        ));
    }
    if let Some(limit) = config.graduation_max_drawdown
        && metrics.max_drawdown <= -limit
    {
        return GraduationCheck::Ineligible(format!(
            "drawdown {:.3} beyond -{limit:.3}",
            metrics.max_drawdown
        ));
    }
    if !has_positive_trend(&agent.performance_history, config.trend_window) {
        return GraduationCheck::Ineligible("no positive recent trend".to_owned());
    }
    GraduationCheck::Eligible
}

/// Whether the last `window` periods trend upward.
///
/// Requires at least `window` periods (and at least one). The window must
/// have positive net P&L and end with more capital than it started with.
pub fn has_positive_trend(history: &[PerformanceSnapshot], window: usize) -> bool {
    let window = window.max(1);
    if history.len() < window {
        return false;
    }
    let recent = history.get(history.len().saturating_sub(window)..).unwrap_or_default();
    let net: f64 = recent.iter().map(|s| s.pnl).sum();
    match (recent.first(), recent.last()) {
        (Some(first), Some(last)) => net > 0.0 && last.capital >= first.capital,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use arena_types::{AgentId, AgentStatus, EventId};
    use rust_decimal::Decimal;

    use super::*;

    fn agent(fitness: f64, age: u32, days_negative: u32, history: Vec<PerformanceSnapshot>) -> Agent {
        Agent {
            id: AgentId::new(),
            strategy_name: "Tactical-Trader".to_owned(),
            params: BTreeMap::new(),
            fitness_score: fitness,
            age,
            days_negative,
            performance_history: history,
            capital_allocated: Decimal::ZERO,
            status: AgentStatus::Active,
            parent_id: None,
            generation: 0,
            spawn_event_id: EventId::new(),
            spawn_order: 0,
        }
    }

    fn rising(n: usize) -> Vec<PerformanceSnapshot> {
        (0..n)
            .map(|i| PerformanceSnapshot {
                pnl: 10.0,
                capital: 1_000.0 + 10.0 * i as f64,
            })
            .collect()
    }

    #[test]
    fn kill_requires_both_conditions() {
        let config = LifecycleConfig::default();
        assert_eq!(
            check_kill(&agent(-1.0, 40, 31, vec![]), &config),
            Some(KillReason::Underperformance)
        );
        assert_eq!(check_kill(&agent(-1.0, 40, 30, vec![]), &config), None);
        assert_eq!(check_kill(&agent(0.5, 40, 45, vec![]), &config), None);
    }

    #[test]
    fn retirement_applies_only_when_configured() {
        let old = agent(1.0, 400, 0, vec![]);
        assert_eq!(check_kill(&old, &LifecycleConfig::default()), None);

        let config = LifecycleConfig {
            retirement_age: Some(365),
            ..LifecycleConfig::default()
        };
        assert_eq!(check_kill(&old, &config), Some(KillReason::Retirement));
    }

    #[test]
    fn dead_agents_are_never_killed_again() {
        let mut a = agent(-1.0, 40, 31, vec![]);
        a.status = AgentStatus::Killed;
        assert_eq!(check_kill(&a, &LifecycleConfig::default()), None);
    }

    fn flat(n: usize, pnl: f64) -> Vec<PerformanceSnapshot> {
        (0..n)
            .map(|_| PerformanceSnapshot {
                pnl,
                capital: 1_000.0,
            })
            .collect()
    }

    #[test]
    fn deep_drawdown_kills_at_any_age() {
        let mut history = rising(10);
        if let Some(last) = history.last_mut() {
            last.capital = 400.0;
        }
        let a = agent(1.0, 10, 0, history);
        assert_eq!(
            check_kill(&a, &LifecycleConfig::default()),
            Some(KillReason::Drawdown)
        );
    }

    #[test]
    fn negative_return_kills_only_from_its_age() {
        let config = LifecycleConfig::default();
        assert_eq!(
            check_kill(&agent(1.0, 90, 0, flat(10, -1.0)), &config),
            Some(KillReason::NegativeReturn)
        );
        assert_eq!(check_kill(&agent(1.0, 50, 0, flat(10, -1.0)), &config), None);
    }

    #[test]
    fn low_sharpe_kills_only_from_its_age() {
        let config = LifecycleConfig::default();
        assert_eq!(
            check_kill(&agent(1.0, 60, 0, flat(10, 0.0)), &config),
            Some(KillReason::LowSharpe)
        );
        assert_eq!(check_kill(&agent(1.0, 59, 0, flat(10, 0.0)), &config), None);
    }

    #[test]
    fn underperformance_wins_over_metric_gates() {
        let a = agent(-1.0, 120, 31, flat(10, -1.0));
        assert_eq!(
            check_kill(&a, &LifecycleConfig::default()),
            Some(KillReason::Underperformance)
        );
    }

    #[test]
    fn metric_gates_ignore_short_histories() {
        let mut history = rising(3);
        if let Some(last) = history.last_mut() {
            last.capital = 100.0;
        }
        assert_eq!(
            check_kill(&agent(1.0, 120, 0, history), &LifecycleConfig::default()),
            None
        );
    }

    #[test]
    fn disabled_metric_gates_never_fire() {
        let config = LifecycleConfig {
            kill_max_drawdown: None,
            kill_negative_return_age: None,
            kill_min_sharpe: None,
            ..LifecycleConfig::default()
        };
        let mut history = flat(10, -1.0);
        if let Some(last) = history.last_mut() {
            last.capital = 100.0;
        }
        assert_eq!(check_kill(&agent(1.0, 200, 0, history), &config), None);
    }

    #[test]
    fn graduation_happy_path() {
        let a = agent(2.5, 35, 0, rising(35));
        assert!(check_graduation(&a, &LifecycleConfig::default()).is_eligible());
    }

    #[test]
    fn graduation_rejects_young_or_weak_or_falling() {
        let config = LifecycleConfig::default();
        assert!(!check_graduation(&agent(2.5, 10, 0, rising(10)), &config).is_eligible());
        assert!(!check_graduation(&agent(1.5, 35, 0, rising(35)), &config).is_eligible());

        let mut falling = rising(35);
        falling.reverse();
        for s in &mut falling {
            s.pnl = -10.0;
        }
        assert!(!check_graduation(&agent(2.5, 35, 0, falling), &config).is_eligible());
    }

    #[test]
    fn graduation_needs_a_real_sharpe() {
        let check = check_graduation(&agent(2.5, 35, 0, flat(35, 10.0)), &LifecycleConfig::default());
        assert!(matches!(check, GraduationCheck::Ineligible(ref why) if why.starts_with("sharpe")));
    }

    #[test]
    fn graduation_needs_a_high_win_rate() {
        let history = (0..35_u32)
            .map(|i| PerformanceSnapshot {
                pnl: if i % 2 == 0 { 30.0 } else { -5.0 },
                capital: 1_000.0 + 12.5 * f64::from(i),
            })
            .collect();
        let check = check_graduation(&agent(2.5, 35, 0, history), &LifecycleConfig::default());
        assert!(matches!(check, GraduationCheck::Ineligible(ref why) if why.starts_with("win rate")));
    }

    #[test]
    fn graduation_rejects_a_past_drawdown() {
        let mut history = rising(35);
        if let Some(dip) = history.get_mut(10) {
            dip.capital = 700.0;
        }
        let a = agent(2.5, 35, 0, history.clone());
        let check = check_graduation(&a, &LifecycleConfig::default());
        assert!(matches!(check, GraduationCheck::Ineligible(ref why) if why.starts_with("drawdown")));

        let relaxed = LifecycleConfig {
            graduation_max_drawdown: None,
            ..LifecycleConfig::default()
        };
        assert!(check_graduation(&agent(2.5, 35, 0, history), &relaxed).is_eligible());
    }

    #[test]
    fn trend_needs_a_full_window() {
        assert!(!has_positive_trend(&rising(3), 7));
        assert!(has_positive_trend(&rising(7), 7));
        assert!(!has_positive_trend(&[], 0));
    }
}
