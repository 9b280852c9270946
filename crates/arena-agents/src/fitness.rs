//! Performance metrics and the multi-factor fitness score.
//!
//! All metrics read an agent's `performance_history`, one snapshot per
//! evaluation period. Period returns are `pnl / capital`; annualised figures
//! assume daily periods.
//!
//! ```text
//! fitness = 0.3 * total_return
//!         + 0.4 * sharpe
//!         - 0.2 * |max_drawdown|
//!         - 0.1 * volatility
//!         + 0.1 if win_rate > 0.65
//! ```
//!
//! Fitness stays at zero until [`MIN_FITNESS_SAMPLES`] periods exist.

use arena_types::PerformanceSnapshot;

/// Periods required before fitness is computed.
pub const MIN_FITNESS_SAMPLES: usize = 7;

/// Periods per year used for annualisation.
const PERIODS_PER_YEAR: f64 = 365.0;

const RETURN_WEIGHT: f64 = 0.3;
const SHARPE_WEIGHT: f64 = 0.4;
const DRAWDOWN_WEIGHT: f64 = 0.2;
const VOLATILITY_WEIGHT: f64 = 0.1;
const CONSISTENCY_WIN_RATE: f64 = 0.65;
const CONSISTENCY_BONUS: f64 = 0.1;

/// Every metric derived from one performance history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessMetrics {
    /// Compounded return over the whole history.
    pub total_return: f64,
    /// Annualised Sharpe ratio (risk-free rate zero).
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline of the capital curve (zero or negative).
    pub max_drawdown: f64,
    /// Annualised standard deviation of period returns.
    pub volatility: f64,
    /// Fraction of periods with positive P&L.
    pub win_rate: f64,
    /// Weighted combination of the above.
    pub fitness: f64,
}

impl FitnessMetrics {
    /// Compute every metric for `history`.
    pub fn from_history(history: &[PerformanceSnapshot]) -> Self {
        Self {
            total_return: total_return(history),
            sharpe_ratio: sharpe_ratio(history),
            max_drawdown: max_drawdown(history),
            volatility: volatility(history),
            win_rate: win_rate(history),
            fitness: fitness_score(history),
        }
    }
}

/// Multi-factor fitness; zero below [`MIN_FITNESS_SAMPLES`] periods.
pub fn fitness_score(history: &[PerformanceSnapshot]) -> f64 {
    if history.len() < MIN_FITNESS_SAMPLES {
        return 0.0;
    }
    let bonus = if win_rate(history) > CONSISTENCY_WIN_RATE {
        CONSISTENCY_BONUS
    } else {
        0.0
    };
    let score = total_return(history).mul_add(
        RETURN_WEIGHT,
        sharpe_ratio(history).mul_add(
            SHARPE_WEIGHT,
            (-max_drawdown(history).abs()).mul_add(
                DRAWDOWN_WEIGHT,
                (-volatility(history)).mul_add(VOLATILITY_WEIGHT, bonus),
            ),
        ),
    );
    if score.is_finite() { score } else { 0.0 }
}

/// Compounded return: `prod(1 + r) - 1`.
pub fn total_return(history: &[PerformanceSnapshot]) -> f64 {
    history
        .iter()
        .map(PerformanceSnapshot::period_return)
        .fold(1.0, |acc, r| acc * (1.0 + r))
        - 1.0
}

/// Annualised Sharpe ratio; zero with fewer than two periods or no variance.
pub fn sharpe_ratio(history: &[PerformanceSnapshot]) -> f64 {
    let Some((mean, std)) = mean_and_std(history) else {
        return 0.0;
    };
    if std <= f64::EPSILON {
        return 0.0;
    }
    mean / std * PERIODS_PER_YEAR.sqrt()
}

/// Annualised volatility; zero with fewer than two periods.
pub fn volatility(history: &[PerformanceSnapshot]) -> f64 {
    mean_and_std(history).map_or(0.0, |(_, std)| std * PERIODS_PER_YEAR.sqrt())
}

/// Largest relative decline from a running peak of the capital curve.
pub fn max_drawdown(history: &[PerformanceSnapshot]) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }
    let mut peak = f64::MIN;
    let mut worst: f64 = 0.0;
    for snap in history {
        peak = peak.max(snap.capital);
        if peak > 0.0 {
            worst = worst.min((snap.capital - peak) / peak);
        }
    }
    worst
}

/// Fraction of periods with positive P&L.
pub fn win_rate(history: &[PerformanceSnapshot]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let wins = history.iter().filter(|s| s.pnl > 0.0).count();
    wins as f64 / history.len() as f64
}

/// Population mean and standard deviation of period returns.
fn mean_and_std(history: &[PerformanceSnapshot]) -> Option<(f64, f64)> {
    if history.len() < 2 {
        return None;
    }
    let n = history.len() as f64;
    let returns = history.iter().map(PerformanceSnapshot::period_return);
    let mean = returns.clone().sum::<f64>() / n;
    let variance = returns.map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}
