//! Strategy templates: default parameters per strategy name.
//!
//! The arena never runs trading logic; a template only names a strategy and
//! supplies the parameters a fresh agent starts with. Callers may override
//! any subset of them at spawn time.

use serde_json::json;

use arena_types::Params;

use crate::error::AgentError;

/// Source of `strategy_name -> default params`.
pub trait StrategyTemplates: Send + Sync {
    /// Default parameters for `strategy_name`, or `None` if unknown.
    fn defaults(&self, strategy_name: &str) -> Option<Params>;

    /// Every strategy this provider knows, sorted.
    fn strategies(&self) -> Vec<String>;
}

/// Yield farming across lending and stable-swap protocols.
pub const DEFI_YIELD_FARMER: &str = "DeFi-Yield-Farmer";

/// Cycle-aware BTC/SOL trading on MVRV signals.
pub const TACTICAL_TRADER: &str = "Tactical-Trader";

/// The two built-in strategy templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplates;

impl StrategyTemplates for BuiltinTemplates {
    fn defaults(&self, strategy_name: &str) -> Option<Params> {
        let pairs = match strategy_name {
            DEFI_YIELD_FARMER => vec![
                ("target_apy", json!(0.08)),
                ("rebalance_threshold", json!(0.02)),
                ("protocols", json!(["aave", "pendle", "curve"])),
                ("max_protocol_allocation", json!(0.4)),
            ],
            TACTICAL_TRADER => vec![
                ("mvrv_buy_threshold", json!(2.0)),
                ("mvrv_sell_threshold", json!(3.5)),
                ("position_size", json!(0.25)),
                ("max_leverage", json!(2.0)),
                ("assets", json!(["BTC", "SOL"])),
            ],
            _ => return None,
        };
        Some(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        )
    }

    fn strategies(&self) -> Vec<String> {
        let mut names = vec![DEFI_YIELD_FARMER.to_owned(), TACTICAL_TRADER.to_owned()];
        names.sort();
        names
    }
}

/// Merge caller overrides over the template defaults for `strategy_name`.
///
/// # Errors
///
/// Returns [`AgentError::UnknownStrategy`] if no template exists.
pub fn resolve_params(
    templates: &dyn StrategyTemplates,
    strategy_name: &str,
    overrides: Option<Params>,
) -> Result<Params, AgentError> {
    let mut params = templates
        .defaults(strategy_name)
        .ok_or_else(|| AgentError::UnknownStrategy(strategy_name.to_owned()))?;
    params.extend(overrides.unwrap_or_default());
    Ok(params)
}
