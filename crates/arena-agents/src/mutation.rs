//! Parameter mutation for children of top-performing agents.
//!
//! Each numeric parameter is scaled by `1 + u` where `u` is drawn uniformly
//! from `[-range, +range]`. Integer parameters stay integers (rounded, and
//! never crossing zero). Strings, lists, booleans, and objects are inherited
//! unchanged.

use std::collections::BTreeMap;

use rand::Rng;
use serde_json::{Number, Value};

use arena_types::{ParamDelta, Params};

use crate::error::AgentError;

/// Perturb every numeric parameter in `params`.
///
/// Returns the child's parameters and the before/after values of every
/// parameter that actually changed.
///
/// # Errors
///
/// Returns [`AgentError::InvalidMutationRange`] unless `range` is finite and
/// in `[0, 1)`.
pub fn mutate_params(
    params: &Params,
    range: f64,
    rng: &mut impl Rng,
) -> Result<(Params, BTreeMap<String, ParamDelta>), AgentError> {
    if !range.is_finite() || !(0.0..1.0).contains(&range) {
        return Err(AgentError::InvalidMutationRange(range));
    }

    let mut child = params.clone();
    let mut delta = BTreeMap::new();

    for (name, value) in &mut child {
        let Some(mutated) = mutate_value(value, range, rng) else {
            continue;
        };
        if mutated != *value {
            delta.insert(
                name.clone(),
                ParamDelta {
                    before: value.clone(),
                    after: mutated.clone(),
                },
            );
            *value = mutated;
        }
    }

    tracing::trace!(changed = delta.len(), "Parameters mutated");
    Ok((child, delta))
}

/// Mutate one value; `None` for non-numeric values.
fn mutate_value(value: &Value, range: f64, rng: &mut impl Rng) -> Option<Value> {
    let Value::Number(n) = value else {
        return None;
    };
    let factor = 1.0 + rng.random_range(-range..=range);

    if let Some(i) = n.as_i64() {
        let scaled = (i as f64 * factor).round();
        // Keep the sign of the parent and stay inside i64.
        let clamped = if i >= 0 {
            scaled.clamp(0.0, i64::MAX as f64)
        } else {
            scaled.clamp(i64::MIN as f64, 0.0)
        };
        #[allow(clippy::cast_possible_truncation)]
        return Some(Value::Number(Number::from(clamped as i64)));
    }
    if let Some(u) = n.as_u64() {
        let scaled = (u as f64 * factor).round().clamp(0.0, u64::MAX as f64);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        return Some(Value::Number(Number::from(scaled as u64)));
    }
    let f = n.as_f64()?;
    Number::from_f64(f * factor).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    use super::*;

    fn params() -> Params {
        let mut p = Params::new();
        p.insert("position_size".to_owned(), json!(0.25));
        p.insert("max_leverage".to_owned(), json!(2.0));
        p.insert("lookback_days".to_owned(), json!(30));
        p.insert("assets".to_owned(), json!(["BTC", "SOL"]));
        p
    }

    #[test]
    fn numeric_values_stay_within_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let Ok((child, _)) = mutate_params(&params(), 0.2, &mut rng) else {
                panic!("mutation failed");
            };
            let size = child
                .get("position_size")
                .and_then(Value::as_f64)
                .unwrap_or_default();
            assert!((0.2..=0.3).contains(&size), "position_size {size}");
            let days = child
                .get("lookback_days")
                .and_then(Value::as_i64)
                .unwrap_or_default();
            assert!((24..=36).contains(&days), "lookback_days {days}");
        }
    }

    #[test]
    fn non_numeric_values_are_inherited() {
        let mut rng = StdRng::seed_from_u64(1);
        let Ok((child, delta)) = mutate_params(&params(), 0.2, &mut rng) else {
            panic!("mutation failed");
        };
        assert_eq!(child.get("assets"), params().get("assets"));
        assert!(!delta.contains_key("assets"));
    }

    #[test]
    fn delta_lists_before_and_after() {
        let mut rng = StdRng::seed_from_u64(3);
        let Ok((child, delta)) = mutate_params(&params(), 0.2, &mut rng) else {
            panic!("mutation failed");
        };
        for (name, d) in &delta {
            assert_eq!(params().get(name), Some(&d.before));
            assert_eq!(child.get(name), Some(&d.after));
        }
    }

    #[test]
    fn same_seed_same_child() {
        let a = mutate_params(&params(), 0.2, &mut StdRng::seed_from_u64(42)).ok();
        let b = mutate_params(&params(), 0.2, &mut StdRng::seed_from_u64(42)).ok();
        assert_eq!(a.map(|(p, _)| p), b.map(|(p, _)| p));
    }

    #[test]
    fn zero_range_changes_nothing() {
        let mut rng = StdRng::seed_from_u64(9);
        let Ok((child, delta)) = mutate_params(&params(), 0.0, &mut rng) else {
            panic!("mutation failed");
        };
        assert_eq!(child, params());
        assert!(delta.is_empty());
    }

    #[test]
    fn invalid_range_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(mutate_params(&params(), -0.1, &mut rng).is_err());
        assert!(mutate_params(&params(), 1.5, &mut rng).is_err());
        assert!(mutate_params(&params(), f64::NAN, &mut rng).is_err());
    }
}
