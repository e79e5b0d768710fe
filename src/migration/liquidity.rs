//! Per-outcome subsidy derived from historical participation.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::domain::{LegacyBet, LegacyOutcome};

/// Liquidity per legacy outcome id.
///
/// Each distinct bettor on an outcome adds `base_per_bettor`; every outcome also
/// gets an even slice of `flat_share`, so outcomes nobody bet on still start with a pool.
pub fn allocate_liquidity(
    outcomes: &[LegacyOutcome],
    bets: &[LegacyBet],
    base_per_bettor: f64,
    flat_share: f64,
) -> BTreeMap<String, f64> {
    if outcomes.is_empty() {
        return BTreeMap::new();
    }

    let mut bettors: HashMap<&str, HashSet<&str>> = HashMap::new();
    for bet in bets {
        bettors
            .entry(bet.outcome_id.as_str())
            .or_default()
            .insert(bet.user_id.as_str());
    }

    let flat = flat_share / outcomes.len() as f64;
    outcomes
        .iter()
        .map(|o| {
            let unique = bettors.get(o.id.as_str()).map_or(0, |users| users.len());
            (o.id.clone(), base_per_bettor * unique as f64 + flat)
        })
        .collect()
}
