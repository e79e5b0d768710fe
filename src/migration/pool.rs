//! Pool synthesis: turns a final legacy probability plus allocated liquidity
//! into a two-sided constant-product pool reproducing that probability.
//!
//! With `p = no / (yes + no)` and `sqrt(yes * no) = L`:
//!
//! ```text
//! no  = p * yes / (1 - p)
//! yes = sqrt(L^2 / (p / (1 - p)))
//! no  = L^2 / yes
//! ```

use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::domain::{
    LegacyMarket, LegacyOutcome, NewOutcome, ProbChanges, OTHER_ANSWER_TEXT,
};

/// Text of the free-response catch-all answer in legacy markets
pub const LEGACY_NONE_TEXT: &str = "None";

/// Legacy outcome id -> new outcome id
pub type OutcomeIdMap = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pool {
    pub yes: f64,
    pub no: f64,
}

impl Pool {
    pub fn probability(&self) -> f64 {
        self.no / (self.yes + self.no)
    }

    /// Geometric mean of the two sides
    pub fn liquidity(&self) -> f64 {
        (self.yes * self.no).sqrt()
    }
}

/// Solve for the pool whose ratio gives `prob` and whose geometric mean is `liquidity`
pub fn pool_for_probability(prob: f64, liquidity: f64) -> Pool {
    let yes = (liquidity.powi(2) / (prob / (1.0 - prob))).sqrt();
    let no = liquidity.powi(2) / yes;
    Pool { yes, no }
}

/// Nominal liquidity scaled down for extreme probabilities
pub fn effective_liquidity(prob: f64, nominal: f64) -> f64 {
    2.0 * prob.min(1.0 - prob) * nominal
}

/// Pari-mutuel probability of one outcome: its squared shares over the sum of squares
pub fn dpm_outcome_probability(total_shares: &BTreeMap<String, f64>, outcome_id: &str) -> f64 {
    let square_sum: f64 = total_shares.values().map(|s| s * s).sum();
    if square_sum <= 0.0 {
        return 0.0;
    }
    let shares = total_shares.get(outcome_id).copied().unwrap_or(0.0);
    shares * shares / square_sum
}

/// Keep a probability inside `[min_prob, 1 - min_prob]` so neither pool side is empty
pub fn clamp_probability(prob: f64, min_prob: f64) -> f64 {
    if prob.is_nan() {
        return min_prob;
    }
    prob.max(min_prob).min(1.0 - min_prob)
}

/// Stable id for the answer replacing `legacy_id`, so re-runs overwrite instead of duplicating
pub fn new_outcome_id(market_id: &str, legacy_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("answer/{market_id}/{legacy_id}").as_bytes())
        .simple()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct SynthesizedOutcomes {
    /// Same order as the legacy outcomes
    pub outcomes: Vec<NewOutcome>,
    pub id_map: OutcomeIdMap,
}

pub fn synthesize_outcomes(
    market: &LegacyMarket,
    legacy: &[LegacyOutcome],
    liquidity: &BTreeMap<String, f64>,
    min_prob: f64,
) -> SynthesizedOutcomes {
    let mut id_map = OutcomeIdMap::with_capacity(legacy.len());

    let outcomes = legacy
        .iter()
        .map(|answer| {
            let prob = clamp_probability(
                dpm_outcome_probability(&market.total_shares, &answer.id),
                min_prob,
            );
            let nominal = liquidity.get(&answer.id).copied().unwrap_or(0.0);
            let answer_liquidity = effective_liquidity(prob, nominal);
            let pool = pool_for_probability(prob, answer_liquidity);

            let is_other = market.is_free_response() && answer.text == LEGACY_NONE_TEXT;
            let id = new_outcome_id(&market.id, &answer.id);
            id_map.insert(answer.id.clone(), id.clone());

            NewOutcome {
                id,
                contract_id: market.id.clone(),
                legacy_answer_id: answer.id.clone(),
                text: if is_other {
                    OTHER_ANSWER_TEXT.to_string()
                } else {
                    answer.text.clone()
                },
                user_id: answer.user_id.clone(),
                created_time: answer.created_time,
                index: answer.number_index,
                is_other,
                pool_yes: pool.yes,
                pool_no: pool.no,
                prob,
                total_liquidity: answer_liquidity,
                subsidy_pool: 0.0,
                prob_changes: ProbChanges::default(),
            }
        })
        .collect();

    SynthesizedOutcomes { outcomes, id_map }
}
