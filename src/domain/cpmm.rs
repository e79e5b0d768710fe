use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::legacy::{CANCEL, MKT};

pub const CPMM_MULTI_MECHANISM: &str = "cpmm-multi-1";
/// Direction every migrated bet is expressed in
pub const YES: &str = "YES";
/// Label given to a free-response market's catch-all answer
pub const OTHER_ANSWER_TEXT: &str = "Other";
/// Payout weight of a single winning answer
pub const FULL_RESOLUTION_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbChanges {
    pub day: f64,
    pub week: f64,
    pub month: f64,
}

/// An answer of a constant-product multi-outcome market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOutcome {
    pub id: String,
    pub contract_id: String,
    /// Id of the legacy answer this one replaces
    pub legacy_answer_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_time: i64,
    pub index: i64,
    pub is_other: bool,
    pub pool_yes: f64,
    pub pool_no: f64,
    pub prob: f64,
    pub total_liquidity: f64,
    pub subsidy_pool: f64,
    pub prob_changes: ProbChanges,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    pub creator_fee: f64,
    pub platform_fee: f64,
    pub liquidity_fee: f64,
}

/// A bet re-expressed as a constant-product share purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBet {
    pub id: String,
    pub user_id: String,
    pub contract_id: String,
    pub answer_id: String,
    pub amount: f64,
    pub shares: f64,
    pub outcome: String,
    pub prob_before: f64,
    pub prob_after: f64,
    pub created_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_amount: Option<f64>,
    pub fees: Fees,
    pub is_api: bool,
    pub is_ante: bool,
    pub is_redemption: bool,
    pub visibility: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

/// Resolution of a migrated market, keyed by new answer ids
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Cancel,
    Single { answer_id: String },
    /// New answer id -> weight
    Weighted(BTreeMap<String, f64>),
}

impl Resolution {
    /// Value of the market's `resolution` field
    pub fn outcome(&self) -> &str {
        match self {
            Resolution::Cancel => CANCEL,
            Resolution::Single { answer_id } => answer_id,
            Resolution::Weighted(_) => MKT,
        }
    }

    /// Value of the market's `resolutions` field
    pub fn resolutions(&self) -> Option<BTreeMap<String, f64>> {
        match self {
            Resolution::Cancel => None,
            Resolution::Single { answer_id } => {
                Some(BTreeMap::from([(answer_id.clone(), FULL_RESOLUTION_WEIGHT)]))
            }
            Resolution::Weighted(weights) => Some(weights.clone()),
        }
    }

    /// Fraction of one share's value paid out on `answer_id`; None when cancelled
    pub fn payout_fraction(&self, answer_id: &str) -> Option<f64> {
        let weights = self.resolutions()?;
        let total: f64 = weights.values().sum();
        if total <= 0.0 {
            return Some(0.0);
        }
        Some(weights.get(answer_id).copied().unwrap_or(0.0) / total)
    }
}

/// Migrated market record. Properties not modelled here pass through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpmmMultiMarket {
    pub id: String,
    pub slug: String,
    pub question: String,
    pub creator_username: String,
    pub mechanism: String,
    pub outcome_type: String,
    pub should_answers_sum_to_one: bool,
    pub add_answers_mode: String,
    pub total_liquidity: f64,
    pub subsidy_pool: f64,
    pub unique_bettor_count: u64,
    pub importance_score: f64,
    pub answers: Vec<NewOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolutions: Option<BTreeMap<String, f64>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Subsidy seeded into one answer's pool by the house account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityRecord {
    pub id: String,
    pub contract_id: String,
    pub answer_id: String,
    pub user_id: String,
    pub amount: f64,
    pub liquidity: f64,
    pub created_time: i64,
}

/// A user's aggregate position on one answer, or on the whole market when `answer_id` is None
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPositionMetric {
    pub user_id: String,
    pub contract_id: String,
    pub answer_id: Option<String>,
    /// Net signed amount still at risk
    pub invested: f64,
    pub total_shares: f64,
    pub has_shares: bool,
    pub total_amount_invested: f64,
    pub total_amount_sold: f64,
    pub payout: f64,
    pub profit: f64,
    pub profit_percent: f64,
    pub loan: f64,
    pub last_bet_time: i64,
    pub last_prob: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_resolution_has_one_full_weight() {
        let resolution = Resolution::Single {
            answer_id: "n1".to_string(),
        };
        assert_eq!(resolution.outcome(), "n1");
        let weights = resolution.resolutions().unwrap();
        assert_eq!(weights.len(), 1);
        assert_eq!(weights["n1"], 100.0);
        assert_eq!(resolution.payout_fraction("n1"), Some(1.0));
        assert_eq!(resolution.payout_fraction("n2"), Some(0.0));
    }

    #[test]
    fn test_weighted_payout_fraction() {
        let resolution = Resolution::Weighted(BTreeMap::from([
            ("n1".to_string(), 75.0),
            ("n2".to_string(), 25.0),
        ]));
        assert_eq!(resolution.outcome(), "MKT");
        assert_eq!(resolution.payout_fraction("n2"), Some(0.25));
        assert_eq!(Resolution::Cancel.payout_fraction("n1"), None);
    }
}
