use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mechanism tag carried by legacy pari-mutuel markets
pub const DPM_MECHANISM: &str = "dpm-2";
pub const MULTIPLE_CHOICE: &str = "MULTIPLE_CHOICE";
pub const FREE_RESPONSE: &str = "FREE_RESPONSE";
/// Resolution value for a cancelled market
pub const CANCEL: &str = "CANCEL";
/// Resolution value for a weighted multi-outcome resolution
pub const MKT: &str = "MKT";

/// Fields only a pari-mutuel market carries; dropped from the migrated record
pub const LEGACY_ONLY_FIELDS: [&str; 3] = ["totalBets", "phantomShares", "pool"];

/// A legacy pari-mutuel multi-outcome market as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMarket {
    pub id: String,
    pub slug: String,
    pub question: String,
    pub creator_username: String,
    pub mechanism: String,
    pub outcome_type: String,
    /// Pari-mutuel shares outstanding per outcome id
    #[serde(default)]
    pub total_shares: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolutions: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub unique_bettor_count: u64,
    #[serde(default)]
    pub importance_score: f64,
    /// Every other property, passed through to the migrated record
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LegacyMarket {
    /// Path after the domain, e.g. "/alice/will-it-rain"
    pub fn path(&self) -> String {
        format!("/{}/{}", self.creator_username, self.slug)
    }

    pub fn url(&self, site_url: &str) -> String {
        format!("{}{}", site_url.trim_end_matches('/'), self.path())
    }

    pub fn is_legacy_multi(&self) -> bool {
        self.mechanism == DPM_MECHANISM
            && (self.outcome_type == MULTIPLE_CHOICE || self.outcome_type == FREE_RESPONSE)
    }

    pub fn is_free_response(&self) -> bool {
        self.outcome_type == FREE_RESPONSE
    }

    /// Typed view of the legacy resolution fields
    pub fn legacy_resolution(&self) -> Option<LegacyResolution> {
        if self.resolution.as_deref() == Some(CANCEL) {
            return Some(LegacyResolution::Cancel);
        }
        if let Some(weights) = &self.resolutions {
            return Some(LegacyResolution::Weighted(weights.clone()));
        }
        self.resolution
            .as_ref()
            .map(|outcome_id| LegacyResolution::Single(outcome_id.clone()))
    }
}

/// Resolution shapes a legacy market can carry
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyResolution {
    Cancel,
    Single(String),
    /// Legacy outcome id -> weight
    Weighted(BTreeMap<String, f64>),
}

/// One answer of a legacy market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyOutcome {
    pub id: String,
    pub text: String,
    pub created_time: i64,
    #[serde(rename = "number")]
    pub number_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Reference from a sale bet to the position it unwinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRef {
    pub bet_id: String,
    #[serde(default)]
    pub amount: f64,
}

/// A bet on a legacy market. `outcome` holds the answer id it was placed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBet {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "outcome")]
    pub outcome_id: String,
    pub amount: f64,
    pub prob_before: f64,
    pub prob_after: f64,
    pub created_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale: Option<SaleRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl LegacyBet {
    pub fn sale_of_bet_id(&self) -> Option<&str> {
        self.sale.as_ref().map(|s| s.bet_id.as_str())
    }

    /// Reject values that would poison share arithmetic downstream
    pub fn validate(&self) -> Result<(), String> {
        if !self.amount.is_finite() {
            return Err(format!("bet {} has non-finite amount", self.id));
        }
        for (name, p) in [("probBefore", self.prob_before), ("probAfter", self.prob_after)] {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(format!("bet {} has {} outside [0, 1]: {}", self.id, name, p));
            }
        }
        Ok(())
    }
}

/// Everything read for one legacy market. Outcomes are ordered by `number_index`,
/// bets by `created_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySnapshot {
    pub market: LegacyMarket,
    pub outcomes: Vec<LegacyOutcome>,
    pub bets: Vec<LegacyBet>,
}

impl LegacySnapshot {
    pub fn market_id(&self) -> &str {
        &self.market.id
    }
}

/// A legacy bet document that failed validation, kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRecord {
    pub id: Option<String>,
    pub reason: String,
    pub document: serde_json::Value,
}

/// Pre-commit copy of a legacy market, used to resume an interrupted commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyArchive {
    pub snapshot: LegacySnapshot,
    /// Bet documents the snapshot could not hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_bets: Vec<RejectedRecord>,
    pub archived_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl LegacyArchive {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn market_json() -> serde_json::Value {
        json!({
            "id": "m1",
            "slug": "who-wins",
            "question": "Who wins?",
            "creatorUsername": "alice",
            "mechanism": "dpm-2",
            "outcomeType": "FREE_RESPONSE",
            "totalShares": { "a1": 10.0, "a2": 20.0 },
            "totalBets": { "a1": 5.0 },
            "pool": { "a1": 5.0 },
            "closeTime": 1700000000000_i64
        })
    }

    #[test]
    fn test_market_parses_with_passthrough_fields() {
        let market: LegacyMarket = serde_json::from_value(market_json()).unwrap();
        assert!(market.is_legacy_multi());
        assert!(market.is_free_response());
        assert_eq!(market.total_shares.len(), 2);
        assert!(market.extra.contains_key("closeTime"));
        assert!(market.extra.contains_key("pool"));
        assert_eq!(market.url("https://manifold.markets/"), "https://manifold.markets/alice/who-wins");
    }

    #[test]
    fn test_legacy_resolution_shapes() {
        let mut market: LegacyMarket = serde_json::from_value(market_json()).unwrap();
        assert_eq!(market.legacy_resolution(), None);

        market.resolution = Some("a1".to_string());
        assert_eq!(market.legacy_resolution(), Some(LegacyResolution::Single("a1".to_string())));

        market.resolution = Some(MKT.to_string());
        market.resolutions = Some(BTreeMap::from([("a1".to_string(), 60.0), ("a2".to_string(), 40.0)]));
        assert!(matches!(market.legacy_resolution(), Some(LegacyResolution::Weighted(w)) if w.len() == 2));

        market.resolution = Some(CANCEL.to_string());
        assert_eq!(market.legacy_resolution(), Some(LegacyResolution::Cancel));
    }

    #[test]
    fn test_bet_missing_required_field_is_rejected() {
        let raw = json!({ "id": "b1", "userId": "u1", "outcome": "a1", "amount": 10.0, "createdTime": 1 });
        assert!(serde_json::from_value::<LegacyBet>(raw).is_err());
    }

    #[test]
    fn test_bet_validate_probability_range() {
        let bet: LegacyBet = serde_json::from_value(json!({
            "id": "b1", "userId": "u1", "outcome": "a1", "amount": 10.0,
            "probBefore": 0.2, "probAfter": 1.4, "createdTime": 1
        }))
        .unwrap();
        assert!(bet.validate().is_err());
    }
}
