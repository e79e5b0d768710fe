//! Pure assembly of everything a market's commit will write.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::bets::{translate_bets, SkippedBet};
use super::liquidity::allocate_liquidity;
use super::metrics::compute_market_metrics;
use super::normalize::normalize_probabilities;
use super::pool::synthesize_outcomes;
use super::reader::{ReadResult, RejectedRecord};
use super::resolution::remap_resolution;
use crate::config::MigrationConfig;
use crate::domain::{
    CpmmMultiMarket, LegacyMarket, LegacySnapshot, LiquidityRecord, NewBet, NewOutcome,
    Resolution, User, UserPositionMetric, CPMM_MULTI_MECHANISM, LEGACY_ONLY_FIELDS,
    MULTIPLE_CHOICE,
};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub snapshot: LegacySnapshot,
    pub resumed: bool,
    pub market: CpmmMultiMarket,
    /// Same order as `snapshot.outcomes`
    pub outcomes: Vec<NewOutcome>,
    pub bets: Vec<NewBet>,
    pub liquidity: Vec<LiquidityRecord>,
    pub metrics: Vec<UserPositionMetric>,
    pub skipped_bets: Vec<SkippedBet>,
    pub rejected_bets: Vec<RejectedRecord>,
    pub migrated_at: DateTime<Utc>,
}

impl MigrationPlan {
    pub fn market_id(&self) -> &str {
        &self.market.id
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.outcomes.iter().map(|o| o.prob).collect()
    }

    /// Bets that will not be written: skipped during translation or rejected on read
    pub fn anomaly_count(&self) -> usize {
        self.skipped_bets.len() + self.rejected_bets.len()
    }

    /// Ids of legacy bets removed from the live market instead of rewritten.
    /// Their documents stay in the archive.
    pub fn discarded_bet_ids(&self) -> Vec<&str> {
        self.skipped_bets
            .iter()
            .map(|s| s.bet_id.as_str())
            .chain(self.rejected_bets.iter().filter_map(|r| r.id.as_deref()))
            .collect()
    }
}

/// Distinct users with at least one bet on the market
pub fn bettor_ids(snapshot: &LegacySnapshot) -> Vec<String> {
    snapshot
        .bets
        .iter()
        .map(|b| b.user_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn build_plan(
    read: ReadResult,
    users: &[User],
    config: &MigrationConfig,
    migrated_at: DateTime<Utc>,
) -> Result<MigrationPlan> {
    let ReadResult {
        snapshot,
        rejected_bets,
        resumed,
    } = read;
    let market_id = snapshot.market.id.clone();

    let liquidity = allocate_liquidity(
        &snapshot.outcomes,
        &snapshot.bets,
        config.base_liquidity_per_bettor,
        config.flat_liquidity_share,
    );
    let total_liquidity: f64 = liquidity.values().sum();

    let synthesized =
        synthesize_outcomes(&snapshot.market, &snapshot.outcomes, &liquidity, config.min_prob);
    let outcomes = normalize_probabilities(&market_id, &synthesized.outcomes, config.sum_tolerance)?;

    let translated = translate_bets(&market_id, &snapshot.bets, &synthesized.id_map, config.min_prob);
    let resolution = remap_resolution(
        &market_id,
        snapshot.market.legacy_resolution().as_ref(),
        &synthesized.id_map,
    )?;

    let metrics = compute_market_metrics(
        &market_id,
        &outcomes,
        &translated.bets,
        resolution.as_ref(),
        users,
    );
    let liquidity_records = liquidity_records(
        &market_id,
        &outcomes,
        &config.house_liquidity_provider_id,
        migrated_at.timestamp_millis(),
    );
    let market = build_market_record(
        &snapshot.market,
        outcomes.clone(),
        total_liquidity,
        resolution.as_ref(),
    );

    Ok(MigrationPlan {
        snapshot,
        resumed,
        market,
        outcomes,
        bets: translated.bets,
        liquidity: liquidity_records,
        metrics,
        skipped_bets: translated.skipped,
        rejected_bets,
        migrated_at,
    })
}

/// The migrated market: legacy-only fields dropped, everything else carried over
pub fn build_market_record(
    legacy: &LegacyMarket,
    answers: Vec<NewOutcome>,
    total_liquidity: f64,
    resolution: Option<&Resolution>,
) -> CpmmMultiMarket {
    let mut extra = legacy.extra.clone();
    for field in LEGACY_ONLY_FIELDS {
        extra.remove(field);
    }

    CpmmMultiMarket {
        id: legacy.id.clone(),
        slug: legacy.slug.clone(),
        question: legacy.question.clone(),
        creator_username: legacy.creator_username.clone(),
        mechanism: CPMM_MULTI_MECHANISM.to_string(),
        outcome_type: MULTIPLE_CHOICE.to_string(),
        should_answers_sum_to_one: true,
        add_answers_mode: if legacy.is_free_response() {
            "ANYONE".to_string()
        } else {
            "DISABLED".to_string()
        },
        total_liquidity,
        subsidy_pool: 0.0,
        unique_bettor_count: legacy.unique_bettor_count,
        importance_score: legacy.importance_score,
        answers,
        resolution: resolution.map(|r| r.outcome().to_string()),
        resolutions: resolution.and_then(Resolution::resolutions),
        extra,
    }
}

/// One house-provided liquidity record per answer
pub fn liquidity_records(
    market_id: &str,
    outcomes: &[NewOutcome],
    provider_id: &str,
    created_time: i64,
) -> Vec<LiquidityRecord> {
    outcomes
        .iter()
        .map(|o| LiquidityRecord {
            id: Uuid::new_v5(
                &Uuid::NAMESPACE_OID,
                format!("liquidity/{market_id}/{}", o.id).as_bytes(),
            )
            .to_string(),
            contract_id: market_id.to_string(),
            answer_id: o.id.clone(),
            user_id: provider_id.to_string(),
            amount: o.total_liquidity,
            liquidity: o.total_liquidity,
            created_time,
        })
        .collect()
}
