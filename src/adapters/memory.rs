//! In-process store holding documents in ordered maps.
//!
//! Used for dry runs and tests. Writes can be made to fail at a chosen
//! commit step to exercise interrupted commits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::config::LegacyRetention;
use crate::domain::{
    CpmmMultiMarket, LegacyArchive, LiquidityRecord, NewBet, NewOutcome, User, UserPositionMetric,
};
use crate::error::{CommitStep, MigrationError, Result};
use crate::store::{MarketSink, MarketSource};

type MetricKey = (String, String, Option<String>);

/// Full contents of an [`InMemoryStore`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub markets: BTreeMap<String, serde_json::Value>,
    /// market id -> legacy answer id -> answer
    pub legacy_outcomes: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    /// market id -> answer id -> migrated answer
    pub outcomes: BTreeMap<String, BTreeMap<String, NewOutcome>>,
    /// market id -> bet id -> bet (legacy until overwritten)
    pub bets: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    pub liquidity: BTreeMap<String, BTreeMap<String, LiquidityRecord>>,
    pub metrics: BTreeMap<MetricKey, UserPositionMetric>,
    pub users: BTreeMap<String, User>,
    pub archives: BTreeMap<String, LegacyArchive>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    fail_at: RwLock<Option<CommitStep>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: StoreState) -> Self {
        Self {
            state: RwLock::new(state),
            fail_at: RwLock::new(None),
        }
    }

    pub async fn insert_market(&self, market: serde_json::Value) -> Result<()> {
        let id = doc_id(&market)?;
        self.state.write().await.markets.insert(id, market);
        Ok(())
    }

    pub async fn insert_legacy_outcome(&self, market_id: &str, answer: serde_json::Value) -> Result<()> {
        let id = doc_id(&answer)?;
        self.state
            .write()
            .await
            .legacy_outcomes
            .entry(market_id.to_string())
            .or_default()
            .insert(id, answer);
        Ok(())
    }

    pub async fn insert_bet(&self, market_id: &str, bet: serde_json::Value) -> Result<()> {
        let id = doc_id(&bet)?;
        self.state
            .write()
            .await
            .bets
            .entry(market_id.to_string())
            .or_default()
            .insert(id, bet);
        Ok(())
    }

    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id.clone(), user);
    }

    /// Make every write belonging to `step` fail until cleared
    pub async fn fail_at(&self, step: Option<CommitStep>) {
        *self.fail_at.write().await = step;
    }

    pub async fn state(&self) -> StoreState {
        self.state.read().await.clone()
    }

    async fn check(&self, step: CommitStep) -> Result<()> {
        if *self.fail_at.read().await == Some(step) {
            return Err(MigrationError::Internal(format!("injected failure at {step}")));
        }
        Ok(())
    }
}

fn doc_id(doc: &serde_json::Value) -> Result<String> {
    doc.get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| MigrationError::InvalidRecord("document without id".to_string()))
}

fn field_str<'a>(doc: &'a serde_json::Value, field: &str) -> &'a str {
    doc.get(field).and_then(|v| v.as_str()).unwrap_or_default()
}

fn field_f64(doc: &serde_json::Value, field: &str) -> f64 {
    doc.get(field).and_then(|v| v.as_f64()).unwrap_or_default()
}

#[async_trait]
impl MarketSource for InMemoryStore {
    async fn list_legacy_markets(&self, unresolved_only: bool) -> Result<Vec<serde_json::Value>> {
        let state = self.state.read().await;
        let mut markets: Vec<serde_json::Value> = state
            .markets
            .values()
            .filter(|m| field_str(m, "mechanism") == crate::domain::DPM_MECHANISM)
            .filter(|m| {
                matches!(
                    field_str(m, "outcomeType"),
                    crate::domain::MULTIPLE_CHOICE | crate::domain::FREE_RESPONSE
                )
            })
            .filter(|m| !unresolved_only || m.get("resolution").map_or(true, |r| r.is_null()))
            .cloned()
            .collect();

        markets.sort_by(|a, b| {
            field_f64(b, "uniqueBettorCount")
                .total_cmp(&field_f64(a, "uniqueBettorCount"))
                .then(field_f64(b, "importanceScore").total_cmp(&field_f64(a, "importanceScore")))
        });
        Ok(markets)
    }

    async fn get_market(&self, market_id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.state.read().await.markets.get(market_id).cloned())
    }

    async fn get_legacy_outcomes(&self, market_id: &str) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .state
            .read()
            .await
            .legacy_outcomes
            .get(market_id)
            .map(|answers| answers.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_legacy_bets(&self, market_id: &str) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .state
            .read()
            .await
            .bets
            .get(market_id)
            .map(|bets| bets.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_users(&self, user_ids: &[String]) -> Result<Vec<User>> {
        let state = self.state.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn get_archive(&self, market_id: &str) -> Result<Option<LegacyArchive>> {
        Ok(self.state.read().await.archives.get(market_id).cloned())
    }

    async fn list_unfinished_archives(&self) -> Result<Vec<LegacyArchive>> {
        let mut archives: Vec<LegacyArchive> = self
            .state
            .read()
            .await
            .archives
            .values()
            .filter(|a| !a.is_finished())
            .cloned()
            .collect();
        archives.sort_by_key(|a| a.archived_at);
        Ok(archives)
    }
}

#[async_trait]
impl MarketSink for InMemoryStore {
    async fn archive_legacy(&self, archive: &LegacyArchive) -> Result<()> {
        self.check(CommitStep::ArchiveLegacy).await?;
        self.state
            .write()
            .await
            .archives
            .insert(archive.snapshot.market.id.clone(), archive.clone());
        Ok(())
    }

    async fn write_market(&self, market: &CpmmMultiMarket) -> Result<()> {
        self.check(CommitStep::Market).await?;
        let doc = serde_json::to_value(market)?;
        self.state.write().await.markets.insert(market.id.clone(), doc);
        Ok(())
    }

    async fn delete_outcome(&self, market_id: &str, outcome_id: &str) -> Result<()> {
        self.check(CommitStep::DeleteOutcome).await?;
        if let Some(answers) = self.state.write().await.legacy_outcomes.get_mut(market_id) {
            answers.remove(outcome_id);
        }
        Ok(())
    }

    async fn create_outcome(&self, outcome: &NewOutcome) -> Result<()> {
        self.check(CommitStep::CreateOutcome).await?;
        self.state
            .write()
            .await
            .outcomes
            .entry(outcome.contract_id.clone())
            .or_default()
            .insert(outcome.id.clone(), outcome.clone());
        Ok(())
    }

    async fn write_bet(&self, bet: &NewBet) -> Result<()> {
        self.check(CommitStep::Bets).await?;
        let doc = serde_json::to_value(bet)?;
        self.state
            .write()
            .await
            .bets
            .entry(bet.contract_id.clone())
            .or_default()
            .insert(bet.id.clone(), doc);
        Ok(())
    }

    async fn delete_bet(&self, market_id: &str, bet_id: &str) -> Result<()> {
        self.check(CommitStep::DeleteBet).await?;
        if let Some(bets) = self.state.write().await.bets.get_mut(market_id) {
            bets.remove(bet_id);
        }
        Ok(())
    }

    async fn create_liquidity(&self, liquidity: &LiquidityRecord) -> Result<()> {
        self.check(CommitStep::Liquidity).await?;
        self.state
            .write()
            .await
            .liquidity
            .entry(liquidity.contract_id.clone())
            .or_default()
            .insert(liquidity.id.clone(), liquidity.clone());
        Ok(())
    }

    async fn write_user_position_metrics(&self, metrics: &[UserPositionMetric]) -> Result<()> {
        self.check(CommitStep::Metrics).await?;
        let mut state = self.state.write().await;
        for metric in metrics {
            let key = (
                metric.user_id.clone(),
                metric.contract_id.clone(),
                metric.answer_id.clone(),
            );
            state.metrics.insert(key, metric.clone());
        }
        Ok(())
    }

    async fn finish_archive(
        &self,
        market_id: &str,
        finished_at: DateTime<Utc>,
        retention: LegacyRetention,
    ) -> Result<()> {
        self.check(CommitStep::FinishArchive).await?;
        let mut state = self.state.write().await;
        match retention {
            LegacyRetention::Retain => {
                if let Some(archive) = state.archives.get_mut(market_id) {
                    archive.finished_at = Some(finished_at);
                }
            }
            LegacyRetention::Discard => {
                state.archives.remove(market_id);
            }
        }
        Ok(())
    }
}
