//! Store interfaces the migration reads from and writes to.
//!
//! Reads hand back raw JSON documents so that validation happens in one place,
//! the legacy reader. Writes take fully typed records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::LegacyRetention;
use crate::domain::{
    CpmmMultiMarket, LegacyArchive, LiquidityRecord, NewBet, NewOutcome, User, UserPositionMetric,
};
use crate::error::Result;

/// Read side of the market store
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Legacy multi-outcome markets, most important first
    async fn list_legacy_markets(&self, unresolved_only: bool) -> Result<Vec<serde_json::Value>>;

    /// The live market document, whatever its mechanism
    async fn get_market(&self, market_id: &str) -> Result<Option<serde_json::Value>>;

    async fn get_legacy_outcomes(&self, market_id: &str) -> Result<Vec<serde_json::Value>>;

    async fn get_legacy_bets(&self, market_id: &str) -> Result<Vec<serde_json::Value>>;

    /// Users that still exist among `user_ids`
    async fn get_users(&self, user_ids: &[String]) -> Result<Vec<User>>;

    async fn get_archive(&self, market_id: &str) -> Result<Option<LegacyArchive>>;

    /// Archives of commits that never finished, oldest first
    async fn list_unfinished_archives(&self) -> Result<Vec<LegacyArchive>>;
}

/// Write side of the market store. Every write is an upsert keyed by a deterministic id.
#[async_trait]
pub trait MarketSink: Send + Sync {
    async fn archive_legacy(&self, archive: &LegacyArchive) -> Result<()>;

    async fn write_market(&self, market: &CpmmMultiMarket) -> Result<()>;

    async fn delete_outcome(&self, market_id: &str, outcome_id: &str) -> Result<()>;

    async fn create_outcome(&self, outcome: &NewOutcome) -> Result<()>;

    async fn write_bet(&self, bet: &NewBet) -> Result<()>;

    async fn delete_bet(&self, market_id: &str, bet_id: &str) -> Result<()>;

    async fn create_liquidity(&self, liquidity: &LiquidityRecord) -> Result<()>;

    async fn write_user_position_metrics(&self, metrics: &[UserPositionMetric]) -> Result<()>;

    /// Mark the archive finished, or drop it, per `retention`
    async fn finish_archive(
        &self,
        market_id: &str,
        finished_at: DateTime<Utc>,
        retention: LegacyRetention,
    ) -> Result<()>;
}

/// Cache invalidation for a market's statically rendered pages.
///
/// Implementations must not block and must swallow their own failures.
#[async_trait]
pub trait PageInvalidator: Send + Sync {
    /// Never fails; problems are logged
    async fn invalidate(&self, path: &str);
}

/// Invalidator used when revalidation is disabled
#[derive(Debug, Default, Clone)]
pub struct NoopInvalidator;

#[async_trait]
impl PageInvalidator for NoopInvalidator {
    async fn invalidate(&self, path: &str) {
        tracing::debug!(path, "Revalidation disabled, skipping");
    }
}
