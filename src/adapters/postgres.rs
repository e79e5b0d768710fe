use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info, instrument, warn};

use crate::config::LegacyRetention;
use crate::domain::{
    CpmmMultiMarket, LegacyArchive, LegacySnapshot, LiquidityRecord, NewBet, NewOutcome,
    RejectedRecord, User, UserPositionMetric, DPM_MECHANISM, FREE_RESPONSE, MULTIPLE_CHOICE,
};
use crate::error::Result;
use crate::store::{MarketSink, MarketSource};

/// PostgreSQL storage adapter. Documents live in JSONB `data` columns; the
/// columns next to them exist for filtering and ordering.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_documents(&self, sql: &str, market_id: &str) -> Result<Vec<serde_json::Value>> {
        let rows = sqlx::query(sql).bind(market_id).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<serde_json::Value, _>("data").map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl MarketSource for PostgresStore {
    #[instrument(skip(self))]
    async fn list_legacy_markets(&self, unresolved_only: bool) -> Result<Vec<serde_json::Value>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM contracts
            WHERE mechanism = $1
              AND outcome_type IN ($2, $3)
              AND ($4 = FALSE OR resolution IS NULL)
            ORDER BY unique_bettor_count DESC, importance_score DESC
            "#,
        )
        .bind(DPM_MECHANISM)
        .bind(MULTIPLE_CHOICE)
        .bind(FREE_RESPONSE)
        .bind(unresolved_only)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} legacy markets", rows.len());
        rows.iter()
            .map(|row| row.try_get::<serde_json::Value, _>("data").map_err(Into::into))
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_market(&self, market_id: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT data FROM contracts WHERE id = $1")
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("data")))
    }

    #[instrument(skip(self))]
    async fn get_legacy_outcomes(&self, market_id: &str) -> Result<Vec<serde_json::Value>> {
        self.fetch_documents(
            "SELECT data FROM contract_answers WHERE contract_id = $1",
            market_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_legacy_bets(&self, market_id: &str) -> Result<Vec<serde_json::Value>> {
        self.fetch_documents(
            "SELECT data FROM contract_bets WHERE contract_id = $1 ORDER BY created_time ASC",
            market_id,
        )
        .await
    }

    #[instrument(skip(self, user_ids), fields(count = user_ids.len()))]
    async fn get_users(&self, user_ids: &[String]) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT id, data FROM users WHERE id = ANY($1)")
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await?;

        let users = rows
            .iter()
            .filter_map(|row| {
                let id: String = row.get("id");
                match serde_json::from_value::<User>(row.get("data")) {
                    Ok(user) => Some(user),
                    Err(e) => {
                        warn!(user_id = %id, "Skipping malformed user record: {}", e);
                        None
                    }
                }
            })
            .collect();

        Ok(users)
    }

    #[instrument(skip(self))]
    async fn get_archive(&self, market_id: &str) -> Result<Option<LegacyArchive>> {
        let row = sqlx::query(
            r#"
            SELECT data, rejected_bets, archived_at, finished_at
            FROM dpm_migration_archive WHERE contract_id = $1
            "#,
        )
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(archive_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_unfinished_archives(&self) -> Result<Vec<LegacyArchive>> {
        let rows = sqlx::query(
            r#"
            SELECT data, rejected_bets, archived_at, finished_at
            FROM dpm_migration_archive
            WHERE finished_at IS NULL
            ORDER BY archived_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(archive_from_row).collect()
    }
}

fn archive_from_row(row: &PgRow) -> Result<LegacyArchive> {
    let snapshot: LegacySnapshot = serde_json::from_value(row.try_get("data")?)?;
    let rejected_bets: Vec<RejectedRecord> = serde_json::from_value(row.try_get("rejected_bets")?)?;
    Ok(LegacyArchive {
        snapshot,
        rejected_bets,
        archived_at: row.try_get("archived_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

#[async_trait]
impl MarketSink for PostgresStore {
    #[instrument(skip(self, archive), fields(market_id = %archive.snapshot.market.id))]
    async fn archive_legacy(&self, archive: &LegacyArchive) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dpm_migration_archive
                (contract_id, data, rejected_bets, archived_at, finished_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (contract_id) DO UPDATE SET
                data = EXCLUDED.data,
                rejected_bets = EXCLUDED.rejected_bets,
                archived_at = EXCLUDED.archived_at,
                finished_at = EXCLUDED.finished_at
            "#,
        )
        .bind(&archive.snapshot.market.id)
        .bind(Json(&archive.snapshot))
        .bind(Json(&archive.rejected_bets))
        .bind(archive.archived_at)
        .bind(archive.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, market), fields(market_id = %market.id))]
    async fn write_market(&self, market: &CpmmMultiMarket) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contracts
                (id, data, mechanism, outcome_type, resolution, importance_score, unique_bettor_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                data = EXCLUDED.data,
                mechanism = EXCLUDED.mechanism,
                outcome_type = EXCLUDED.outcome_type,
                resolution = EXCLUDED.resolution,
                importance_score = EXCLUDED.importance_score,
                unique_bettor_count = EXCLUDED.unique_bettor_count
            "#,
        )
        .bind(&market.id)
        .bind(Json(market))
        .bind(&market.mechanism)
        .bind(&market.outcome_type)
        .bind(&market.resolution)
        .bind(market.importance_score)
        .bind(market.unique_bettor_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_outcome(&self, market_id: &str, outcome_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM contract_answers WHERE contract_id = $1 AND answer_id = $2")
            .bind(market_id)
            .bind(outcome_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_outcome(&self, outcome: &NewOutcome) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contract_answers_cpmm (contract_id, answer_id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (contract_id, answer_id) DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(&outcome.contract_id)
        .bind(&outcome.id)
        .bind(Json(outcome))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_bet(&self, bet: &NewBet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contract_bets (contract_id, bet_id, created_time, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (contract_id, bet_id) DO UPDATE SET
                created_time = EXCLUDED.created_time,
                data = EXCLUDED.data
            "#,
        )
        .bind(&bet.contract_id)
        .bind(&bet.id)
        .bind(bet.created_time)
        .bind(Json(bet))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_bet(&self, market_id: &str, bet_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM contract_bets WHERE contract_id = $1 AND bet_id = $2")
            .bind(market_id)
            .bind(bet_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_liquidity(&self, liquidity: &LiquidityRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contract_liquidity (contract_id, liquidity_id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (contract_id, liquidity_id) DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(&liquidity.contract_id)
        .bind(&liquidity.id)
        .bind(Json(liquidity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn write_user_position_metrics(&self, metrics: &[UserPositionMetric]) -> Result<()> {
        if metrics.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for metric in metrics {
            sqlx::query(
                r#"
                INSERT INTO user_contract_metrics (user_id, contract_id, answer_id, data)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, contract_id, answer_id) DO UPDATE SET data = EXCLUDED.data
                "#,
            )
            .bind(&metric.user_id)
            .bind(&metric.contract_id)
            // Empty answer id marks the market-wide summary row
            .bind(metric.answer_id.as_deref().unwrap_or(""))
            .bind(Json(metric))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Upserted {} user contract metrics", metrics.len());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn finish_archive(
        &self,
        market_id: &str,
        finished_at: DateTime<Utc>,
        retention: LegacyRetention,
    ) -> Result<()> {
        let query = match retention {
            LegacyRetention::Retain => {
                sqlx::query("UPDATE dpm_migration_archive SET finished_at = $2 WHERE contract_id = $1")
                    .bind(market_id)
                    .bind(finished_at)
            }
            LegacyRetention::Discard => {
                sqlx::query("DELETE FROM dpm_migration_archive WHERE contract_id = $1").bind(market_id)
            }
        };
        query.execute(&self.pool).await?;
        Ok(())
    }
}
