//! Commit stage: writes a planned market to the store.
//!
//! Order: archive, market, answers (delete legacy, create new), bets,
//! removal of untranslated legacy bets, liquidity, user metrics, archive
//! finish. Every write is keyed by a deterministic id, so committing the same
//! plan again overwrites rather than duplicates.

use futures::stream::{self, TryStreamExt};
use tracing::{debug, info, instrument};

use super::plan::MigrationPlan;
use crate::config::LegacyRetention;
use crate::domain::LegacyArchive;
use crate::error::{CommitStep, MigrationError, Result};
use crate::store::MarketSink;

pub struct Committer<'a, W: MarketSink + ?Sized> {
    sink: &'a W,
    write_concurrency: usize,
    retention: LegacyRetention,
}

impl<'a, W: MarketSink + ?Sized> Committer<'a, W> {
    pub fn new(sink: &'a W, write_concurrency: usize, retention: LegacyRetention) -> Self {
        Self {
            sink,
            write_concurrency: write_concurrency.max(1),
            retention,
        }
    }

    #[instrument(skip(self, plan), fields(market_id = %plan.market_id()))]
    pub async fn commit(&self, plan: &MigrationPlan) -> Result<()> {
        let market_id = plan.market_id();
        let tag = |step: CommitStep| move |e: MigrationError| MigrationError::write_failed(market_id, step, e);

        // An interrupted run already archived the untouched legacy state
        if !plan.resumed {
            let archive = LegacyArchive {
                snapshot: plan.snapshot.clone(),
                rejected_bets: plan.rejected_bets.clone(),
                archived_at: plan.migrated_at,
                finished_at: None,
            };
            self.sink
                .archive_legacy(&archive)
                .await
                .map_err(tag(CommitStep::ArchiveLegacy))?;
        }

        self.sink
            .write_market(&plan.market)
            .await
            .map_err(tag(CommitStep::Market))?;
        debug!("Saved market");

        for (legacy, outcome) in plan.snapshot.outcomes.iter().zip(&plan.outcomes) {
            self.sink
                .delete_outcome(market_id, &legacy.id)
                .await
                .map_err(tag(CommitStep::DeleteOutcome))?;
            self.sink
                .create_outcome(outcome)
                .await
                .map_err(tag(CommitStep::CreateOutcome))?;
        }
        debug!(answers = plan.outcomes.len(), "Saved answers");

        stream::iter(plan.bets.iter().map(Ok::<_, MigrationError>))
            .try_for_each_concurrent(self.write_concurrency, |bet| async move {
                self.sink.write_bet(bet).await
            })
            .await
            .map_err(tag(CommitStep::Bets))?;
        debug!(bets = plan.bets.len(), "Saved bets");

        // Bets that were not translated must not linger in legacy shape
        let discarded = plan.discarded_bet_ids();
        for bet_id in &discarded {
            self.sink
                .delete_bet(market_id, bet_id)
                .await
                .map_err(tag(CommitStep::DeleteBet))?;
        }
        if !discarded.is_empty() {
            debug!(bets = discarded.len(), "Removed untranslated legacy bets");
        }

        for liquidity in &plan.liquidity {
            self.sink
                .create_liquidity(liquidity)
                .await
                .map_err(tag(CommitStep::Liquidity))?;
        }
        debug!("Saved liquidity");

        self.sink
            .write_user_position_metrics(&plan.metrics)
            .await
            .map_err(tag(CommitStep::Metrics))?;
        debug!(metrics = plan.metrics.len(), "Saved user metrics");

        self.sink
            .finish_archive(market_id, plan.migrated_at, self.retention)
            .await
            .map_err(tag(CommitStep::FinishArchive))?;

        info!(
            answers = plan.outcomes.len(),
            bets = plan.bets.len(),
            "Committed migrated market"
        );
        Ok(())
    }
}
