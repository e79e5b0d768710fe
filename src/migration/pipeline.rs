//! Drives markets through read, plan, commit and revalidation.
//!
//! Markets run one at a time. A market that fails is logged and counted, and
//! the corpus run moves on to the next one.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use super::commit::Committer;
use super::plan::{bettor_ids, build_plan, MigrationPlan};
use super::reader::LegacyReader;
use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::stats::RunStats;
use crate::store::{MarketSink, MarketSource, PageInvalidator};

/// A market queued for migration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusEntry {
    pub market_id: String,
    pub question: String,
    pub url: String,
    /// Left behind by an interrupted commit
    pub resume: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerSummary {
    pub answer_id: String,
    pub text: String,
    pub prob: f64,
    pub pool_yes: f64,
    pub pool_no: f64,
    pub total_liquidity: f64,
}

/// What happened to one market
#[derive(Debug, Clone, Serialize)]
pub struct MarketReport {
    pub market_id: String,
    pub question: String,
    pub url: String,
    pub resumed: bool,
    pub dry_run: bool,
    pub resolution: Option<String>,
    pub answers: Vec<AnswerSummary>,
    pub bets: usize,
    pub skipped_bets: usize,
    pub metrics: usize,
    pub elapsed_ms: u64,
}

impl MarketReport {
    fn from_plan(plan: &MigrationPlan, site_url: &str, dry_run: bool) -> Self {
        let legacy = &plan.snapshot.market;
        Self {
            market_id: plan.market_id().to_string(),
            question: legacy.question.clone(),
            url: legacy.url(site_url),
            resumed: plan.resumed,
            dry_run,
            resolution: plan.market.resolution.clone(),
            answers: plan
                .outcomes
                .iter()
                .map(|o| AnswerSummary {
                    answer_id: o.id.clone(),
                    text: o.text.clone(),
                    prob: o.prob,
                    pool_yes: o.pool_yes,
                    pool_no: o.pool_no,
                    total_liquidity: o.total_liquidity,
                })
                .collect(),
            bets: plan.bets.len(),
            skipped_bets: plan.anomaly_count(),
            metrics: plan.metrics.len(),
            elapsed_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketFailure {
    pub market_id: String,
    pub question: String,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusReport {
    pub migrated: Vec<MarketReport>,
    pub failed: Vec<MarketFailure>,
    /// Stopped early on a shutdown request
    pub cancelled: bool,
}

pub struct MigrationPipeline<S: MarketSource + MarketSink + ?Sized> {
    store: Arc<S>,
    invalidator: Arc<dyn PageInvalidator>,
    config: MigrationConfig,
    stats: Arc<RunStats>,
}

impl<S: MarketSource + MarketSink + ?Sized> MigrationPipeline<S> {
    pub fn new(store: Arc<S>, invalidator: Arc<dyn PageInvalidator>, config: MigrationConfig) -> Self {
        Self {
            store,
            invalidator,
            config,
            stats: Arc::new(RunStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Read a market and compute everything its commit would write
    pub async fn plan_market(&self, market_id: &str) -> Result<MigrationPlan> {
        let read = LegacyReader::new(self.store.as_ref()).read(market_id).await?;
        let users = self.store.get_users(&bettor_ids(&read.snapshot)).await?;
        build_plan(read, &users, &self.config, Utc::now())
    }

    /// Migrate one market. With `dry_run` nothing is written.
    #[instrument(skip(self))]
    pub async fn migrate_market(&self, market_id: &str, dry_run: bool) -> Result<MarketReport> {
        let started = Instant::now();
        let watchdog = self.spawn_watchdog(market_id);
        let result = self.run_market(market_id, dry_run).await;
        watchdog.abort();

        match result {
            Ok(mut report) => {
                report.elapsed_ms = started.elapsed().as_millis() as u64;
                Ok(report)
            }
            Err(e) => {
                self.stats.inc_failed();
                Err(e)
            }
        }
    }

    async fn run_market(&self, market_id: &str, dry_run: bool) -> Result<MarketReport> {
        let plan = self.plan_market(market_id).await?;
        let report = MarketReport::from_plan(&plan, &self.config.site_url, dry_run);

        if plan.resumed {
            self.stats.inc_resumed();
        }
        self.stats.add_skipped_bets(plan.anomaly_count());

        if dry_run {
            self.stats.inc_dry_run();
            info!(
                question = %report.question,
                answers = plan.outcomes.len(),
                bets = plan.bets.len(),
                "Planned market (dry run)"
            );
            return Ok(report);
        }

        Committer::new(
            self.store.as_ref(),
            self.config.write_concurrency,
            self.config.legacy_retention,
        )
        .commit(&plan)
        .await?;

        // Only after every durable write; awaited so a finished run leaves no
        // request behind
        let path = plan.snapshot.market.path();
        let embed_path = format!("/embed{path}");
        futures::join!(
            self.invalidator.invalidate(&path),
            self.invalidator.invalidate(&embed_path)
        );

        self.stats.inc_migrated(plan.outcomes.len(), plan.bets.len());
        info!(url = %report.url, "Migrated market");
        Ok(report)
    }

    /// Failure record for `market_id`, with the question and URL when the
    /// market or its archive can still be read
    pub async fn describe_failure(&self, market_id: &str, err: &MigrationError) -> MarketFailure {
        let site_url = &self.config.site_url;
        let entry = match self.store.get_market(market_id).await {
            Ok(Some(doc)) => corpus_entry(&doc, site_url),
            _ => None,
        };
        let entry = match entry {
            Some(entry) => Some(entry),
            None => match self.store.get_archive(market_id).await {
                Ok(Some(archive)) => Some(CorpusEntry {
                    market_id: market_id.to_string(),
                    question: archive.snapshot.market.question.clone(),
                    url: archive.snapshot.market.url(site_url),
                    resume: true,
                }),
                _ => None,
            },
        };
        let (question, url) = entry
            .map(|e| (e.question, e.url))
            .unwrap_or_default();

        MarketFailure {
            market_id: market_id.to_string(),
            question,
            url,
            error: err.to_string(),
        }
    }

    fn spawn_watchdog(&self, market_id: &str) -> tokio::task::JoinHandle<()> {
        let secs = self.config.slow_market_warn_secs;
        let market_id = market_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(market_id = %market_id, "Market still migrating after {}s", secs);
        })
    }

    /// Markets the corpus run will visit, interrupted commits first, then
    /// legacy markets by bettor count with importance breaking ties
    pub async fn corpus(&self) -> Result<Vec<CorpusEntry>> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for archive in self.store.list_unfinished_archives().await? {
            let market = &archive.snapshot.market;
            if seen.insert(market.id.clone()) {
                entries.push(CorpusEntry {
                    market_id: market.id.clone(),
                    question: market.question.clone(),
                    url: market.url(&self.config.site_url),
                    resume: true,
                });
            }
        }

        for doc in self.store.list_legacy_markets(false).await? {
            let Some(entry) = corpus_entry(&doc, &self.config.site_url) else {
                warn!("Skipping legacy market without id");
                continue;
            };
            if seen.insert(entry.market_id.clone()) {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    /// Migrate every market in [`corpus`](Self::corpus) order.
    ///
    /// `shutdown` is checked between markets only; the market in progress
    /// always finishes.
    pub async fn run_corpus(
        &self,
        dry_run: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CorpusReport> {
        let entries = self.corpus().await?;
        let total = entries.len();
        info!(total, dry_run, "Starting corpus migration");

        let mut report = CorpusReport::default();
        for (i, entry) in entries.into_iter().enumerate() {
            if *shutdown.borrow() {
                warn!(remaining = total - i, "Shutdown requested, stopping corpus run");
                report.cancelled = true;
                break;
            }

            info!("[{}/{}] {} ({})", i + 1, total, entry.question, entry.url);
            match self.migrate_market(&entry.market_id, dry_run).await {
                Ok(market) => report.migrated.push(market),
                Err(e) if e.is_market_scoped() => {
                    error!(
                        market_id = %entry.market_id,
                        question = %entry.question,
                        url = %entry.url,
                        "Failed to migrate market: {}",
                        e
                    );
                    report.failed.push(MarketFailure {
                        market_id: entry.market_id,
                        question: entry.question,
                        url: entry.url,
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        self.stats.log_summary();
        Ok(report)
    }
}

fn corpus_entry(doc: &serde_json::Value, site_url: &str) -> Option<CorpusEntry> {
    let field = |name: &str| doc.get(name).and_then(|v| v.as_str()).unwrap_or_default();
    let market_id = doc.get("id").and_then(|v| v.as_str())?.to_string();
    Some(CorpusEntry {
        market_id,
        question: field("question").to_string(),
        url: format!(
            "{}/{}/{}",
            site_url.trim_end_matches('/'),
            field("creatorUsername"),
            field("slug")
        ),
        resume: false,
    })
}

/// Whether `err` means the market was not in a migratable state
pub fn is_precondition(err: &MigrationError) -> bool {
    matches!(
        err,
        MigrationError::Precondition { .. } | MigrationError::MarketNotFound(_)
    )
}
