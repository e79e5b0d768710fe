//! Command runners. Each returns whether the run fully succeeded so the
//! binary can pick its exit code.

use std::path::Path;
use tokio::sync::watch;

use super::output::{self, AnswerRow, CorpusRow, FailureRow, MarketRow, OutputMode};
use crate::migration::pipeline::is_precondition;
use crate::migration::{dump_legacy_markets, MigrationPipeline};
use crate::store::{MarketSink, MarketSource};

/// Migrate one market, or the whole corpus when `market` is `None`
pub async fn run_migrate<S: MarketSource + MarketSink + ?Sized>(
    pipeline: &MigrationPipeline<S>,
    market: Option<&str>,
    dry_run: bool,
    mode: OutputMode,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<bool> {
    match market {
        Some(market_id) => run_single(pipeline, market_id, dry_run, mode).await,
        None => run_corpus(pipeline, dry_run, mode, shutdown).await,
    }
}

async fn run_single<S: MarketSource + MarketSink + ?Sized>(
    pipeline: &MigrationPipeline<S>,
    market_id: &str,
    dry_run: bool,
    mode: OutputMode,
) -> anyhow::Result<bool> {
    let report = match pipeline.migrate_market(market_id, dry_run).await {
        Ok(report) => report,
        Err(e) => {
            let failure = pipeline.describe_failure(market_id, &e).await;
            if mode == OutputMode::Json {
                output::print_json(&failure)?;
            } else if is_precondition(&e) {
                output::print_warn(&output::failure_message(&failure, true));
            } else {
                output::print_error(&output::failure_message(&failure, false));
            }
            return Ok(false);
        }
    };

    if mode == OutputMode::Json {
        output::print_json(&report)?;
        return Ok(true);
    }

    println!("{}", report.question);
    println!("{}", report.url);
    output::print_items(&AnswerRow::rows(&report), mode)?;
    if report.skipped_bets > 0 {
        output::print_warn(&format!("{} bets skipped", report.skipped_bets));
    }
    let verb = if dry_run { "Planned" } else { "Migrated" };
    output::print_success(&format!(
        "{verb} {} answers and {} bets in {}ms",
        report.answers.len(),
        report.bets,
        report.elapsed_ms
    ));
    Ok(true)
}

async fn run_corpus<S: MarketSource + MarketSink + ?Sized>(
    pipeline: &MigrationPipeline<S>,
    dry_run: bool,
    mode: OutputMode,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<bool> {
    let report = pipeline.run_corpus(dry_run, shutdown).await?;

    if mode == OutputMode::Json {
        output::print_json(&report)?;
    } else {
        let rows: Vec<MarketRow> = report.migrated.iter().map(MarketRow::from).collect();
        output::print_items(&rows, mode)?;
        if !report.failed.is_empty() {
            output::print_error(&format!("{} markets failed:", report.failed.len()));
            let failures: Vec<FailureRow> = report.failed.iter().map(FailureRow::from).collect();
            output::print_items(&failures, mode)?;
        }
        if report.cancelled {
            output::print_warn("Stopped early on shutdown request");
        }
        let s = pipeline.stats().summary();
        output::print_success(&format!(
            "{} migrated, {} planned, {} failed, {} bets written, {} bets skipped",
            s.markets_migrated, s.markets_dry_run, s.markets_failed, s.bets_written, s.bets_skipped
        ));
    }

    Ok(report.failed.is_empty() && !report.cancelled)
}

/// Print the corpus in migration order
pub async fn run_list<S: MarketSource + MarketSink + ?Sized>(
    pipeline: &MigrationPipeline<S>,
    mode: OutputMode,
) -> anyhow::Result<bool> {
    let entries = pipeline.corpus().await?;
    match mode {
        OutputMode::Json => output::print_json(&entries)?,
        OutputMode::Table => output::print_items(&CorpusRow::rows(&entries), mode)?,
    }
    Ok(true)
}

pub async fn run_dump<S: MarketSource + ?Sized>(source: &S, path: &Path) -> anyhow::Result<bool> {
    let markets = dump_legacy_markets(source, path).await?;
    output::print_success(&format!("Wrote {markets} markets to {}", path.display()));
    Ok(true)
}
