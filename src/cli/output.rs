//! Output formatting for operator commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::migration::{CorpusEntry, MarketFailure, MarketReport};

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
    }
    Ok(())
}

pub fn print_json<T: Serialize + ?Sized>(item: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

/// Print a warning message.
pub fn print_warn(msg: &str) {
    println!("\x1b[33m{msg}\x1b[0m");
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m{msg}\x1b[0m");
}

#[derive(Debug, Serialize, Tabled)]
pub struct CorpusRow {
    #[tabled(rename = "#")]
    pub rank: usize,
    pub market_id: String,
    pub question: String,
    pub url: String,
    pub resume: String,
}

impl CorpusRow {
    pub fn rows(entries: &[CorpusEntry]) -> Vec<Self> {
        entries
            .iter()
            .enumerate()
            .map(|(i, e)| Self {
                rank: i + 1,
                market_id: e.market_id.clone(),
                question: truncate(&e.question, 60),
                url: e.url.clone(),
                resume: if e.resume { "yes".into() } else { String::new() },
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct AnswerRow {
    pub answer: String,
    pub prob: String,
    pub pool_yes: String,
    pub pool_no: String,
    pub liquidity: String,
}

impl AnswerRow {
    pub fn rows(report: &MarketReport) -> Vec<Self> {
        report
            .answers
            .iter()
            .map(|a| Self {
                answer: truncate(&a.text, 40),
                prob: format!("{:.4}", a.prob),
                pool_yes: format!("{:.2}", a.pool_yes),
                pool_no: format!("{:.2}", a.pool_no),
                liquidity: format!("{:.2}", a.total_liquidity),
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct MarketRow {
    pub market_id: String,
    pub question: String,
    pub answers: usize,
    pub bets: usize,
    pub skipped: usize,
    pub resolution: String,
    pub ms: u64,
}

impl From<&MarketReport> for MarketRow {
    fn from(r: &MarketReport) -> Self {
        Self {
            market_id: r.market_id.clone(),
            question: truncate(&r.question, 50),
            answers: r.answers.len(),
            bets: r.bets,
            skipped: r.skipped_bets,
            resolution: r.resolution.clone().unwrap_or_default(),
            ms: r.elapsed_ms,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct FailureRow {
    pub market_id: String,
    pub question: String,
    pub url: String,
    pub error: String,
}

impl From<&MarketFailure> for FailureRow {
    fn from(f: &MarketFailure) -> Self {
        Self {
            market_id: f.market_id.clone(),
            question: truncate(&f.question, 40),
            url: f.url.clone(),
            error: truncate(&f.error, 80),
        }
    }
}

/// One-line report for a single market that did not migrate
pub fn failure_message(f: &MarketFailure, precondition: bool) -> String {
    let what = if precondition {
        "cannot be migrated"
    } else {
        "failed to migrate"
    };
    let mut msg = format!("Market {} {what}", f.market_id);
    if !f.question.is_empty() {
        msg.push_str(&format!(" \"{}\"", f.question));
    }
    if !f.url.is_empty() {
        msg.push_str(&format!(" ({})", f.url));
    }
    msg.push_str(&format!(": {}", f.error));
    msg
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_failure_message_names_market() {
        let failure = MarketFailure {
            market_id: "m3".into(),
            question: "Empty?".into(),
            url: "https://manifold.markets/carol/empty".into(),
            error: "Validation failed: no answers".into(),
        };
        assert_eq!(
            failure_message(&failure, false),
            "Market m3 failed to migrate \"Empty?\" (https://manifold.markets/carol/empty): \
             Validation failed: no answers"
        );

        let unknown = MarketFailure {
            market_id: "nope".into(),
            question: String::new(),
            url: String::new(),
            error: "Market not found: nope".into(),
        };
        assert_eq!(
            failure_message(&unknown, true),
            "Market nope cannot be migrated: Market not found: nope"
        );
    }

    #[test]
    fn test_output_mode_from_flag() {
        assert_eq!(OutputMode::from_json_flag(true), OutputMode::Json);
        assert_eq!(OutputMode::from_json_flag(false), OutputMode::Table);
    }

    #[test]
    fn test_corpus_rows_rank_from_one() {
        let entries = vec![CorpusEntry {
            market_id: "m1".into(),
            question: "Q".into(),
            url: "https://x/a/q".into(),
            resume: true,
        }];
        let rows = CorpusRow::rows(&entries);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].resume, "yes");
    }
}
