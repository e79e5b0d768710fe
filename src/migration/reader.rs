//! Legacy reader: loads one legacy market and validates its records.

use tracing::{debug, info, warn};

pub use crate::domain::RejectedRecord;
use crate::domain::{LegacyBet, LegacyMarket, LegacyOutcome, LegacySnapshot, DPM_MECHANISM};
use crate::error::{MigrationError, Result};
use crate::store::MarketSource;

/// Result of reading one market
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub snapshot: LegacySnapshot,
    pub rejected_bets: Vec<RejectedRecord>,
    /// Snapshot came from the archive of an interrupted commit
    pub resumed: bool,
}

pub struct LegacyReader<'a, S: MarketSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: MarketSource + ?Sized> LegacyReader<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub async fn read(&self, market_id: &str) -> Result<ReadResult> {
        let doc = self
            .source
            .get_market(market_id)
            .await?
            .ok_or_else(|| MigrationError::MarketNotFound(market_id.to_string()))?;

        let mechanism = doc
            .get("mechanism")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        if mechanism != DPM_MECHANISM {
            return self.resume_from_archive(market_id, &mechanism).await;
        }

        let outcomes = self.source.get_legacy_outcomes(market_id).await?;
        let bets = self.source.get_legacy_bets(market_id).await?;
        let (snapshot, rejected_bets) = parse_snapshot(doc, outcomes, bets)?;

        for rejected in &rejected_bets {
            warn!(
                market_id,
                bet_id = rejected.id.as_deref().unwrap_or("<unknown>"),
                "Rejected legacy bet: {}",
                rejected.reason
            );
        }
        debug!(
            market_id,
            outcomes = snapshot.outcomes.len(),
            bets = snapshot.bets.len(),
            "Read legacy market"
        );

        Ok(ReadResult {
            snapshot,
            rejected_bets,
            resumed: false,
        })
    }

    async fn resume_from_archive(&self, market_id: &str, mechanism: &str) -> Result<ReadResult> {
        match self.source.get_archive(market_id).await? {
            Some(archive) if !archive.is_finished() => {
                info!(market_id, "Resuming interrupted migration from archived snapshot");
                Ok(ReadResult {
                    snapshot: archive.snapshot,
                    rejected_bets: archive.rejected_bets,
                    resumed: true,
                })
            }
            _ => Err(MigrationError::Precondition {
                market_id: market_id.to_string(),
                reason: format!("mechanism is '{mechanism}', expected '{DPM_MECHANISM}'"),
            }),
        }
    }
}

/// Validate raw documents into a snapshot.
///
/// A malformed market or answer fails the whole market; a malformed bet is
/// rejected on its own.
pub fn parse_snapshot(
    market_doc: serde_json::Value,
    outcome_docs: Vec<serde_json::Value>,
    bet_docs: Vec<serde_json::Value>,
) -> Result<(LegacySnapshot, Vec<RejectedRecord>)> {
    let market_id = doc_id(&market_doc).unwrap_or_default();
    let market: LegacyMarket =
        serde_json::from_value(market_doc).map_err(|e| MigrationError::Precondition {
            market_id: market_id.clone(),
            reason: format!("malformed market record: {e}"),
        })?;

    if !market.is_legacy_multi() {
        return Err(MigrationError::Precondition {
            market_id,
            reason: format!(
                "unsupported mechanism/outcome type {}/{}",
                market.mechanism, market.outcome_type
            ),
        });
    }

    let mut outcomes = outcome_docs
        .into_iter()
        .map(|doc| {
            let id = doc_id(&doc);
            serde_json::from_value::<LegacyOutcome>(doc).map_err(|e| MigrationError::Precondition {
                market_id: market.id.clone(),
                reason: format!("malformed answer {}: {e}", id.as_deref().unwrap_or("<unknown>")),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if outcomes.is_empty() {
        return Err(MigrationError::Precondition {
            market_id: market.id.clone(),
            reason: "market has no answers".to_string(),
        });
    }
    outcomes.sort_by_key(|o| o.number_index);

    let mut rejected = Vec::new();
    let mut bets = Vec::with_capacity(bet_docs.len());
    for doc in bet_docs {
        let parsed = serde_json::from_value::<LegacyBet>(doc.clone())
            .map_err(|e| e.to_string())
            .and_then(|bet| bet.validate().map(|()| bet));
        match parsed {
            Ok(bet) => bets.push(bet),
            Err(reason) => rejected.push(RejectedRecord {
                id: doc_id(&doc),
                reason,
                document: doc,
            }),
        }
    }
    bets.sort_by_key(|b| b.created_time);

    Ok((
        LegacySnapshot {
            market,
            outcomes,
            bets,
        },
        rejected,
    ))
}

fn doc_id(doc: &serde_json::Value) -> Option<String> {
    doc.get("id").and_then(|v| v.as_str()).map(str::to_string)
}
