//! Export of unresolved legacy markets for offline inspection.

use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::MarketSource;

pub const DEFAULT_DUMP_FILE: &str = "dpm-market-data.json";

/// Collect every unresolved legacy market with its answers and bets.
///
/// Keys are `{id}`, `{id}-answers` and `{id}-bets`.
pub async fn collect_legacy_markets<S: MarketSource + ?Sized>(source: &S) -> Result<Map<String, Value>> {
    let mut dump = Map::new();

    for market in source.list_legacy_markets(true).await? {
        let Some(id) = market.get("id").and_then(|v| v.as_str()).map(str::to_string) else {
            warn!("Skipping legacy market without id");
            continue;
        };
        let answers = source.get_legacy_outcomes(&id).await?;
        let bets = source.get_legacy_bets(&id).await?;
        debug!(market_id = %id, answers = answers.len(), bets = bets.len(), "Collected market");

        dump.insert(format!("{id}-answers"), Value::Array(answers));
        dump.insert(format!("{id}-bets"), Value::Array(bets));
        dump.insert(id, market);
    }

    Ok(dump)
}

/// Write [`collect_legacy_markets`] to `path`; returns the number of markets
pub async fn dump_legacy_markets<S: MarketSource + ?Sized>(source: &S, path: &Path) -> Result<usize> {
    let dump = collect_legacy_markets(source).await?;
    let markets = dump.len() / 3;
    tokio::fs::write(path, serde_json::to_vec_pretty(&dump)?).await?;
    info!(markets, path = %path.display(), "Wrote legacy market dump");
    Ok(markets)
}
