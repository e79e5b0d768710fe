use std::collections::BTreeMap;

use super::pool::OutcomeIdMap;
use crate::domain::{LegacyResolution, Resolution};
use crate::error::{MigrationError, Result};

/// Translate a legacy resolution into the new answer-id space.
///
/// An unresolved market yields `None`. A resolution naming an answer the
/// market does not have fails the market.
pub fn remap_resolution(
    market_id: &str,
    legacy: Option<&LegacyResolution>,
    id_map: &OutcomeIdMap,
) -> Result<Option<Resolution>> {
    let lookup = |legacy_id: &str| {
        id_map.get(legacy_id).cloned().ok_or_else(|| {
            MigrationError::InvalidRecord(format!(
                "market {market_id} resolves to unknown answer {legacy_id}"
            ))
        })
    };

    let resolution = match legacy {
        None => return Ok(None),
        Some(LegacyResolution::Cancel) => Resolution::Cancel,
        Some(LegacyResolution::Single(legacy_id)) => Resolution::Single {
            answer_id: lookup(legacy_id.as_str())?,
        },
        Some(LegacyResolution::Weighted(weights)) => {
            let remapped = weights
                .iter()
                .map(|(legacy_id, weight)| lookup(legacy_id.as_str()).map(|id| (id, *weight)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            Resolution::Weighted(remapped)
        }
    };

    Ok(Some(resolution))
}
