//! Corrects probability drift after flooring so a market's answers sum to 1.

use tracing::{debug, error};

use super::pool::pool_for_probability;
use crate::domain::NewOutcome;
use crate::error::{MigrationError, Result};

/// Returns a new outcome list whose probabilities sum to 1 within `tolerance`.
///
/// Flooring raises probabilities, so the excess is taken from the single
/// largest outcome (first one on ties), whose pool is re-derived from its
/// existing liquidity. If that outcome cannot absorb the excess, or the sum
/// fell short of 1, the market is left for manual review.
pub fn normalize_probabilities(
    market_id: &str,
    outcomes: &[NewOutcome],
    tolerance: f64,
) -> Result<Vec<NewOutcome>> {
    let total: f64 = outcomes.iter().map(|o| o.prob).sum();
    let excess = total - 1.0;

    if excess.abs() <= tolerance {
        return Ok(outcomes.to_vec());
    }

    // Only the upper cap lowers a sum, and only for a lone answer
    if excess < 0.0 {
        return Err(irresolvable(market_id, excess, outcomes));
    }

    let largest = outcomes
        .iter()
        .enumerate()
        .fold(None::<(usize, f64)>, |best, (i, o)| match best {
            Some((_, p)) if o.prob <= p => best,
            _ => Some((i, o.prob)),
        });

    let Some((index, prob)) = largest.filter(|(_, p)| *p > excess) else {
        return Err(irresolvable(market_id, excess, outcomes));
    };

    let adjusted_prob = prob - excess;
    let mut normalized = outcomes.to_vec();
    let target = &mut normalized[index];
    let pool = pool_for_probability(adjusted_prob, target.total_liquidity);
    target.prob = adjusted_prob;
    target.pool_yes = pool.yes;
    target.pool_no = pool.no;

    debug!(
        market_id,
        answer_id = %target.id,
        from = prob,
        to = adjusted_prob,
        "Normalized largest answer probability"
    );

    Ok(normalized)
}

fn irresolvable(market_id: &str, excess: f64, outcomes: &[NewOutcome]) -> MigrationError {
    let probabilities: Vec<f64> = outcomes.iter().map(|o| o.prob).collect();
    error!(market_id, excess, ?probabilities, "Probability sum cannot be brought to 1");
    MigrationError::NormalizationIrresolvable {
        market_id: market_id.to_string(),
        excess,
        probabilities,
    }
}
