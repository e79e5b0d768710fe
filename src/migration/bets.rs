//! Re-expresses legacy pari-mutuel bets as constant-product share purchases.

use std::collections::HashMap;
use tracing::warn;

use super::pool::OutcomeIdMap;
use crate::domain::{Fees, LegacyBet, NewBet, YES};

/// Why a legacy bet was left out of the migrated set
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Sale bet whose original position is not in the market
    MissingOriginal { original_bet_id: String },
    /// Bet placed on an answer the market no longer has
    UnknownOutcome { outcome_id: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingOriginal { original_bet_id } => {
                write!(f, "original bet {original_bet_id} not found")
            }
            SkipReason::UnknownOutcome { outcome_id } => write!(f, "unknown answer {outcome_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBet {
    pub bet_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct TranslatedBets {
    pub bets: Vec<NewBet>,
    pub skipped: Vec<SkippedBet>,
}

/// Shares bought for `amount` at the geometric mean of the prices before and after.
///
/// Prices are floored at `min_prob`; a first bet on an answer with no shares has
/// `prob_before == 0`.
pub fn implied_shares(amount: f64, prob_before: f64, prob_after: f64, min_prob: f64) -> f64 {
    let average_price = (prob_before.max(min_prob) * prob_after.max(min_prob)).sqrt();
    amount / average_price
}

pub fn translate_bets(
    market_id: &str,
    bets: &[LegacyBet],
    id_map: &OutcomeIdMap,
    min_prob: f64,
) -> TranslatedBets {
    let by_id: HashMap<&str, &LegacyBet> = bets.iter().map(|b| (b.id.as_str(), b)).collect();
    let mut translated = TranslatedBets {
        bets: Vec::with_capacity(bets.len()),
        skipped: Vec::new(),
    };

    for bet in bets {
        let Some(answer_id) = id_map.get(&bet.outcome_id) else {
            warn!(market_id, bet_id = %bet.id, outcome = %bet.outcome_id, "Bet on unknown answer, skipping");
            translated.skipped.push(SkippedBet {
                bet_id: bet.id.clone(),
                reason: SkipReason::UnknownOutcome {
                    outcome_id: bet.outcome_id.clone(),
                },
            });
            continue;
        };

        let shares = match bet.sale_of_bet_id() {
            // A sale closes the original position; its own price fields only describe the exit.
            Some(original_id) => match by_id.get(original_id) {
                Some(original) => -implied_shares(
                    original.amount,
                    original.prob_before,
                    original.prob_after,
                    min_prob,
                ),
                None => {
                    warn!(market_id, bet_id = %bet.id, original_id, "Original bet not found, skipping sale");
                    translated.skipped.push(SkippedBet {
                        bet_id: bet.id.clone(),
                        reason: SkipReason::MissingOriginal {
                            original_bet_id: original_id.to_string(),
                        },
                    });
                    continue;
                }
            },
            None => implied_shares(bet.amount, bet.prob_before, bet.prob_after, min_prob),
        };

        translated.bets.push(NewBet {
            id: bet.id.clone(),
            user_id: bet.user_id.clone(),
            contract_id: market_id.to_string(),
            answer_id: answer_id.clone(),
            amount: bet.amount,
            shares,
            outcome: YES.to_string(),
            prob_before: bet.prob_before,
            prob_after: bet.prob_after,
            created_time: bet.created_time,
            loan_amount: bet.loan_amount,
            fees: Fees::default(),
            is_api: false,
            is_ante: false,
            is_redemption: false,
            visibility: "public".to_string(),
            user_avatar_url: bet.user_avatar_url.clone(),
            user_username: bet.user_username.clone(),
            user_name: bet.user_name.clone(),
        });
    }

    translated
}
