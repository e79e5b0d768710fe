//! Per-user position metrics, recomputed from the migrated bet set alone.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{NewBet, NewOutcome, Resolution, User, UserPositionMetric};

const EPSILON: f64 = 1e-9;

fn floating_zero(x: f64) -> f64 {
    if x.abs() < EPSILON {
        0.0
    } else {
        x
    }
}

fn profit_percent(profit: f64, total_amount_invested: f64) -> f64 {
    if total_amount_invested.abs() < EPSILON {
        0.0
    } else {
        profit / total_amount_invested * 100.0
    }
}

/// Metrics for one user: one row per answer they bet on, then a market-wide summary row.
///
/// Unresolved markets value shares at the answer's current probability; resolved
/// markets at the answer's payout fraction; a cancelled market refunds the net
/// amount invested.
pub fn compute_user_metrics(
    market_id: &str,
    outcomes: &[NewOutcome],
    bets: &[NewBet],
    resolution: Option<&Resolution>,
    user_id: &str,
) -> Vec<UserPositionMetric> {
    let probs: HashMap<&str, f64> = outcomes.iter().map(|o| (o.id.as_str(), o.prob)).collect();

    let mut by_answer: BTreeMap<&str, Vec<&NewBet>> = BTreeMap::new();
    for bet in bets.iter().filter(|b| b.user_id == user_id) {
        by_answer.entry(bet.answer_id.as_str()).or_default().push(bet);
    }
    if by_answer.is_empty() {
        return Vec::new();
    }

    let mut metrics: Vec<UserPositionMetric> = by_answer
        .into_iter()
        .map(|(answer_id, answer_bets)| {
            let value_per_share = match resolution {
                Some(r) => r.payout_fraction(answer_id),
                None => Some(probs.get(answer_id).copied().unwrap_or(0.0)),
            };
            answer_metric(market_id, user_id, answer_id, &answer_bets, value_per_share)
        })
        .collect();

    let summary = summarize(market_id, user_id, &metrics);
    metrics.push(summary);
    metrics
}

/// Metrics for every user in `users` that has at least one bet
pub fn compute_market_metrics(
    market_id: &str,
    outcomes: &[NewOutcome],
    bets: &[NewBet],
    resolution: Option<&Resolution>,
    users: &[User],
) -> Vec<UserPositionMetric> {
    users
        .iter()
        .flat_map(|user| compute_user_metrics(market_id, outcomes, bets, resolution, &user.id))
        .collect()
}

/// `value_per_share` is None for a cancelled market
fn answer_metric(
    market_id: &str,
    user_id: &str,
    answer_id: &str,
    bets: &[&NewBet],
    value_per_share: Option<f64>,
) -> UserPositionMetric {
    let mut invested = 0.0;
    let mut total_shares = 0.0;
    let mut total_amount_invested = 0.0;
    let mut total_amount_sold = 0.0;
    let mut loan = 0.0;

    for bet in bets {
        invested += bet.amount;
        total_shares += bet.shares;
        loan += bet.loan_amount.unwrap_or(0.0);
        if bet.amount < 0.0 || bet.is_redemption {
            total_amount_sold += -bet.amount;
        } else {
            total_amount_invested += bet.amount;
        }
    }

    let has_shares = total_shares.abs() >= EPSILON;
    let payout = match value_per_share {
        None => invested,
        Some(_) if !has_shares => 0.0,
        Some(value) => total_shares * value,
    };
    let profit = payout + total_amount_sold - total_amount_invested;
    let last = bets.iter().max_by_key(|b| b.created_time);

    UserPositionMetric {
        user_id: user_id.to_string(),
        contract_id: market_id.to_string(),
        answer_id: Some(answer_id.to_string()),
        invested: floating_zero(invested),
        total_shares: floating_zero(total_shares),
        has_shares,
        total_amount_invested: floating_zero(total_amount_invested),
        total_amount_sold: floating_zero(total_amount_sold),
        payout: floating_zero(payout),
        profit: floating_zero(profit),
        profit_percent: profit_percent(profit, total_amount_invested),
        loan: floating_zero(loan),
        last_bet_time: last.map_or(0, |b| b.created_time),
        last_prob: last.map(|b| b.prob_after),
    }
}

fn summarize(market_id: &str, user_id: &str, rows: &[UserPositionMetric]) -> UserPositionMetric {
    let sum = |f: fn(&UserPositionMetric) -> f64| floating_zero(rows.iter().map(f).sum());
    let total_amount_invested = sum(|m| m.total_amount_invested);
    let profit = sum(|m| m.profit);

    UserPositionMetric {
        user_id: user_id.to_string(),
        contract_id: market_id.to_string(),
        answer_id: None,
        invested: sum(|m| m.invested),
        total_shares: sum(|m| m.total_shares),
        has_shares: rows.iter().any(|m| m.has_shares),
        total_amount_invested,
        total_amount_sold: sum(|m| m.total_amount_sold),
        payout: sum(|m| m.payout),
        profit,
        profit_percent: profit_percent(profit, total_amount_invested),
        loan: sum(|m| m.loan),
        last_bet_time: rows.iter().map(|m| m.last_bet_time).max().unwrap_or(0),
        last_prob: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fees, ProbChanges};

    fn outcome(id: &str, prob: f64) -> NewOutcome {
        NewOutcome {
            id: id.to_string(),
            contract_id: "m1".to_string(),
            legacy_answer_id: id.to_string(),
            text: id.to_string(),
            user_id: None,
            created_time: 0,
            index: 0,
            is_other: false,
            pool_yes: 1.0,
            pool_no: 1.0,
            prob,
            total_liquidity: 1.0,
            subsidy_pool: 0.0,
            prob_changes: ProbChanges::default(),
        }
    }

    fn bet(user: &str, answer: &str, amount: f64, shares: f64, time: i64) -> NewBet {
        NewBet {
            id: format!("{user}-{time}"),
            user_id: user.to_string(),
            contract_id: "m1".to_string(),
            answer_id: answer.to_string(),
            amount,
            shares,
            outcome: "YES".to_string(),
            prob_before: 0.2,
            prob_after: 0.25,
            created_time: time,
            loan_amount: None,
            fees: Fees::default(),
            is_api: false,
            is_ante: false,
            is_redemption: false,
            visibility: "public".to_string(),
            user_avatar_url: None,
            user_username: None,
            user_name: None,
        }
    }

    #[test]
    fn test_unresolved_uses_current_probability() {
        let outcomes = vec![outcome("a", 0.4), outcome("b", 0.6)];
        let bets = vec![
            bet("u1", "a", 100.0, 300.0, 1),
            bet("u1", "b", 50.0, 100.0, 2),
            bet("u2", "a", 10.0, 20.0, 3),
        ];

        let metrics = compute_user_metrics("m1", &outcomes, &bets, None, "u1");

        assert_eq!(metrics.len(), 3);
        let a = &metrics[0];
        assert_eq!(a.answer_id.as_deref(), Some("a"));
        assert_eq!(a.invested, 100.0);
        assert!((a.payout - 120.0).abs() < 1e-9);
        assert!((a.profit - 20.0).abs() < 1e-9);

        let summary = metrics.last().unwrap();
        assert_eq!(summary.answer_id, None);
        assert_eq!(summary.total_amount_invested, 150.0);
        assert!((summary.payout - 180.0).abs() < 1e-9);
        assert!((summary.profit - 30.0).abs() < 1e-9);
        assert!((summary.profit_percent - 20.0).abs() < 1e-9);
        assert_eq!(summary.last_bet_time, 2);
    }

    #[test]
    fn test_sold_out_position() {
        let outcomes = vec![outcome("a", 0.5)];
        let bets = vec![bet("u1", "a", 50.0, 91.0, 1), bet("u1", "a", -60.0, -91.0, 2)];

        let metrics = compute_user_metrics("m1", &outcomes, &bets, None, "u1");
        let a = &metrics[0];

        assert!(!a.has_shares);
        assert_eq!(a.payout, 0.0);
        assert_eq!(a.total_amount_sold, 60.0);
        assert!((a.profit - 10.0).abs() < 1e-9);
        assert_eq!(a.invested, -10.0);
    }

    #[test]
    fn test_resolved_pays_out_winner() {
        let outcomes = vec![outcome("a", 0.4), outcome("b", 0.6)];
        let bets = vec![bet("u1", "a", 100.0, 300.0, 1), bet("u1", "b", 50.0, 100.0, 2)];
        let resolution = Resolution::Single {
            answer_id: "a".to_string(),
        };

        let metrics = compute_user_metrics("m1", &outcomes, &bets, Some(&resolution), "u1");

        assert_eq!(metrics[0].payout, 300.0);
        assert_eq!(metrics[1].payout, 0.0);
        assert!((metrics[2].profit - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_cancel_refunds() {
        let outcomes = vec![outcome("a", 0.4)];
        let bets = vec![bet("u1", "a", 100.0, 300.0, 1)];
        let metrics = compute_user_metrics("m1", &outcomes, &bets, Some(&Resolution::Cancel), "u1");
        assert_eq!(metrics[0].payout, 100.0);
        assert_eq!(metrics[0].profit, 0.0);
    }

    #[test]
    fn test_user_without_bets_has_no_metrics() {
        let metrics = compute_user_metrics("m1", &[outcome("a", 0.5)], &[], None, "u1");
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_market_metrics_only_for_listed_users() {
        let outcomes = vec![outcome("a", 0.5)];
        let bets = vec![bet("u1", "a", 10.0, 20.0, 1), bet("gone", "a", 10.0, 20.0, 2)];
        let users = vec![User {
            id: "u1".to_string(),
            username: "u1".to_string(),
            name: "U1".to_string(),
        }];

        let metrics = compute_market_metrics("m1", &outcomes, &bets, None, &users);
        assert!(metrics.iter().all(|m| m.user_id == "u1"));
        assert_eq!(metrics.len(), 2);
    }
}
