//! End-to-end migration runs against the in-memory store.

use dpm_migrate::adapters::InMemoryStore;
use dpm_migrate::config::{LegacyRetention, MigrationConfig};
use dpm_migrate::domain::User;
use dpm_migrate::error::{CommitStep, MigrationError};
use dpm_migrate::migration::{Committer, MigrationPipeline};
use dpm_migrate::shutdown;
use dpm_migrate::store::PageInvalidator;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingInvalidator {
    paths: Mutex<Vec<String>>,
}

impl RecordingInvalidator {
    fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PageInvalidator for RecordingInvalidator {
    async fn invalidate(&self, path: &str) {
        // Recorded late so only an awaited request shows up
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.paths.lock().unwrap().push(path.to_string());
    }
}

fn answer(id: &str, text: &str, number: i64) -> Value {
    json!({ "id": id, "text": text, "createdTime": 1_000 + number, "number": number, "userId": "alice-id" })
}

fn bet(id: &str, user: &str, outcome: &str, amount: f64, pb: f64, pa: f64, t: i64) -> Value {
    json!({
        "id": id, "userId": user, "outcome": outcome, "amount": amount,
        "probBefore": pb, "probAfter": pa, "createdTime": t
    })
}

/// Free-response market with two answers, one sale and one malformed bet
async fn seed_free_response(store: &InMemoryStore) {
    store
        .insert_market(json!({
            "id": "m1",
            "slug": "who-wins",
            "question": "Who wins?",
            "creatorUsername": "alice",
            "mechanism": "dpm-2",
            "outcomeType": "FREE_RESPONSE",
            "totalShares": { "1": 30.0, "2": 40.0 },
            "pool": { "1": 10.0, "2": 20.0 },
            "totalBets": { "1": 10.0, "2": 20.0 },
            "uniqueBettorCount": 2,
            "importanceScore": 0.9,
            "closeTime": 1_900_000_000_000_i64
        }))
        .await
        .unwrap();
    store.insert_legacy_outcome("m1", answer("1", "Red", 1)).await.unwrap();
    store.insert_legacy_outcome("m1", answer("2", "Blue", 2)).await.unwrap();

    store.insert_bet("m1", bet("b1", "u1", "1", 10.0, 0.3, 0.4, 1)).await.unwrap();
    store.insert_bet("m1", bet("b2", "u2", "2", 20.0, 0.5, 0.6, 2)).await.unwrap();
    let mut sale = bet("s1", "u1", "1", -8.0, 0.4, 0.35, 3);
    sale["sale"] = json!({ "betId": "b1", "amount": 8.0 });
    store.insert_bet("m1", sale).await.unwrap();
    store
        .insert_bet("m1", bet("bad", "u2", "2", 5.0, 1.5, 0.6, 4))
        .await
        .unwrap();

    for id in ["u1", "u2"] {
        store
            .insert_user(User {
                id: id.to_string(),
                username: id.to_string(),
                name: id.to_uppercase(),
            })
            .await;
    }
}

/// Resolved multiple-choice market with fewer bettors than m1
async fn seed_multiple_choice(store: &InMemoryStore) {
    store
        .insert_market(json!({
            "id": "m2",
            "slug": "which-color",
            "question": "Which color?",
            "creatorUsername": "bob",
            "mechanism": "dpm-2",
            "outcomeType": "MULTIPLE_CHOICE",
            "totalShares": { "a": 10.0, "b": 10.0 },
            "resolution": "a",
            "uniqueBettorCount": 1,
            "importanceScore": 0.5
        }))
        .await
        .unwrap();
    store.insert_legacy_outcome("m2", answer("a", "A", 0)).await.unwrap();
    store.insert_legacy_outcome("m2", answer("b", "B", 1)).await.unwrap();
    store.insert_bet("m2", bet("c1", "u1", "a", 5.0, 0.5, 0.55, 1)).await.unwrap();
}

/// Legacy market with no answers: fails its precondition
async fn seed_broken(store: &InMemoryStore) {
    store
        .insert_market(json!({
            "id": "m3",
            "slug": "empty",
            "question": "Empty?",
            "creatorUsername": "carol",
            "mechanism": "dpm-2",
            "outcomeType": "MULTIPLE_CHOICE",
            "totalShares": {},
            "importanceScore": 0.7
        }))
        .await
        .unwrap();
}

fn pipeline(
    store: Arc<InMemoryStore>,
    config: MigrationConfig,
) -> (MigrationPipeline<InMemoryStore>, Arc<RecordingInvalidator>) {
    let invalidator = Arc::new(RecordingInvalidator::default());
    let pipeline = MigrationPipeline::new(store, invalidator.clone(), config);
    (pipeline, invalidator)
}

#[tokio::test]
async fn test_migrates_free_response_market() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    let (pipeline, invalidator) = pipeline(store.clone(), MigrationConfig::default());

    let report = pipeline.migrate_market("m1", false).await.unwrap();
    assert_eq!(report.url, "https://manifold.markets/alice/who-wins");
    assert_eq!(report.answers.len(), 2);
    assert_eq!(report.bets, 3);
    assert_eq!(report.skipped_bets, 1);

    let state = store.state().await;
    let market = &state.markets["m1"];
    assert_eq!(market["mechanism"], "cpmm-multi-1");
    assert_eq!(market["outcomeType"], "MULTIPLE_CHOICE");
    assert_eq!(market["addAnswersMode"], "ANYONE");
    assert_eq!(market["closeTime"], 1_900_000_000_000_i64);
    assert!(market.get("pool").is_none());
    assert!(market.get("totalBets").is_none());

    assert!(state.legacy_outcomes["m1"].is_empty());
    let outcomes = &state.outcomes["m1"];
    assert_eq!(outcomes.len(), 2);
    let sum: f64 = outcomes.values().map(|o| o.prob).sum();
    assert!((sum - 1.0).abs() < 1e-7);

    let bets = &state.bets["m1"];
    assert_eq!(bets["b1"]["outcome"], "YES");
    let b1_shares = bets["b1"]["shares"].as_f64().unwrap();
    let s1_shares = bets["s1"]["shares"].as_f64().unwrap();
    assert!((b1_shares + s1_shares).abs() < 1e-9);
    // Malformed legacy bet is removed from the live market
    assert!(!bets.contains_key("bad"));
    assert_eq!(bets.len(), 3);

    assert_eq!(state.liquidity["m1"].len(), 2);
    assert_eq!(state.metrics.len(), 4);
    assert!(state.archives["m1"].is_finished());

    let mut paths = invalidator.paths();
    paths.sort();
    assert_eq!(
        paths,
        vec!["/alice/who-wins".to_string(), "/embed/alice/who-wins".to_string()]
    );
    assert_eq!(pipeline.stats().summary().markets_migrated, 1);
}

#[tokio::test]
async fn test_untranslated_bets_are_removed_and_archived() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    let mut orphan = bet("o1", "u2", "2", -3.0, 0.6, 0.58, 5);
    orphan["sale"] = json!({ "betId": "gone", "amount": 3.0 });
    store.insert_bet("m1", orphan).await.unwrap();
    let (pipeline, _) = pipeline(store.clone(), MigrationConfig::default());

    let report = pipeline.migrate_market("m1", false).await.unwrap();
    assert_eq!(report.bets, 3);
    assert_eq!(report.skipped_bets, 2);

    let state = store.state().await;
    let bets = &state.bets["m1"];
    assert!(!bets.contains_key("o1"));
    assert!(!bets.contains_key("bad"));
    assert!(bets.values().all(|b| b.get("shares").is_some()));

    let archive = &state.archives["m1"];
    assert!(archive.snapshot.bets.iter().any(|b| b.id == "o1"));
    assert_eq!(archive.rejected_bets.len(), 1);
    assert_eq!(archive.rejected_bets[0].id.as_deref(), Some("bad"));
    assert_eq!(archive.rejected_bets[0].document["probBefore"], 1.5);
}

#[tokio::test]
async fn test_failed_market_is_described_by_question_and_url() {
    let store = Arc::new(InMemoryStore::new());
    seed_broken(&store).await;
    let (pipeline, _) = pipeline(store.clone(), MigrationConfig::default());

    let err = pipeline.migrate_market("m3", false).await.unwrap_err();
    let failure = pipeline.describe_failure("m3", &err).await;
    assert_eq!(failure.market_id, "m3");
    assert_eq!(failure.question, "Empty?");
    assert_eq!(failure.url, "https://manifold.markets/carol/empty");
    assert_eq!(failure.error, err.to_string());

    let err = pipeline.migrate_market("nope", false).await.unwrap_err();
    let failure = pipeline.describe_failure("nope", &err).await;
    assert!(failure.question.is_empty());
    assert!(failure.url.is_empty());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    let before = store.state().await;
    let (pipeline, invalidator) = pipeline(store.clone(), MigrationConfig::default());

    let report = pipeline.migrate_market("m1", true).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.answers.len(), 2);

    assert_eq!(store.state().await, before);
    assert!(invalidator.paths().is_empty());
    assert_eq!(pipeline.stats().summary().markets_dry_run, 1);
}

#[tokio::test]
async fn test_migrated_market_fails_precondition() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    let (pipeline, _) = pipeline(store.clone(), MigrationConfig::default());

    pipeline.migrate_market("m1", false).await.unwrap();
    let after_first = store.state().await;

    let err = pipeline.migrate_market("m1", false).await.unwrap_err();
    assert!(matches!(err, MigrationError::Precondition { .. }));
    assert_eq!(store.state().await, after_first);
}

#[tokio::test]
async fn test_unknown_market() {
    let store = Arc::new(InMemoryStore::new());
    let (pipeline, _) = pipeline(store, MigrationConfig::default());

    let err = pipeline.migrate_market("nope", false).await.unwrap_err();
    assert!(matches!(err, MigrationError::MarketNotFound(_)));
}

#[tokio::test]
async fn test_committing_same_plan_twice_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    let (pipeline, _) = pipeline(store.clone(), MigrationConfig::default());

    let plan = pipeline.plan_market("m1").await.unwrap();
    let committer = Committer::new(store.as_ref(), 4, LegacyRetention::Retain);

    committer.commit(&plan).await.unwrap();
    let once = store.state().await;
    committer.commit(&plan).await.unwrap();
    assert_eq!(store.state().await, once);
}

#[tokio::test]
async fn test_interrupted_commit_resumes_from_archive() {
    let clean = Arc::new(InMemoryStore::new());
    seed_free_response(&clean).await;
    let (clean_pipeline, _) = pipeline(clean.clone(), MigrationConfig::default());
    clean_pipeline.migrate_market("m1", false).await.unwrap();
    let expected = clean.state().await;

    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    let (pipeline, invalidator) = pipeline(store.clone(), MigrationConfig::default());

    store.fail_at(Some(CommitStep::Bets)).await;
    let err = pipeline.migrate_market("m1", false).await.unwrap_err();
    match err {
        MigrationError::WriteFailed { market_id, step, .. } => {
            assert_eq!(market_id, "m1");
            assert_eq!(step, CommitStep::Bets);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(invalidator.paths().is_empty());

    let partial = store.state().await;
    assert_eq!(partial.markets["m1"]["mechanism"], "cpmm-multi-1");
    assert!(!partial.archives["m1"].is_finished());

    store.fail_at(None).await;
    let report = pipeline.migrate_market("m1", false).await.unwrap();
    assert!(report.resumed);
    assert_eq!(report.skipped_bets, 1);

    let resumed = store.state().await;
    assert_eq!(resumed.markets, expected.markets);
    assert_eq!(resumed.legacy_outcomes, expected.legacy_outcomes);
    assert_eq!(resumed.outcomes, expected.outcomes);
    assert_eq!(resumed.bets, expected.bets);
    assert_eq!(resumed.metrics, expected.metrics);
    assert!(resumed.archives["m1"].is_finished());
    assert_eq!(resumed.archives["m1"].rejected_bets, expected.archives["m1"].rejected_bets);
    assert_eq!(pipeline.stats().summary().markets_resumed, 1);
}

#[tokio::test]
async fn test_interrupted_bet_removal_resumes() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    let (pipeline, _) = pipeline(store.clone(), MigrationConfig::default());

    store.fail_at(Some(CommitStep::DeleteBet)).await;
    let err = pipeline.migrate_market("m1", false).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::WriteFailed { step: CommitStep::DeleteBet, .. }
    ));
    assert!(store.state().await.bets["m1"].contains_key("bad"));

    store.fail_at(None).await;
    let report = pipeline.migrate_market("m1", false).await.unwrap();
    assert!(report.resumed);
    assert_eq!(report.skipped_bets, 1);
    assert!(!store.state().await.bets["m1"].contains_key("bad"));
}

#[tokio::test]
async fn test_discard_retention_drops_archive() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    let config = MigrationConfig {
        legacy_retention: LegacyRetention::Discard,
        ..MigrationConfig::default()
    };
    let (pipeline, _) = pipeline(store.clone(), config);

    pipeline.migrate_market("m1", false).await.unwrap();
    assert!(store.state().await.archives.is_empty());
}

#[tokio::test]
async fn test_corpus_continues_past_failing_market() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    seed_multiple_choice(&store).await;
    seed_broken(&store).await;
    let (pipeline, _) = pipeline(store.clone(), MigrationConfig::default());

    let corpus: Vec<String> = pipeline
        .corpus()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.market_id)
        .collect();
    // Bettor count first: m3 is more important than m2 but has no bettors
    assert_eq!(corpus, vec!["m1", "m2", "m3"]);

    let (_tx, rx) = shutdown::channel();
    let report = pipeline.run_corpus(false, rx).await.unwrap();

    let migrated: Vec<&str> = report.migrated.iter().map(|r| r.market_id.as_str()).collect();
    assert_eq!(migrated, vec!["m1", "m2"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].market_id, "m3");
    assert_eq!(report.failed[0].url, "https://manifold.markets/carol/empty");
    assert!(!report.cancelled);

    let state = store.state().await;
    assert_eq!(state.markets["m2"]["resolution"], state.markets["m2"]["answers"][0]["id"]);
    assert_eq!(state.markets["m3"]["mechanism"], "dpm-2");

    let stats = pipeline.stats().summary();
    assert_eq!(stats.markets_migrated, 2);
    assert_eq!(stats.markets_failed, 1);
}

#[tokio::test]
async fn test_corpus_stops_on_shutdown() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    let (pipeline, _) = pipeline(store.clone(), MigrationConfig::default());

    let (tx, rx) = shutdown::channel();
    tx.send(true).unwrap();
    let report = pipeline.run_corpus(false, rx).await.unwrap();

    assert!(report.cancelled);
    assert!(report.migrated.is_empty());
    assert_eq!(store.state().await.markets["m1"]["mechanism"], "dpm-2");
}

#[tokio::test]
async fn test_corpus_puts_interrupted_markets_first() {
    let store = Arc::new(InMemoryStore::new());
    seed_free_response(&store).await;
    seed_multiple_choice(&store).await;
    let (pipeline, _) = pipeline(store.clone(), MigrationConfig::default());

    store.fail_at(Some(CommitStep::Liquidity)).await;
    pipeline.migrate_market("m2", false).await.unwrap_err();
    store.fail_at(None).await;

    let corpus = pipeline.corpus().await.unwrap();
    assert_eq!(corpus[0].market_id, "m2");
    assert!(corpus[0].resume);
    assert_eq!(corpus[1].market_id, "m1");

    let (_tx, rx) = shutdown::channel();
    let report = pipeline.run_corpus(false, rx).await.unwrap();
    assert_eq!(report.migrated.len(), 2);
    assert!(report.migrated[0].resumed);
}
