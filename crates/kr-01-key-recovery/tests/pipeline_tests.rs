//! End-to-end tests of the pair pipeline over the in-memory store and the
//! local solver.

mod common;

use std::sync::Arc;

use common::{day, CountingSolver, TestKey, MESSAGES};
use kr_01_key_recovery::{
    validate_key_data, DisabledPublicationFeed, InMemoryRecoveryStore, KeyRecoveryApi,
    KeyRecoveryService, LocalModulusSolver, PairOutcome, PipelineConfig, PipelineError,
    RecoveryStore, RsaKeyMaterial, SearchConfig,
};
use shared_types::{DomainSelector, KeyPeriodRecord, KeyType, NewKeyPeriod, PairKey};

type TestService =
    KeyRecoveryService<InMemoryRecoveryStore, DisabledPublicationFeed, CountingSolver<LocalModulusSolver>>;

const S1: (&str, &str) = ("example.com", "s1");
const K1: (&str, &str) = ("other.org", "k1");

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        search: SearchConfig::default().with_exponents(vec![3, 17]),
        ..PipelineConfig::default()
    }
}

fn build(store: Arc<InMemoryRecoveryStore>) -> (TestService, Arc<std::sync::Mutex<Vec<(u64, u64)>>>) {
    let config = pipeline_config();
    let solver = CountingSolver::new(LocalModulusSolver::new(config.search.clone()));
    let calls = solver.calls.clone();
    let service = KeyRecoveryService::new(
        store,
        Arc::new(DisabledPublicationFeed),
        Arc::new(solver),
        config,
    );
    (service, calls)
}

async fn seed_period(
    store: &InMemoryRecoveryStore,
    key: &TestKey,
    first: u32,
    last: u32,
) -> KeyPeriodRecord {
    let ds = DomainSelector::new(S1.0, S1.1);
    let pair = match store.find_pair(&ds).await.unwrap() {
        Some(pair) => pair,
        None => store.create_pair(&ds, "archive").await.unwrap(),
    };
    store
        .create_key_period(NewKeyPeriod {
            domain_selector_pair_id: pair.id,
            value: key.material().to_dkim_value().unwrap(),
            key_type: KeyType::Rsa,
            key_data: key.key_data(),
            first_seen_at: day(first),
            last_seen_at: day(last),
            source: "archive".into(),
        })
        .await
        .unwrap()
}

/// Test: two groups with different keys are both recovered in one batch
#[tokio::test]
async fn test_batch_recovers_keys_end_to_end() {
    let e3 = TestKey::load("e3");
    let e17 = TestKey::load("e17");
    let store = Arc::new(InMemoryRecoveryStore::new());
    let (service, _) = build(store.clone());

    let signatures = vec![
        e3.sign(1, S1, MESSAGES[0], Some(day(1))),
        e3.sign(2, S1, MESSAGES[1], Some(day(2))),
        e3.sign(3, S1, MESSAGES[2], Some(day(3))),
        e17.sign(10, K1, MESSAGES[0], Some(day(5))),
        e17.sign(11, K1, MESSAGES[1], Some(day(6))),
    ];
    let report = service.run_batch(signatures).await.unwrap();

    assert_eq!(report.groups.len(), 2);
    assert_eq!(report.keys_recovered(), 2);

    let example = &report.groups[0];
    assert_eq!(example.domain_selector, DomainSelector::new(S1.0, S1.1));
    assert!(matches!(example.pairs[0], (_, PairOutcome::Recovered { .. })));
    // signature 2 is inside the new window, signature 3 extends it
    assert_eq!(example.pairs[1], (PairKey::new(2, 3), PairOutcome::Reconciled));
    assert_eq!(example.extended_periods, 1);

    let periods = store.key_periods();
    assert_eq!(periods.len(), 2);
    let e3_period = periods
        .iter()
        .find(|p| RsaKeyMaterial::from_key_data(&p.key_data).unwrap() == e3.material())
        .unwrap();
    assert_eq!((e3_period.first_seen_at, e3_period.last_seen_at), (day(1), day(3)));
    let e17_period = periods
        .iter()
        .find(|p| RsaKeyMaterial::from_key_data(&p.key_data).unwrap() == e17.material())
        .unwrap();
    assert_eq!((e17_period.first_seen_at, e17_period.last_seen_at), (day(5), day(6)));
}

/// Test: running the batch twice adds no rows
#[tokio::test]
async fn test_rerun_creates_no_duplicates() {
    let e3 = TestKey::load("e3");
    let store = Arc::new(InMemoryRecoveryStore::new());
    let (service, calls) = build(store.clone());
    let signatures = vec![
        e3.sign(1, S1, MESSAGES[0], Some(day(1))),
        e3.sign(2, S1, MESSAGES[1], Some(day(2))),
        e3.sign(3, S1, MESSAGES[2], None),
    ];

    service.run_batch(signatures.clone()).await.unwrap();
    let attempts = store.attempt_count();
    let periods = store.key_periods();
    let solved = calls.lock().unwrap().len();

    let second = service.run_batch(signatures).await.unwrap();

    assert_eq!(store.attempt_count(), attempts);
    assert_eq!(store.key_periods(), periods);
    assert_eq!(store.pairs().len(), 1);
    assert_eq!(calls.lock().unwrap().len(), solved);
    assert_eq!(second.keys_recovered(), 0);
    assert_eq!(second.count("already_attempted"), attempts);
}

/// Test: a signature one day before a stored window extends first_seen_at
#[tokio::test]
async fn test_window_extends_by_one_day() {
    let key = TestKey::load("e65537");
    let store = Arc::new(InMemoryRecoveryStore::new());
    let period = seed_period(&store, &key, 10, 20).await;
    let (service, calls) = build(store.clone());

    let early = key.sign(1, S1, MESSAGES[0], Some(day(9)));
    let inside = key.sign(2, S1, MESSAGES[1], Some(day(15)));

    let outcome = service.process_pair(&early, &inside).await.unwrap();

    assert_eq!(outcome, PairOutcome::Reconciled);
    let updated = &store.key_periods()[0];
    assert_eq!(updated.id, period.id);
    assert_eq!(updated.first_seen_at, day(9));
    assert_eq!(updated.last_seen_at, day(20));
    assert!(calls.lock().unwrap().is_empty());
    assert!(store.attempt(1, 2).is_none());
}

/// Test: pairs containing a signature inside a validating window never reach the solver
#[tokio::test]
async fn test_known_window_short_circuits_solver() {
    let old_key = TestKey::load("e65537");
    let new_key = TestKey::load("e3");
    let store = Arc::new(InMemoryRecoveryStore::new());
    seed_period(&store, &old_key, 10, 20).await;
    let (service, calls) = build(store.clone());

    let covered = old_key.sign(1, S1, MESSAGES[3], Some(day(12)));
    let rotated_a = new_key.sign(2, S1, MESSAGES[1], Some(day(25)));
    let rotated_b = new_key.sign(3, S1, MESSAGES[2], Some(day(26)));

    let report = service
        .process_group(DomainSelector::new(S1.0, S1.1), vec![rotated_b, covered, rotated_a])
        .await
        .unwrap();

    assert_eq!(report.pairs[0], (PairKey::new(1, 2), PairOutcome::Reconciled));
    assert!(matches!(report.pairs[1], (_, PairOutcome::Recovered { .. })));
    assert_eq!(*calls.lock().unwrap(), vec![(2, 3)]);

    let periods = store.key_periods();
    assert_eq!(periods.len(), 2);
    assert_eq!((periods[1].first_seen_at, periods[1].last_seen_at), (day(25), day(26)));
    assert!(validate_key_data(&periods[1].key_data, &new_key.sign(9, S1, MESSAGES[0], None)));
}

/// Test: a signature contradicting a stored window halts the batch
#[tokio::test]
async fn test_consistency_violation_halts_batch() {
    let stored = TestKey::load("e65537");
    let forged = TestKey::load("e3");
    let store = Arc::new(InMemoryRecoveryStore::new());
    let period = seed_period(&store, &stored, 1, 30).await;
    let (service, calls) = build(store.clone());

    let signatures = vec![
        forged.sign(1, S1, MESSAGES[0], Some(day(5))),
        forged.sign(2, S1, MESSAGES[1], Some(day(6))),
    ];
    let err = service.run_batch(signatures).await.unwrap_err();

    assert_eq!(
        err,
        PipelineError::ConsistencyViolation {
            domain_selector: DomainSelector::new(S1.0, S1.1),
            signature_id: 1,
            key_period_id: period.id,
        }
    );
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(store.attempt_count(), 0);
}

/// Test: signatures from different keys under one selector record a miss
#[tokio::test]
async fn test_mixed_keys_record_not_found() {
    let store = Arc::new(InMemoryRecoveryStore::new());
    let (service, _) = build(store.clone());

    let a = TestKey::load("e3").sign(1, S1, MESSAGES[0], Some(day(1)));
    let b = TestKey::load("e17").sign(2, S1, MESSAGES[1], Some(day(2)));

    assert_eq!(service.process_pair(&a, &b).await.unwrap(), PairOutcome::NotFound);
    assert!(!store.attempt(1, 2).unwrap().found_gcd);
    assert!(store.key_periods().is_empty());
}

/// Test: signatures wider than any accepted modulus are recorded as a miss
#[tokio::test]
async fn test_oversized_signatures_recorded_as_failure() {
    let store = Arc::new(InMemoryRecoveryStore::new());
    let (service, calls) = build(store.clone());

    let key = TestKey::load("e3");
    let mut a = key.sign(1, S1, MESSAGES[0], Some(day(1)));
    let mut b = key.sign(2, S1, MESSAGES[1], Some(day(2)));
    a.signature = vec![0x3c; 4096];
    b.signature = vec![0xc3; 4096];

    let outcome = service.process_pair(&a, &b).await.unwrap();
    let PairOutcome::Failed { reason } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(reason.contains("too large"));
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert!(!store.attempt(1, 2).unwrap().found_gcd);
    assert!(store.key_periods().is_empty());
}
