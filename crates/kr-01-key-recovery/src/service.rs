//! # Key Recovery Service
//!
//! Application service layer that implements the `KeyRecoveryApi` trait:
//! the pair pipeline orchestrator.
//!
//! ## Per-pair flow
//!
//! 1. Idempotence gate: skip pairs that already have an attempt row.
//! 2. Known-key lookup (cache, then store). Informational only.
//! 3. Publication feed: both timestamps inside one published window ends
//!    the group.
//! 4. Reconcile both signatures against stored key periods. Any match skips
//!    the GCD attack. A violation halts the batch.
//! 5. Solve, sanity-check the key, persist pair + key period + attempt row.
//!
//! The attempt row is the commit point and is always written last.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use shared_types::{
    DomainSelector, KeyPeriodId, KeyPeriodRecord, KeyType, NewKeyPeriod, PairAttemptResult,
    PairKey, SignatureId, SignatureRecord,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::entities::{
    BatchReport, GroupReport, KnownKeyCache, PairOutcome, PipelineConfig, ReconcileOutcome,
    RecoveredKey,
};
use crate::domain::errors::{KeyMaterialError, PipelineError, RecoveryError};
use crate::domain::keys::RsaKeyMaterial;
use crate::domain::reconcile::reconcile;
use crate::domain::validation::validate;
use crate::ports::inbound::KeyRecoveryApi;
use crate::ports::outbound::{KeyPublicationFeed, ModulusSolver, RecoveryStore, StoreError};

/// Failure of one pair attempt. Everything except `Fatal` is recorded as
/// `foundGcd: false`.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    KeyMaterial(#[from] KeyMaterialError),

    #[error("Recovered key does not validate signature {0}")]
    Unverified(SignatureId),

    #[error(transparent)]
    Fatal(#[from] PipelineError),
}

/// Key Recovery Service.
///
/// Generic over its outbound ports; the known-key cache is owned here and
/// shared with every group this service processes.
pub struct KeyRecoveryService<S, F, M>
where
    S: RecoveryStore,
    F: KeyPublicationFeed,
    M: ModulusSolver,
{
    store: Arc<S>,
    feed: Arc<F>,
    solver: Arc<M>,
    config: PipelineConfig,
    known_keys: KnownKeyCache,
}

impl<S, F, M> KeyRecoveryService<S, F, M>
where
    S: RecoveryStore,
    F: KeyPublicationFeed,
    M: ModulusSolver,
{
    pub fn new(store: Arc<S>, feed: Arc<F>, solver: Arc<M>, config: PipelineConfig) -> Self {
        Self {
            store,
            feed,
            solver,
            config,
            known_keys: KnownKeyCache::new(),
        }
    }

    /// Use an existing cache, e.g. one shared with another service.
    pub fn with_known_keys(mut self, known_keys: KnownKeyCache) -> Self {
        self.known_keys = known_keys;
        self
    }

    pub fn known_keys(&self) -> &KnownKeyCache {
        &self.known_keys
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // =========================================================================
    // Pair pipeline
    // =========================================================================

    async fn run_pair(
        &self,
        a: &SignatureRecord,
        b: &SignatureRecord,
        report: &mut GroupReport,
    ) -> Result<PairOutcome, PipelineError> {
        match self.store.find_pair_attempt(a.id, b.id).await {
            Ok(Some(_)) => {
                debug!(signature_a = a.id, signature_b = b.id, "Pair already attempted");
                return Ok(PairOutcome::AlreadyAttempted);
            }
            Ok(None) => {}
            Err(e) => {
                // Without the gate nothing may be written for this pair.
                warn!(signature_a = a.id, signature_b = b.id, error = %e, "Idempotence check failed");
                return Ok(PairOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        }

        match self.attempt(a, b, report).await {
            Ok(outcome) => Ok(outcome),
            Err(AttemptError::Fatal(e)) => Err(e),
            Err(e) => {
                warn!(
                    domain = %a.domain,
                    selector = %a.selector,
                    signature_a = a.id,
                    signature_b = b.id,
                    error = %e,
                    "Pair attempt failed"
                );
                // Already logged by `record`; the outcome stays Failed.
                let _ = self.record(PairAttemptResult::not_found(a.id, b.id)).await;
                Ok(PairOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn attempt(
        &self,
        a: &SignatureRecord,
        b: &SignatureRecord,
        report: &mut GroupReport,
    ) -> Result<PairOutcome, AttemptError> {
        let domain_selector = a.domain_selector();

        if self.has_known_keys(&domain_selector).await {
            debug!(%domain_selector, "Known keys exist, processing anyway");
        }

        if self.config.consult_publication_feed {
            if let Some(validated) = self.check_published_window(&domain_selector, a, b).await {
                return Ok(PairOutcome::PublishedKey { validated });
            }
        }

        if self.reconcile_pair(&domain_selector, a, b, report).await? {
            info!(
                signature_a = a.id,
                signature_b = b.id,
                "Pair explained by stored key period, skipping GCD"
            );
            return Ok(PairOutcome::Reconciled);
        }

        let started = Instant::now();
        let solved = self.solver.solve(a.clone(), b.clone()).await;
        report.solve_durations.push(started.elapsed());

        match solved? {
            Some(key) => {
                let key_period_id = self.persist_recovered(&domain_selector, a, b, &key).await?;
                self.record(PairAttemptResult::found(a.id, b.id, key_period_id))
                    .await?;
                Ok(PairOutcome::Recovered { key_period_id })
            }
            None => {
                info!(signature_a = a.id, signature_b = b.id, "No modulus found");
                self.record(PairAttemptResult::not_found(a.id, b.id)).await?;
                Ok(PairOutcome::NotFound)
            }
        }
    }

    async fn has_known_keys(&self, domain_selector: &DomainSelector) -> bool {
        if self.known_keys.contains(domain_selector) {
            return true;
        }
        let pair = match self.store.find_pair(domain_selector).await {
            Ok(Some(pair)) => pair,
            Ok(None) => return false,
            Err(e) => {
                debug!(%domain_selector, error = %e, "Known key lookup failed");
                return false;
            }
        };
        match self.store.find_key_periods(pair.id).await {
            Ok(periods) if !periods.is_empty() => {
                self.known_keys.insert(domain_selector.clone());
                true
            }
            _ => false,
        }
    }

    /// `Some(validated)` when both timestamps fall inside one published
    /// window of this selector. Feed errors count as not covered.
    async fn check_published_window(
        &self,
        domain_selector: &DomainSelector,
        a: &SignatureRecord,
        b: &SignatureRecord,
    ) -> Option<bool> {
        let (Some(at_a), Some(at_b)) = (a.timestamp, b.timestamp) else {
            return None;
        };
        let published = match self.feed.published_keys(&domain_selector.domain).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(%domain_selector, error = %e, "Publication feed lookup failed");
                return None;
            }
        };

        let key = published
            .iter()
            .filter(|key| key.selector == domain_selector.selector)
            .find(|key| key.covers(at_a) && key.covers(at_b))?;

        let validated = match RsaKeyMaterial::from_dkim_value(&key.value) {
            Ok(material) => validate(&material, a) && validate(&material, b),
            Err(e) => {
                warn!(%domain_selector, error = %e, "Published key is not usable");
                false
            }
        };
        if validated {
            info!(
                %domain_selector,
                first_seen_at = %key.first_seen_at,
                last_seen_at = %key.last_seen_at,
                "Both signatures validate against published key"
            );
        } else {
            warn!(
                %domain_selector,
                signature_a = a.id,
                signature_b = b.id,
                "Signatures inside published window do not validate"
            );
        }
        Some(validated)
    }

    /// Reconcile both signatures, applying window extensions as they are
    /// found. Returns whether either signature was confirmed.
    async fn reconcile_pair(
        &self,
        domain_selector: &DomainSelector,
        a: &SignatureRecord,
        b: &SignatureRecord,
        report: &mut GroupReport,
    ) -> Result<bool, AttemptError> {
        let Some(pair) = self.store.find_pair(domain_selector).await? else {
            return Ok(false);
        };
        let mut periods = self.store.find_key_periods(pair.id).await?;

        let mut confirmed = false;
        for signature in [a, b] {
            let outcome = reconcile(signature, &periods)?;
            if let ReconcileOutcome::ConfirmedExtend {
                key_period_id,
                first_seen_at,
                last_seen_at,
            } = outcome
            {
                let updated = self
                    .store
                    .update_key_period_window(key_period_id, first_seen_at, last_seen_at)
                    .await?;
                info!(
                    signature_id = signature.id,
                    key_period_id,
                    first_seen_at = %updated.first_seen_at,
                    last_seen_at = %updated.last_seen_at,
                    "Extended key period"
                );
                replace_period(&mut periods, updated);
                report.extended_periods += 1;
            }
            confirmed |= outcome.is_confirmed();
        }
        Ok(confirmed)
    }

    async fn persist_recovered(
        &self,
        domain_selector: &DomainSelector,
        a: &SignatureRecord,
        b: &SignatureRecord,
        key: &RecoveredKey,
    ) -> Result<KeyPeriodId, AttemptError> {
        let material = RsaKeyMaterial::from(key);
        for signature in [a, b] {
            if !validate(&material, signature) {
                return Err(AttemptError::Unverified(signature.id));
            }
        }
        let key_data = material.to_key_data()?;

        let pair = match self.store.find_pair(domain_selector).await? {
            Some(pair) => pair,
            None => {
                let pair = self
                    .store
                    .create_pair(domain_selector, &self.config.source_identifier)
                    .await?;
                info!(%domain_selector, pair_id = pair.id, "Created domain/selector pair");
                pair
            }
        };

        let period = match self.store.find_key_period(pair.id, &key_data).await? {
            Some(period) => period,
            None => {
                let (first_seen_at, last_seen_at) = seen_window(a.timestamp, b.timestamp);
                let period = self
                    .store
                    .create_key_period(NewKeyPeriod {
                        domain_selector_pair_id: pair.id,
                        value: material.to_dkim_value()?,
                        key_type: KeyType::Rsa,
                        key_data,
                        first_seen_at,
                        last_seen_at,
                        source: self.config.source_identifier.clone(),
                    })
                    .await?;
                info!(
                    %domain_selector,
                    key_period_id = period.id,
                    exponent = key.exponent,
                    bits = key.bits(),
                    "Created key period"
                );
                period
            }
        };

        self.known_keys.insert(domain_selector.clone());
        Ok(period.id)
    }

    /// Write the attempt row. A row already present for the pair counts as
    /// written; any other store error is returned.
    async fn record(&self, result: PairAttemptResult) -> Result<(), StoreError> {
        let pair = result.pair_key();
        match self.store.create_pair_attempt(result).await {
            Ok(()) => Ok(()),
            Err(StoreError::Duplicate(_)) => {
                debug!(%pair, "Pair attempt already recorded");
                Ok(())
            }
            Err(e) => {
                warn!(%pair, error = %e, "Failed to record pair attempt");
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl<S, F, M> KeyRecoveryApi for KeyRecoveryService<S, F, M>
where
    S: RecoveryStore,
    F: KeyPublicationFeed,
    M: ModulusSolver,
{
    async fn process_pair(
        &self,
        a: &SignatureRecord,
        b: &SignatureRecord,
    ) -> Result<PairOutcome, PipelineError> {
        let mut scratch = GroupReport::new(a.domain_selector());
        self.run_pair(a, b, &mut scratch).await
    }

    async fn process_group(
        &self,
        domain_selector: DomainSelector,
        mut signatures: Vec<SignatureRecord>,
    ) -> Result<GroupReport, PipelineError> {
        sort_for_pairing(&mut signatures);
        let mut report = GroupReport::new(domain_selector);
        info!(
            domain_selector = %report.domain_selector,
            signatures = signatures.len(),
            "Processing group"
        );

        for window in signatures.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            let outcome = self.run_pair(a, b, &mut report).await?;
            let stop = matches!(outcome, PairOutcome::PublishedKey { .. });
            report.pairs.push((PairKey::new(a.id, b.id), outcome));
            if stop {
                info!(domain_selector = %report.domain_selector, "Published key found, stopping group");
                report.stopped_early = true;
                break;
            }
        }
        Ok(report)
    }

    async fn run_batch(
        &self,
        signatures: Vec<SignatureRecord>,
    ) -> Result<BatchReport, PipelineError> {
        let mut groups: BTreeMap<DomainSelector, Vec<SignatureRecord>> = BTreeMap::new();
        for signature in signatures {
            groups
                .entry(signature.domain_selector())
                .or_default()
                .push(signature);
        }

        let mut report = BatchReport::default();
        let runnable: Vec<_> = groups
            .into_iter()
            .filter(|(domain_selector, sigs)| {
                if sigs.len() < 2 {
                    info!(%domain_selector, "Fewer than two signatures, skipping group");
                    report.skipped_groups += 1;
                    return false;
                }
                true
            })
            .collect();

        let limit = self.config.max_concurrent_groups.max(1);
        let mut results = stream::iter(runnable)
            .map(|(domain_selector, sigs)| self.process_group(domain_selector, sigs))
            .buffer_unordered(limit);

        while let Some(result) = results.next().await {
            match result {
                Ok(group) => report.groups.push(group),
                Err(e) => {
                    warn!(error = %e, "Halting batch");
                    return Err(e);
                }
            }
        }

        report
            .groups
            .sort_by(|x, y| x.domain_selector.cmp(&y.domain_selector));
        info!(
            groups = report.groups.len(),
            skipped = report.skipped_groups,
            pairs = report.pairs_total(),
            recovered = report.keys_recovered(),
            "Batch complete"
        );
        Ok(report)
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Oldest timestamp first; undated signatures last, by id.
fn sort_for_pairing(signatures: &mut [SignatureRecord]) {
    signatures.sort_by(|x, y| match (x.timestamp, y.timestamp) {
        (Some(a), Some(b)) => a.cmp(&b).then(x.id.cmp(&y.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => x.id.cmp(&y.id),
    });
}

/// Window spanned by two optional timestamps; now when both are missing.
fn seen_window(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    match (a, b) {
        (Some(a), Some(b)) => (a.min(b), a.max(b)),
        (Some(t), None) | (None, Some(t)) => (t, t),
        (None, None) => {
            let now = Utc::now();
            (now, now)
        }
    }
}

fn replace_period(periods: &mut [KeyPeriodRecord], updated: KeyPeriodRecord) {
    if let Some(slot) = periods.iter_mut().find(|p| p.id == updated.id) {
        *slot = updated;
    }
}

/// Total solver time across a report.
pub fn total_solve_time(report: &BatchReport) -> Duration {
    report
        .groups
        .iter()
        .flat_map(|g| g.solve_durations.iter())
        .sum()
}

// =============================================================================
// TESTS
// =============================================================================
