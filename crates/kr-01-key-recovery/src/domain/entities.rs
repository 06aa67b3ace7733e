//! # Domain Entities
//!
//! Core data structures for key recovery: the search space, the recovered
//! key, reconciliation outcomes and the per-pair / per-batch reports.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use shared_types::{DomainSelector, KeyPeriodId, PairKey};

/// Source identifier written on pairs and key periods created by recovery.
pub const DEFAULT_SOURCE_IDENTIFIER: &str = "public_key_gcd_batch";

// =============================================================================
// Search Space
// =============================================================================

/// Hash algorithms a DKIM RSA signer may have used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// DER content bytes of the algorithm OID (without tag and length).
    pub fn oid(&self) -> &'static [u8] {
        match self {
            // 2.16.840.1.101.3.4.2.1
            HashAlgorithm::Sha256 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
            // 2.16.840.1.101.3.4.2.3
            HashAlgorithm::Sha512 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03],
        }
    }

    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Algorithm whose output has exactly `len` bytes.
    pub fn from_digest_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(HashAlgorithm::Sha256),
            64 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Algorithm whose OID content bytes equal `oid`.
    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        [HashAlgorithm::Sha256, HashAlgorithm::Sha512]
            .into_iter()
            .find(|alg| alg.oid() == oid)
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

/// Hash/exponent combinations tried by the recovery engine, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Outer loop.
    pub hash_algorithms: Vec<HashAlgorithm>,
    /// Inner loop.
    pub exponents: Vec<u32>,
    /// Cofactors stripped from every GCD result.
    pub small_primes: Vec<u32>,
    /// Require a stripped candidate to verify both signatures before it is
    /// accepted. When false the first candidate above 1 wins.
    pub verify_candidates: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            hash_algorithms: vec![HashAlgorithm::Sha256, HashAlgorithm::Sha512],
            exponents: vec![65537, 3, 17],
            small_primes: vec![2, 3, 5, 17, 257, 65537],
            verify_candidates: true,
        }
    }
}

impl SearchConfig {
    /// Same search, restricted to the given exponents.
    pub fn with_exponents(mut self, exponents: Vec<u32>) -> Self {
        self.exponents = exponents;
        self
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub search: SearchConfig,
    /// Written as `source_identifier` / `source` on created rows.
    pub source_identifier: String,
    /// Groups processed concurrently by `run_batch`.
    pub max_concurrent_groups: usize,
    /// Consult the key-publication feed before reconciling.
    pub consult_publication_feed: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            source_identifier: DEFAULT_SOURCE_IDENTIFIER.to_string(),
            max_concurrent_groups: 4,
            consult_publication_feed: true,
        }
    }
}

// =============================================================================
// Recovery Results
// =============================================================================

/// A modulus/exponent pair recovered from two signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredKey {
    pub modulus: BigUint,
    pub exponent: u32,
    /// Hash algorithm whose encoding produced the candidate.
    pub hash_algorithm: HashAlgorithm,
}

impl RecoveredKey {
    pub fn bits(&self) -> u64 {
        self.modulus.bits()
    }
}

/// Result of reconciling one signature against stored key periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The signature validates just outside a period; the window grows to
    /// the returned bounds.
    ConfirmedExtend {
        key_period_id: KeyPeriodId,
        first_seen_at: DateTime<Utc>,
        last_seen_at: DateTime<Utc>,
    },
    /// The signature validates inside a period.
    ConfirmedWithin { key_period_id: KeyPeriodId },
    /// No period covers or adjoins the signature.
    NotCovered,
}

impl ReconcileOutcome {
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, ReconcileOutcome::NotCovered)
    }
}

/// What happened to one adjacent signature pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// A result row already exists for the unordered pair.
    AlreadyAttempted,
    /// Both timestamps fall in one published window; the group stops here.
    PublishedKey { validated: bool },
    /// At least one signature matched a stored key period.
    Reconciled,
    /// GCD recovery succeeded and was persisted.
    Recovered { key_period_id: KeyPeriodId },
    /// GCD recovery found nothing.
    NotFound,
    /// The attempt errored; recorded as not found.
    Failed { reason: String },
}

impl PairOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            PairOutcome::AlreadyAttempted => "already_attempted",
            PairOutcome::PublishedKey { .. } => "published_key",
            PairOutcome::Reconciled => "reconciled",
            PairOutcome::Recovered { .. } => "recovered",
            PairOutcome::NotFound => "not_found",
            PairOutcome::Failed { .. } => "failed",
        }
    }
}

/// Per-group result of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub domain_selector: DomainSelector,
    pub pairs: Vec<(PairKey, PairOutcome)>,
    /// Key periods whose window was extended while reconciling.
    pub extended_periods: usize,
    /// Wall time of each solver call.
    pub solve_durations: Vec<Duration>,
    /// Processing ended on a published-window match.
    pub stopped_early: bool,
}

impl GroupReport {
    pub fn new(domain_selector: DomainSelector) -> Self {
        Self {
            domain_selector,
            pairs: Vec::new(),
            extended_periods: 0,
            solve_durations: Vec::new(),
            stopped_early: false,
        }
    }

    pub fn recovered(&self) -> usize {
        self.pairs
            .iter()
            .filter(|(_, outcome)| matches!(outcome, PairOutcome::Recovered { .. }))
            .count()
    }
}

/// Result of a full batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub groups: Vec<GroupReport>,
    /// Groups with fewer than two signatures.
    pub skipped_groups: usize,
}

impl BatchReport {
    pub fn pairs_total(&self) -> usize {
        self.groups.iter().map(|g| g.pairs.len()).sum()
    }

    pub fn keys_recovered(&self) -> usize {
        self.groups.iter().map(GroupReport::recovered).sum()
    }

    pub fn count(&self, label: &str) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.pairs.iter())
            .filter(|(_, outcome)| outcome.label() == label)
            .count()
    }
}

// =============================================================================
// Known Key Cache
// =============================================================================

/// Domain/selector pairs known to have at least one stored key.
///
/// Insert-only and shared between concurrently running groups. Never a
/// source of truth: a miss only means the store has not been asked yet.
#[derive(Debug, Clone, Default)]
pub struct KnownKeyCache {
    inner: Arc<DashSet<DomainSelector>>,
}

impl KnownKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, domain_selector: &DomainSelector) -> bool {
        self.inner.contains(domain_selector)
    }

    pub fn insert(&self, domain_selector: DomainSelector) {
        self.inner.insert(domain_selector);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: digest lengths map back to their algorithm
    #[test]
    fn test_hash_algorithm_lookup() {
        for alg in [HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
            assert_eq!(HashAlgorithm::from_digest_len(alg.digest_len()), Some(alg));
            assert_eq!(HashAlgorithm::from_oid(alg.oid()), Some(alg));
            assert_eq!(alg.digest(b"abc").len(), alg.digest_len());
        }
        assert_eq!(HashAlgorithm::from_digest_len(20), None);
    }

    /// Test: default search order
    #[test]
    fn test_default_search_config() {
        let config = SearchConfig::default();
        assert_eq!(
            config.hash_algorithms,
            vec![HashAlgorithm::Sha256, HashAlgorithm::Sha512]
        );
        assert_eq!(config.exponents, vec![65537, 3, 17]);
        assert_eq!(config.small_primes, vec![2, 3, 5, 17, 257, 65537]);
        assert!(config.verify_candidates);
    }

    /// Test: cache clones share state and duplicate inserts are harmless
    #[test]
    fn test_known_key_cache_shared() {
        let cache = KnownKeyCache::new();
        let other = cache.clone();
        let ds = DomainSelector::new("example.com", "s1");

        other.insert(ds.clone());
        other.insert(ds.clone());

        assert!(cache.contains(&ds));
        assert_eq!(cache.len(), 1);
    }

    /// Test: batch report counts by outcome label
    #[test]
    fn test_batch_report_counts() {
        let mut group = GroupReport::new(DomainSelector::new("example.com", "s1"));
        group.pairs.push((PairKey::new(1, 2), PairOutcome::Recovered { key_period_id: 1 }));
        group.pairs.push((PairKey::new(2, 3), PairOutcome::NotFound));
        group.pairs.push((PairKey::new(3, 4), PairOutcome::AlreadyAttempted));

        let report = BatchReport {
            groups: vec![group],
            skipped_groups: 2,
        };

        assert_eq!(report.pairs_total(), 3);
        assert_eq!(report.keys_recovered(), 1);
        assert_eq!(report.count("not_found"), 1);
        assert_eq!(report.count("reconciled"), 0);
    }
}
