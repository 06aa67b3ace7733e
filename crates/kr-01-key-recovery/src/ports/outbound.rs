//! # Outbound Ports (Driven Ports / SPI)
//!
//! Traits that define dependencies the recovery pipeline needs:
//!
//! - `RecoveryStore`: pairs, key periods and the pair-attempt commit log
//! - `SignatureSource`: ingested signatures
//! - `KeyPublicationFeed`: externally published key-validity windows
//! - `ModulusSolver`: the GCD attack, possibly off-thread or remote

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{
    DomainSelector, DomainSelectorPair, KeyPeriodId, KeyPeriodRecord, NewKeyPeriod,
    PairAttemptResult, PairId, SignatureId, SignatureRecord,
};
use thiserror::Error;

use crate::domain::entities::RecoveredKey;
use crate::domain::errors::RecoveryError;

// =============================================================================
// Store
// =============================================================================

/// Error from store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint was hit
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    /// The referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Persistence for everything the pipeline writes.
///
/// Every operation is atomic and strongly consistent from the caller's
/// point of view. `create_pair_attempt` enforces uniqueness of the
/// unordered signature pair; that constraint plus `find_pair_attempt` is
/// what makes re-running a batch safe.
#[async_trait::async_trait]
pub trait RecoveryStore: Send + Sync {
    async fn find_pair(
        &self,
        domain_selector: &DomainSelector,
    ) -> Result<Option<DomainSelectorPair>, StoreError>;

    /// # Errors
    /// * `StoreError::Duplicate` - the pair already exists
    async fn create_pair(
        &self,
        domain_selector: &DomainSelector,
        source_identifier: &str,
    ) -> Result<DomainSelectorPair, StoreError>;

    /// Key periods of a pair, ordered by `first_seen_at`.
    async fn find_key_periods(&self, pair_id: PairId) -> Result<Vec<KeyPeriodRecord>, StoreError>;

    /// Key period of a pair with exactly this key data.
    async fn find_key_period(
        &self,
        pair_id: PairId,
        key_data: &str,
    ) -> Result<Option<KeyPeriodRecord>, StoreError>;

    async fn create_key_period(&self, period: NewKeyPeriod) -> Result<KeyPeriodRecord, StoreError>;

    /// # Errors
    /// * `StoreError::NotFound` - no key period with this id
    async fn update_key_period_window(
        &self,
        id: KeyPeriodId,
        first_seen_at: DateTime<Utc>,
        last_seen_at: DateTime<Utc>,
    ) -> Result<KeyPeriodRecord, StoreError>;

    /// Attempt recorded for the unordered pair `{a, b}`.
    async fn find_pair_attempt(
        &self,
        a: SignatureId,
        b: SignatureId,
    ) -> Result<Option<PairAttemptResult>, StoreError>;

    /// # Errors
    /// * `StoreError::Duplicate` - the unordered pair was already recorded
    async fn create_pair_attempt(&self, result: PairAttemptResult) -> Result<(), StoreError>;
}

/// Read/append access to ingested signatures.
#[async_trait::async_trait]
pub trait SignatureSource: Send + Sync {
    /// All signatures, or those of one domain.
    async fn list_signatures(&self, domain: Option<&str>)
        -> Result<Vec<SignatureRecord>, StoreError>;

    /// # Errors
    /// * `StoreError::Duplicate` - a signature with this id exists
    async fn insert_signature(&self, record: SignatureRecord) -> Result<(), StoreError>;
}

// =============================================================================
// Publication Feed
// =============================================================================

/// One published key-validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedKey {
    pub selector: String,
    /// DKIM TXT style value, e.g. `k=rsa; p=MIIB...`.
    pub value: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl PublishedKey {
    /// Inclusive window check.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.first_seen_at <= at && at <= self.last_seen_at
    }
}

/// Error from the publication feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed returned status {0}")]
    Status(u16),

    #[error("Failed to decode feed response: {0}")]
    Decode(String),
}

/// Read-only source of published key windows.
///
/// Failures are never fatal to the pipeline; they degrade to "not covered".
#[async_trait::async_trait]
pub trait KeyPublicationFeed: Send + Sync {
    /// Published keys of every selector of `domain`.
    async fn published_keys(&self, domain: &str) -> Result<Vec<PublishedKey>, FeedError>;
}

// =============================================================================
// Solver
// =============================================================================

/// Runs the hash/exponent GCD search over one pair.
#[async_trait::async_trait]
pub trait ModulusSolver: Send + Sync {
    async fn solve(
        &self,
        a: SignatureRecord,
        b: SignatureRecord,
    ) -> Result<Option<RecoveredKey>, RecoveryError>;
}
