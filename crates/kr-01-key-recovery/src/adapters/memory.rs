//! # In-Memory Store
//!
//! `RecoveryStore` + `SignatureSource` over a single `RwLock`. Used by tests
//! and by the runtime's `memory` backend. Every operation takes the lock
//! once, so each is atomic.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared_types::{
    DomainSelector, DomainSelectorPair, KeyPeriodId, KeyPeriodRecord, NewKeyPeriod,
    PairAttemptResult, PairId, PairKey, SignatureId, SignatureRecord,
};

use crate::ports::outbound::{RecoveryStore, SignatureSource, StoreError};

#[derive(Default)]
struct State {
    pairs: BTreeMap<PairId, DomainSelectorPair>,
    pair_index: HashMap<DomainSelector, PairId>,
    periods: BTreeMap<KeyPeriodId, KeyPeriodRecord>,
    attempts: HashMap<PairKey, PairAttemptResult>,
    signatures: BTreeMap<SignatureId, SignatureRecord>,
    next_pair_id: PairId,
    next_period_id: KeyPeriodId,
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryRecoveryStore {
    state: RwLock<State>,
}

impl InMemoryRecoveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with signatures.
    pub fn with_signatures(signatures: impl IntoIterator<Item = SignatureRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write();
            for signature in signatures {
                state.signatures.insert(signature.id, signature);
            }
        }
        store
    }

    pub fn pairs(&self) -> Vec<DomainSelectorPair> {
        self.state.read().pairs.values().cloned().collect()
    }

    /// All key periods, by id.
    pub fn key_periods(&self) -> Vec<KeyPeriodRecord> {
        self.state.read().periods.values().cloned().collect()
    }

    pub fn attempt(&self, a: SignatureId, b: SignatureId) -> Option<PairAttemptResult> {
        self.state.read().attempts.get(&PairKey::new(a, b)).cloned()
    }

    pub fn attempt_count(&self) -> usize {
        self.state.read().attempts.len()
    }

    pub fn signature_count(&self) -> usize {
        self.state.read().signatures.len()
    }
}

#[async_trait::async_trait]
impl RecoveryStore for InMemoryRecoveryStore {
    async fn find_pair(
        &self,
        domain_selector: &DomainSelector,
    ) -> Result<Option<DomainSelectorPair>, StoreError> {
        let state = self.state.read();
        Ok(state
            .pair_index
            .get(domain_selector)
            .and_then(|id| state.pairs.get(id))
            .cloned())
    }

    async fn create_pair(
        &self,
        domain_selector: &DomainSelector,
        source_identifier: &str,
    ) -> Result<DomainSelectorPair, StoreError> {
        let mut state = self.state.write();
        if state.pair_index.contains_key(domain_selector) {
            return Err(StoreError::Duplicate(format!("pair {domain_selector}")));
        }
        state.next_pair_id += 1;
        let pair = DomainSelectorPair {
            id: state.next_pair_id,
            domain: domain_selector.domain.clone(),
            selector: domain_selector.selector.clone(),
            source_identifier: source_identifier.to_string(),
        };
        state.pair_index.insert(domain_selector.clone(), pair.id);
        state.pairs.insert(pair.id, pair.clone());
        Ok(pair)
    }

    async fn find_key_periods(&self, pair_id: PairId) -> Result<Vec<KeyPeriodRecord>, StoreError> {
        let mut periods: Vec<_> = self
            .state
            .read()
            .periods
            .values()
            .filter(|p| p.domain_selector_pair_id == pair_id)
            .cloned()
            .collect();
        periods.sort_by_key(|p| (p.first_seen_at, p.id));
        Ok(periods)
    }

    async fn find_key_period(
        &self,
        pair_id: PairId,
        key_data: &str,
    ) -> Result<Option<KeyPeriodRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .periods
            .values()
            .find(|p| p.domain_selector_pair_id == pair_id && p.key_data == key_data)
            .cloned())
    }

    async fn create_key_period(&self, period: NewKeyPeriod) -> Result<KeyPeriodRecord, StoreError> {
        let mut state = self.state.write();
        if !state.pairs.contains_key(&period.domain_selector_pair_id) {
            return Err(StoreError::NotFound(format!(
                "pair {}",
                period.domain_selector_pair_id
            )));
        }
        state.next_period_id += 1;
        let record = period.into_record(state.next_period_id);
        state.periods.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_key_period_window(
        &self,
        id: KeyPeriodId,
        first_seen_at: DateTime<Utc>,
        last_seen_at: DateTime<Utc>,
    ) -> Result<KeyPeriodRecord, StoreError> {
        let mut state = self.state.write();
        let record = state
            .periods
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("key period {id}")))?;
        record.first_seen_at = first_seen_at;
        record.last_seen_at = last_seen_at;
        Ok(record.clone())
    }

    async fn find_pair_attempt(
        &self,
        a: SignatureId,
        b: SignatureId,
    ) -> Result<Option<PairAttemptResult>, StoreError> {
        Ok(self.attempt(a, b))
    }

    async fn create_pair_attempt(&self, result: PairAttemptResult) -> Result<(), StoreError> {
        let key = result.pair_key();
        let mut state = self.state.write();
        if state.attempts.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("pair attempt {key}")));
        }
        state.attempts.insert(key, result);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SignatureSource for InMemoryRecoveryStore {
    async fn list_signatures(
        &self,
        domain: Option<&str>,
    ) -> Result<Vec<SignatureRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .signatures
            .values()
            .filter(|s| domain.map_or(true, |d| s.domain == d))
            .cloned()
            .collect())
    }

    async fn insert_signature(&self, record: SignatureRecord) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.signatures.contains_key(&record.id) {
            return Err(StoreError::Duplicate(format!("signature {}", record.id)));
        }
        state.signatures.insert(record.id, record);
        Ok(())
    }
}
