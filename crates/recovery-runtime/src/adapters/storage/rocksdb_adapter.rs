//! # RocksDB Recovery Store
//!
//! Persistent `RecoveryStore` + `SignatureSource`. Records are stored as
//! JSON under prefixed keys in the default column family:
//!
//! | Key | Value |
//! |-----|-------|
//! | `sig:<id>` | `SignatureRecord` |
//! | `dsp:<domain>\0<selector>` | `DomainSelectorPair` |
//! | `dspi:<pair_id>` | primary `dsp:` key of that pair |
//! | `kp:<pair_id>:<period_id>` | `KeyPeriodRecord` |
//! | `kpi:<period_id>` | primary `kp:` key of that period |
//! | `attempt:<low>:<high>` | `PairAttemptResult` |
//! | `seq:pair`, `seq:period` | last assigned id (big-endian u64) |
//!
//! Ids are zero-padded to 20 digits so prefix scans return them in order.
//! Read-check-write sequences hold `write_lock`; each one commits as a
//! single `WriteBatch`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use kr_01_key_recovery::{RecoveryStore, SignatureSource, StoreError};
use parking_lot::Mutex;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{
    DomainSelector, DomainSelectorPair, KeyPeriodId, KeyPeriodRecord, NewKeyPeriod,
    PairAttemptResult, PairId, PairKey, SignatureId, SignatureRecord,
};

const SEQ_PAIR: &[u8] = b"seq:pair";
const SEQ_PERIOD: &[u8] = b"seq:period";

/// RocksDB configuration
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// Enable fsync after each write (default: true for durability)
    pub sync_writes: bool,
}

impl RocksDbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }

    /// Create config for testing (smaller buffers, no sync)
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

pub struct RocksDbRecoveryStore {
    db: DB,
    config: RocksDbConfig,
    write_lock: Mutex<()>,
}

fn backend(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{context}: {e}"))
}

fn signature_key(id: SignatureId) -> Vec<u8> {
    format!("sig:{id:020}").into_bytes()
}

fn pair_key(ds: &DomainSelector) -> Vec<u8> {
    format!("dsp:{}\0{}", ds.domain, ds.selector).into_bytes()
}

fn pair_index_key(id: PairId) -> Vec<u8> {
    format!("dspi:{id:020}").into_bytes()
}

fn period_prefix(pair_id: PairId) -> Vec<u8> {
    format!("kp:{pair_id:020}:").into_bytes()
}

fn period_key(pair_id: PairId, id: KeyPeriodId) -> Vec<u8> {
    format!("kp:{pair_id:020}:{id:020}").into_bytes()
}

fn period_index_key(id: KeyPeriodId) -> Vec<u8> {
    format!("kpi:{id:020}").into_bytes()
}

fn attempt_key(key: PairKey) -> Vec<u8> {
    format!("attempt:{:020}:{:020}", key.low(), key.high()).into_bytes()
}

impl RocksDbRecoveryStore {
    /// Open or create the database at `config.path`.
    pub fn open(config: RocksDbConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| backend("open", e))?;
        Ok(Self {
            db,
            config,
            write_lock: Mutex::new(()),
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.db.get(key).map_err(|e| backend("get", e))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| backend("decode", e)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| backend("scan", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(serde_json::from_slice(&value).map_err(|e| backend("decode", e))?);
        }
        Ok(out)
    }

    fn next_id(&self, seq: &[u8]) -> Result<u64, StoreError> {
        let current = match self.db.get(seq).map_err(|e| backend("get", e))? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| backend("sequence", "corrupt counter"))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        Ok(current + 1)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.db
            .write_opt(batch, &self.write_options())
            .map_err(|e| backend("write", e))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| backend("encode", e))
}

#[async_trait::async_trait]
impl RecoveryStore for RocksDbRecoveryStore {
    async fn find_pair(
        &self,
        domain_selector: &DomainSelector,
    ) -> Result<Option<DomainSelectorPair>, StoreError> {
        self.get_json(&pair_key(domain_selector))
    }

    async fn create_pair(
        &self,
        domain_selector: &DomainSelector,
        source_identifier: &str,
    ) -> Result<DomainSelectorPair, StoreError> {
        let _guard = self.write_lock.lock();
        let key = pair_key(domain_selector);
        if self.db.get(&key).map_err(|e| backend("get", e))?.is_some() {
            return Err(StoreError::Duplicate(format!("pair {domain_selector}")));
        }

        let id = self.next_id(SEQ_PAIR)?;
        let pair = DomainSelectorPair {
            id,
            domain: domain_selector.domain.clone(),
            selector: domain_selector.selector.clone(),
            source_identifier: source_identifier.to_string(),
        };
        let mut batch = WriteBatch::default();
        batch.put(&key, encode(&pair)?);
        batch.put(pair_index_key(id), &key);
        batch.put(SEQ_PAIR, id.to_be_bytes());
        self.commit(batch)?;
        Ok(pair)
    }

    async fn find_key_periods(&self, pair_id: PairId) -> Result<Vec<KeyPeriodRecord>, StoreError> {
        let mut periods: Vec<KeyPeriodRecord> = self.scan_json(&period_prefix(pair_id))?;
        periods.sort_by_key(|p| (p.first_seen_at, p.id));
        Ok(periods)
    }

    async fn find_key_period(
        &self,
        pair_id: PairId,
        key_data: &str,
    ) -> Result<Option<KeyPeriodRecord>, StoreError> {
        let periods: Vec<KeyPeriodRecord> = self.scan_json(&period_prefix(pair_id))?;
        Ok(periods.into_iter().find(|p| p.key_data == key_data))
    }

    async fn create_key_period(&self, period: NewKeyPeriod) -> Result<KeyPeriodRecord, StoreError> {
        let _guard = self.write_lock.lock();
        let pair_id = period.domain_selector_pair_id;
        let pair_exists = self
            .db
            .get(pair_index_key(pair_id))
            .map_err(|e| backend("get", e))?
            .is_some();
        if !pair_exists {
            return Err(StoreError::NotFound(format!("pair {pair_id}")));
        }

        let id = self.next_id(SEQ_PERIOD)?;
        let record = period.into_record(id);
        let key = period_key(pair_id, id);
        let mut batch = WriteBatch::default();
        batch.put(&key, encode(&record)?);
        batch.put(period_index_key(id), &key);
        batch.put(SEQ_PERIOD, id.to_be_bytes());
        self.commit(batch)?;
        Ok(record)
    }

    async fn update_key_period_window(
        &self,
        id: KeyPeriodId,
        first_seen_at: DateTime<Utc>,
        last_seen_at: DateTime<Utc>,
    ) -> Result<KeyPeriodRecord, StoreError> {
        let _guard = self.write_lock.lock();
        let not_found = || StoreError::NotFound(format!("key period {id}"));
        let key = self
            .db
            .get(period_index_key(id))
            .map_err(|e| backend("get", e))?
            .ok_or_else(not_found)?;
        let mut record: KeyPeriodRecord = self.get_json(&key)?.ok_or_else(not_found)?;

        record.first_seen_at = first_seen_at;
        record.last_seen_at = last_seen_at;
        let mut batch = WriteBatch::default();
        batch.put(&key, encode(&record)?);
        self.commit(batch)?;
        Ok(record)
    }

    async fn find_pair_attempt(
        &self,
        a: SignatureId,
        b: SignatureId,
    ) -> Result<Option<PairAttemptResult>, StoreError> {
        self.get_json(&attempt_key(PairKey::new(a, b)))
    }

    async fn create_pair_attempt(&self, result: PairAttemptResult) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let pair = result.pair_key();
        let key = attempt_key(pair);
        if self.db.get(&key).map_err(|e| backend("get", e))?.is_some() {
            return Err(StoreError::Duplicate(format!("pair attempt {pair}")));
        }
        let mut batch = WriteBatch::default();
        batch.put(&key, encode(&result)?);
        self.commit(batch)
    }
}

#[async_trait::async_trait]
impl SignatureSource for RocksDbRecoveryStore {
    async fn list_signatures(
        &self,
        domain: Option<&str>,
    ) -> Result<Vec<SignatureRecord>, StoreError> {
        let signatures: Vec<SignatureRecord> = self.scan_json(b"sig:")?;
        Ok(signatures
            .into_iter()
            .filter(|s| domain.map_or(true, |d| s.domain == d))
            .collect())
    }

    async fn insert_signature(&self, record: SignatureRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let key = signature_key(record.id);
        if self.db.get(&key).map_err(|e| backend("get", e))?.is_some() {
            return Err(StoreError::Duplicate(format!("signature {}", record.id)));
        }
        let mut batch = WriteBatch::default();
        batch.put(&key, encode(&record)?);
        self.commit(batch)
    }
}
