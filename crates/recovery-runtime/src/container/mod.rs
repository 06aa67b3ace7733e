//! # Recovery Container
//!
//! Holds the store, the selected publication feed, the local solver and the
//! KR-01 service built on top of them. Generic over the store so the binary
//! can pick a backend at startup.

pub mod config;

use std::path::Path;
use std::sync::Arc;

use kr_01_key_recovery::service::total_solve_time;
use kr_01_key_recovery::{
    BatchReport, FeedError, KeyRecoveryApi, KeyRecoveryService, LocalModulusSolver,
    PipelineError, RecoveryStore, SignatureSource, StoreError,
};
use thiserror::Error;
use tracing::info;

use crate::adapters::RuntimeFeed;
use crate::import::{import_signatures, read_signatures, ImportError, ImportSummary};

pub use config::{ConfigOverrides, FeedConfig, RuntimeConfig, StorageBackend, StorageConfig};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("publication feed setup failed: {0}")]
    Feed(#[from] FeedError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("import failed: {0}")]
    Import(#[from] ImportError),

    /// The batch stopped on a consistency violation.
    #[error("batch halted: {0}")]
    Halted(#[from] PipelineError),
}

type Service<S> = KeyRecoveryService<S, RuntimeFeed, LocalModulusSolver>;

pub struct RecoveryRuntime<S>
where
    S: RecoveryStore + SignatureSource + 'static,
{
    config: RuntimeConfig,
    store: Arc<S>,
    service: Service<S>,
}

impl<S> RecoveryRuntime<S>
where
    S: RecoveryStore + SignatureSource + 'static,
{
    pub fn new(config: RuntimeConfig, store: Arc<S>) -> Result<Self, RuntimeError> {
        let feed = RuntimeFeed::from_config(&config.feed)?;
        let pipeline = config.effective_pipeline();
        let solver = LocalModulusSolver::new(pipeline.search.clone());

        info!(
            feed_enabled = feed.is_enabled(),
            feed_url = %config.feed.url,
            max_concurrent_groups = pipeline.max_concurrent_groups,
            exponents = ?pipeline.search.exponents,
            "Recovery runtime ready"
        );

        let service = KeyRecoveryService::new(
            Arc::clone(&store),
            Arc::new(feed),
            Arc::new(solver),
            pipeline,
        );
        Ok(Self {
            config,
            store,
            service,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Load a JSON Lines archive into the store.
    pub async fn import(&self, path: &Path) -> Result<ImportSummary, RuntimeError> {
        let records = read_signatures(path)?;
        info!(path = %path.display(), records = records.len(), "Importing signatures");
        Ok(import_signatures(self.store.as_ref(), records).await?)
    }

    /// Run one batch over every stored signature matching the domain filter.
    pub async fn recover(&self) -> Result<BatchReport, RuntimeError> {
        let domain = self.config.domain_filter.as_deref();
        let signatures = self.store.list_signatures(domain).await?;
        info!(
            domain = domain.unwrap_or("*"),
            signatures = signatures.len(),
            "Starting recovery batch"
        );

        let report = self.service.run_batch(signatures).await?;

        info!(
            groups = report.groups.len(),
            skipped_groups = report.skipped_groups,
            pairs = report.pairs_total(),
            recovered = report.keys_recovered(),
            not_found = report.count("not_found"),
            already_attempted = report.count("already_attempted"),
            failed = report.count("failed"),
            solve_secs = total_solve_time(&report).as_secs_f64(),
            "Recovery batch finished"
        );
        Ok(report)
    }
}
