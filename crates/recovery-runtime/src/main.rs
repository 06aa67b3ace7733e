//! # DKIM Key Recovery Runtime
//!
//! `kr-recover` drives the recovery pipeline over a signature archive.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`KR_LOG_LEVEL`, `KR_JSON_LOGS`, `RUST_LOG`)
//! 2. Load configuration: defaults, then `KR_*` environment, then flags
//! 3. Open the selected store (memory, or RocksDB with the `rocksdb` feature)
//! 4. Import a JSON Lines archive if one was given
//! 5. Run the batch and report; a consistency violation exits non-zero
//!
//! ```text
//! kr-recover recover --import signatures.jsonl --domain example.com
//! kr-recover --backend rocksdb --db-path ./data/kr import signatures.jsonl
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use kr_01_key_recovery::{InMemoryRecoveryStore, RecoveryStore, SignatureSource};
use recovery_runtime::{ConfigOverrides, RecoveryRuntime, RuntimeConfig, StorageBackend};
use recovery_telemetry::{encode_metrics, init_logging, record_batch, register_metrics};

#[derive(Debug, Parser)]
#[command(name = "kr-recover", version, about = "Recover unpublished DKIM RSA keys")]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct StorageArgs {
    /// Storage backend
    #[arg(long, global = true, value_enum)]
    backend: Option<StorageBackend>,

    /// RocksDB directory
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the recovery batch over stored signatures
    Recover {
        /// Only process this domain
        #[arg(long)]
        domain: Option<String>,

        /// JSON Lines archive to import before the batch
        #[arg(long)]
        import: Option<PathBuf>,

        /// Write Prometheus metrics here when the batch ends
        #[arg(long)]
        metrics_out: Option<PathBuf>,

        /// Key publication feed base URL
        #[arg(long)]
        feed_url: Option<String>,

        /// Do not consult the publication feed
        #[arg(long)]
        no_feed: bool,

        #[arg(long)]
        max_concurrent_groups: Option<usize>,

        /// Public exponents to try, in order
        #[arg(long, value_delimiter = ',')]
        exponents: Option<Vec<u32>>,
    },

    /// Import a JSON Lines signature archive
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&recovery_telemetry::TelemetryConfig::from_env())
        .context("failed to initialize logging")?;

    let cli = Cli::parse();
    let config = load_config(&cli);
    info!(
        backend = %config.storage.backend,
        db_path = %config.storage.db_path.display(),
        "Configuration loaded"
    );

    match config.storage.backend {
        StorageBackend::Memory => {
            execute(config, Arc::new(InMemoryRecoveryStore::new()), cli.command).await
        }
        StorageBackend::Rocksdb => open_rocksdb(config, cli.command).await,
    }
}

fn load_config(cli: &Cli) -> RuntimeConfig {
    let mut config = RuntimeConfig::from_env();
    let mut overrides = ConfigOverrides {
        backend: cli.storage.backend,
        db_path: cli.storage.db_path.clone(),
        ..ConfigOverrides::default()
    };
    if let Command::Recover {
        domain,
        feed_url,
        no_feed,
        max_concurrent_groups,
        exponents,
        ..
    } = &cli.command
    {
        overrides.domain = domain.clone();
        overrides.feed_url = feed_url.clone();
        overrides.no_feed = *no_feed;
        overrides.max_concurrent_groups = *max_concurrent_groups;
        overrides.exponents = exponents.clone();
    }
    config.apply(overrides);
    config
}

#[cfg(feature = "rocksdb")]
async fn open_rocksdb(config: RuntimeConfig, command: Command) -> Result<()> {
    use recovery_runtime::adapters::storage::{RocksDbConfig, RocksDbRecoveryStore};

    let path = config.storage.db_path.clone();
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let store = RocksDbRecoveryStore::open(RocksDbConfig::new(path))
        .context("failed to open RocksDB store")?;
    execute(config, Arc::new(store), command).await
}

#[cfg(not(feature = "rocksdb"))]
async fn open_rocksdb(_config: RuntimeConfig, _command: Command) -> Result<()> {
    anyhow::bail!("the rocksdb backend needs a build with `--features rocksdb`")
}

async fn execute<S>(config: RuntimeConfig, store: Arc<S>, command: Command) -> Result<()>
where
    S: RecoveryStore + SignatureSource + 'static,
{
    let runtime = RecoveryRuntime::new(config, store)?;

    match command {
        Command::Import { path } => {
            let summary = runtime.import(&path).await?;
            println!(
                "imported {} signatures ({} already stored)",
                summary.inserted, summary.duplicates
            );
        }
        Command::Recover {
            import,
            metrics_out,
            ..
        } => {
            if let Some(path) = import {
                runtime.import(&path).await?;
            }

            let report = runtime.recover().await?;
            println!(
                "groups: {}  skipped: {}  pairs: {}  recovered: {}  not found: {}  failed: {}",
                report.groups.len(),
                report.skipped_groups,
                report.pairs_total(),
                report.keys_recovered(),
                report.count("not_found"),
                report.count("failed"),
            );

            if let Some(path) = metrics_out {
                register_metrics()?;
                record_batch(&report);
                std::fs::write(&path, encode_metrics()?)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
    }
    Ok(())
}
