//! # Runtime Configuration
//!
//! Built in three layers: `Default`, then `KR_*` environment variables, then
//! command-line flags. Environment values that do not parse are logged and
//! ignored.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `KR_DOMAIN_FILTER` | `domain_filter` |
//! | `KR_FEED_URL` | `feed.url` |
//! | `KR_FEED_DISABLED` | `feed.enabled` (inverted) |
//! | `KR_FEED_TIMEOUT_SECS` | `feed.timeout` |
//! | `KR_MAX_CONCURRENT_GROUPS` | `pipeline.max_concurrent_groups` |
//! | `KR_EXPONENTS` | `pipeline.search.exponents` (comma separated) |
//! | `KR_STORAGE_BACKEND` | `storage.backend` (`memory` or `rocksdb`) |
//! | `KR_DB_PATH` | `storage.db_path` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use kr_01_key_recovery::{PipelineConfig, DEFAULT_FEED_URL};
use tracing::warn;

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Only process signatures of this domain.
    pub domain_filter: Option<String>,
    pub feed: FeedConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

/// Key-publication feed settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub url: String,
    pub enabled: bool,
    pub timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            enabled: true,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StorageBackend {
    /// Process-local; lost on exit.
    #[default]
    Memory,
    /// Persistent; needs the `rocksdb` feature.
    Rocksdb,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "rocksdb" => Ok(StorageBackend::Rocksdb),
            other => Err(format!("unknown storage backend {other:?}")),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Rocksdb => write!(f, "rocksdb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            db_path: PathBuf::from("./data/key-recovery"),
        }
    }
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub domain: Option<String>,
    pub feed_url: Option<String>,
    pub no_feed: bool,
    pub max_concurrent_groups: Option<usize>,
    pub exponents: Option<Vec<u32>>,
    pub backend: Option<StorageBackend>,
    pub db_path: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply environment-style overrides from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(domain) = lookup("KR_DOMAIN_FILTER").filter(|d| !d.trim().is_empty()) {
            config.domain_filter = Some(domain.trim().to_string());
        }
        if let Some(url) = lookup("KR_FEED_URL").filter(|u| !u.trim().is_empty()) {
            config.feed.url = url.trim().to_string();
        }
        if let Some(flag) = lookup("KR_FEED_DISABLED") {
            config.feed.enabled = !is_true(&flag);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "KR_FEED_TIMEOUT_SECS") {
            config.feed.timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "KR_MAX_CONCURRENT_GROUPS") {
            config.pipeline.max_concurrent_groups = limit;
        }
        if let Some(raw) = lookup("KR_EXPONENTS") {
            match parse_exponents(&raw) {
                Some(exponents) => config.pipeline.search.exponents = exponents,
                None => warn!(key = "KR_EXPONENTS", value = %raw, "Ignoring unparseable setting"),
            }
        }
        if let Some(backend) = parse_var::<StorageBackend>(&lookup, "KR_STORAGE_BACKEND") {
            config.storage.backend = backend;
        }
        if let Some(path) = lookup("KR_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.storage.db_path = PathBuf::from(path.trim());
        }

        config
    }

    /// Apply command-line flags on top.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(domain) = overrides.domain {
            self.domain_filter = Some(domain);
        }
        if let Some(url) = overrides.feed_url {
            self.feed.url = url;
        }
        if overrides.no_feed {
            self.feed.enabled = false;
        }
        if let Some(limit) = overrides.max_concurrent_groups {
            self.pipeline.max_concurrent_groups = limit;
        }
        if let Some(exponents) = overrides.exponents.filter(|e| !e.is_empty()) {
            self.pipeline.search.exponents = exponents;
        }
        if let Some(backend) = overrides.backend {
            self.storage.backend = backend;
        }
        if let Some(path) = overrides.db_path {
            self.storage.db_path = path;
        }
    }

    /// Pipeline settings as the service sees them: the feed switch follows
    /// `feed.enabled`.
    pub fn effective_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            consult_publication_feed: self.feed.enabled,
            ..self.pipeline.clone()
        }
    }
}

fn is_true(raw: &str) -> bool {
    let raw = raw.trim().to_ascii_lowercase();
    raw == "true" || raw == "1" || raw == "yes"
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

/// `"65537, 3,17"` -> `[65537, 3, 17]`. Empty lists and zero are rejected.
pub fn parse_exponents(raw: &str) -> Option<Vec<u32>> {
    let exponents: Vec<u32> = raw
        .split(',')
        .map(|part| part.trim().parse::<u32>().ok().filter(|e| *e > 0))
        .collect::<Option<_>>()?;
    (!exponents.is_empty()).then_some(exponents)
}
