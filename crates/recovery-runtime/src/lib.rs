//! # Recovery Runtime Library
//!
//! Exposes the runtime internals for testing. The entry point is the
//! `kr-recover` binary in `main.rs`.
//!
//! - `container`: configuration and the `RecoveryRuntime` wiring
//! - `adapters`: feed selection and the optional RocksDB store
//! - `import`: JSON Lines signature archives

pub mod adapters;
pub mod container;
pub mod import;

pub use container::{
    ConfigOverrides, FeedConfig, RecoveryRuntime, RuntimeConfig, RuntimeError, StorageBackend,
    StorageConfig,
};
pub use import::{ImportError, ImportSummary};
