//! # Production Storage Adapters
//!
//! Enable the `rocksdb` feature for the persistent backend:
//!
//! ```toml
//! recovery-runtime = { path = "...", features = ["rocksdb"] }
//! ```
//!
//! Without it only `kr_01_key_recovery::InMemoryRecoveryStore` is available.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbRecoveryStore};
