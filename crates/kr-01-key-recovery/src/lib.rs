//! # DKIM Key Recovery (KR-01)
//!
//! Recovers RSA DKIM public keys that are no longer published, from pairs of
//! historical signatures made with the same key (common-GCD attack on
//! PKCS#1 v1.5).
//!
//! ## Architecture
//!
//! This subsystem follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): encoding, recovery, validation and
//!   reconciliation, no I/O
//! - **Ports Layer** (`ports/`): Trait definitions for inbound/outbound interfaces
//! - **Service Layer** (`service.rs`): The pair pipeline, wiring domain logic to ports
//! - **Adapters** (`adapters/`): In-memory store, HTTP publication feed, local solver
//!
//! ## Safety Notes
//!
//! - **Idempotence**: each unordered signature pair is attempted and recorded
//!   at most once; re-running a batch is safe
//! - **Consistency**: a signature dated inside a stored key period that does
//!   not validate halts the batch (`PipelineError::ConsistencyViolation`)

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
mod test_fixtures;

// Re-export public API
pub use adapters::feed::{DisabledPublicationFeed, HttpKeyPublicationFeed, DEFAULT_FEED_URL};
pub use adapters::memory::InMemoryRecoveryStore;
pub use adapters::solver::LocalModulusSolver;
pub use domain::encoding::{decode_block, encode_block, encode_digest, left_pad};
pub use domain::entities::{
    BatchReport, GroupReport, HashAlgorithm, KnownKeyCache, PairOutcome, PipelineConfig,
    ReconcileOutcome, RecoveredKey, SearchConfig, DEFAULT_SOURCE_IDENTIFIER,
};
pub use domain::errors::{KeyMaterialError, PipelineError, RecoveryError};
pub use domain::keys::RsaKeyMaterial;
pub use domain::reconcile::reconcile;
pub use domain::recovery::{
    modulus_candidate, power_difference_gcd, strip_small_primes, ModulusRecovery,
};
pub use domain::validation::{validate, validate_key_data};
pub use ports::inbound::KeyRecoveryApi;
pub use ports::outbound::{
    FeedError, KeyPublicationFeed, ModulusSolver, PublishedKey, RecoveryStore, SignatureSource,
    StoreError,
};
pub use service::KeyRecoveryService;
