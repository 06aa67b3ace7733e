//! # Shared Types Crate
//!
//! Records exchanged between the key recovery pipeline, its store and its
//! collaborators (ingestion, publication feed, compute function).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every persisted record shape is defined here.
//! - **Immutable Inputs**: `SignatureRecord`s are produced by ingestion and
//!   never mutated by the pipeline.
//! - **Unordered Pair Identity**: pair attempts are keyed by `PairKey`, which
//!   normalises the two signature ids so (a, b) and (b, a) collide.

pub mod dkim;
pub mod entities;
pub mod errors;

pub use dkim::*;
pub use entities::*;
pub use errors::*;
