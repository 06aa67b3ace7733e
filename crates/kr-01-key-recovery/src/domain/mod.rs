//! # Domain Layer
//!
//! Pure key recovery logic with no I/O dependencies.
//! This is the inner layer of the hexagonal architecture.

pub mod encoding;
pub mod entities;
pub mod errors;
pub mod keys;
pub mod reconcile;
pub mod recovery;
pub mod validation;
