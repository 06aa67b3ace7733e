//! # Adapters Layer

pub mod callback;
