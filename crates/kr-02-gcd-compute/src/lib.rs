//! # GCD Compute Function (KR-02)
//!
//! Stateless HTTP endpoint that computes `gcd(s1^e - em1, s2^e - em2)` for
//! a caller and posts the result to the caller's callback URL. Used to move
//! full-width GCDs off the recovery pipeline's host.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): request validation, computation, payloads
//! - **Ports Layer** (`ports/`): `CallbackSender`
//! - **Service Layer** (`service.rs`): retrying delivery and the axum router
//! - **Adapters** (`adapters/`): reqwest callback sender

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export public API
pub use adapters::callback::HttpCallbackSender;
pub use config::ComputeConfig;
pub use domain::compute::GcdComputation;
pub use domain::errors::{ComputeError, RequestError};
pub use domain::request::{CallbackPayload, GcdRequest, GcdTask, Operands};
pub use ports::outbound::{CallbackError, CallbackSender};
pub use service::{router, GcdComputeService, RetryPolicy};
