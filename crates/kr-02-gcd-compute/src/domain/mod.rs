//! # Domain Layer
//!
//! Request validation, the GCD itself and the callback payload. No I/O.

pub mod compute;
pub mod errors;
pub mod request;
