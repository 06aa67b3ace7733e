//! # Compute Errors

use thiserror::Error;

/// Why a request was rejected before any computation (HTTP 400).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Missing JSON payload.")]
    MissingPayload,

    #[error("Missing one or more required parameters: s1, s2, em1, em2")]
    MissingParameters,

    #[error("Missing callbackUrl parameter.")]
    MissingCallbackUrl,

    #[error("Invalid input: one or more parameters are not valid integers. Error: {0}")]
    InvalidInteger(String),
}

/// Failure of an accepted computation (HTTP 500).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputeError {
    #[error("operand {name} has {bits} bits, limit is {max}")]
    OperandTooLarge {
        name: &'static str,
        bits: u64,
        max: u64,
    },

    #[error("computation aborted: {0}")]
    Aborted(String),
}
