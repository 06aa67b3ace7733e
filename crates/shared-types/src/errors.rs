//! # Error Types
//!
//! Errors raised while interpreting DKIM key record text.

use thiserror::Error;

/// Errors that can occur while reading a DKIM key record (`k=rsa; p=...`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DkimRecordError {
    /// The `k=` tag names a key type this system does not know.
    #[error("Unknown key type: {0:?}")]
    UnknownKeyType(String),

    /// The record has no `p=` tag.
    #[error("Missing p= tag")]
    MissingKeyData,

    /// The `p=` value is too short to be a real key (empty means revoked).
    #[error("Unusable key data: p= has {len} characters")]
    UnusableKey { len: usize },
}
