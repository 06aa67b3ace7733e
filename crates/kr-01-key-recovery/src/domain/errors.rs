//! # Key Recovery Errors
//!
//! Error types for the encoding, recovery and pipeline layers.
//!
//! Only `PipelineError` is allowed to leave a pair boundary; everything else
//! is recorded as a failed attempt and logged.

use shared_types::{DkimRecordError, DomainSelector, KeyPeriodId, SignatureId};
use thiserror::Error;

/// Errors from the digest encoder and the modulus recovery engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecoveryError {
    /// Target length cannot hold the padding plus DigestInfo.
    #[error("Encoding error: {target_len} bytes cannot hold an encoded block of at least {required_len} bytes")]
    Encoding {
        target_len: usize,
        required_len: usize,
    },

    /// The two signatures were produced with different key sizes.
    #[error("Signature size mismatch: {left} vs {right} bytes")]
    SizeMismatch { left: usize, right: usize },

    /// The signature is wider than any modulus this system accepts.
    #[error("Signature too large: {len} bytes exceeds {max_len} bytes")]
    SignatureTooLarge { len: usize, max_len: usize },

    /// The stored header hash is not valid hex.
    #[error("Invalid digest for signature {signature_id}: {reason}")]
    InvalidDigest {
        signature_id: SignatureId,
        reason: String,
    },

    /// The solver task could not be run to completion.
    #[error("Modulus solver unavailable: {0}")]
    SolverUnavailable(String),
}

/// Errors converting between stored key data and RSA key material.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyMaterialError {
    /// Key data is not valid base64
    #[error("Invalid base64 key data: {0}")]
    Base64(String),

    /// Neither SubjectPublicKeyInfo nor PKCS#1 DER
    #[error("Invalid DER public key: {0}")]
    Der(String),

    /// The DKIM record value could not be used
    #[error("Unusable DKIM record: {0}")]
    Record(#[from] DkimRecordError),

    /// Only RSA keys can be recovered or validated here
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Modulus/exponent rejected by the RSA encoder
    #[error("Invalid RSA parameters: {0}")]
    InvalidParameters(String),
}

/// Fatal errors that halt the whole batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// A signature timestamped inside a stored key period does not validate
    /// against that period's key.
    #[error("Consistency violation for {domain_selector}: signature {signature_id} lies inside key period {key_period_id} but does not validate")]
    ConsistencyViolation {
        domain_selector: DomainSelector,
        signature_id: SignatureId,
        key_period_id: KeyPeriodId,
    },
}
