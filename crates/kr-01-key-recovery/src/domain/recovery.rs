//! # Modulus Recovery Engine
//!
//! Common-GCD attack on PKCS#1 v1.5 signatures. For two signatures made with
//! the same key, `s^e - m` is a multiple of `n` for both, so
//!
//! ```text
//! gcd(s1^e - m1, s2^e - m2) = k * n
//! ```
//!
//! where `k` is usually a product of small primes. The hash algorithm and
//! exponent are unknown and found by trial, in `SearchConfig` order.

use std::time::Instant;

use malachite::num::arithmetic::traits::{Gcd, Pow, UnsignedAbs};
use malachite::num::conversion::traits::PowerOf2Digits;
use malachite::{Integer, Natural};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};
use shared_types::SignatureRecord;
use tracing::{debug, info};

use super::encoding::encode_digest;
use super::entities::{HashAlgorithm, RecoveredKey, SearchConfig};
use super::errors::RecoveryError;
use super::keys::MAX_MODULUS_BITS;

/// Divide out each prime in `primes` while it divides `candidate` and
/// `candidate` is still larger than it.
///
/// A candidate equal to one of the primes is left as is.
pub fn strip_small_primes(mut candidate: BigUint, primes: &[u32]) -> BigUint {
    for &prime in primes {
        let prime = BigUint::from(prime);
        while candidate > prime && (&candidate % &prime).is_zero() {
            candidate /= &prime;
        }
    }
    candidate
}

/// `gcd(s1^e - m1, s2^e - m2)` with small primes stripped.
///
/// The terms are computed without modular reduction and may be negative.
pub fn modulus_candidate(
    first: (&BigUint, &BigUint),
    second: (&BigUint, &BigUint),
    exponent: u32,
    small_primes: &[u32],
) -> BigUint {
    let term = |(s, m): (&BigUint, &BigUint)| {
        Integer::from(to_natural(s).pow(u64::from(exponent))) - Integer::from(to_natural(m))
    };
    strip_small_primes(gcd_of_terms(term(first), term(second)), small_primes)
}

/// `|gcd(s1^e - m1, s2^e - m2)|` for signed operands, without cleanup.
///
/// The terms are exponentiated and reduced in `malachite`, whose GCD is
/// subquadratic: at e = 65537 a 2048-bit operand yields a ~134 Mbit term.
pub fn power_difference_gcd(
    first: (&BigInt, &BigInt),
    second: (&BigInt, &BigInt),
    exponent: u32,
) -> BigUint {
    let term =
        |(s, m): (&BigInt, &BigInt)| to_integer(s).pow(u64::from(exponent)) - to_integer(m);
    gcd_of_terms(term(first), term(second))
}

fn gcd_of_terms(a: Integer, b: Integer) -> BigUint {
    to_biguint(&a.unsigned_abs().gcd(b.unsigned_abs()))
}

fn to_natural(value: &BigUint) -> Natural {
    // base 2^8 digits from bytes always convert
    let digits = value.to_bytes_le().into_iter();
    <Natural as PowerOf2Digits<u8>>::from_power_of_2_digits_asc(8, digits).unwrap_or_default()
}

fn to_integer(value: &BigInt) -> Integer {
    Integer::from_sign_and_abs(value.sign() != Sign::Minus, to_natural(value.magnitude()))
}

fn to_biguint(value: &Natural) -> BigUint {
    let digits: Vec<u8> = PowerOf2Digits::<u8>::to_power_of_2_digits_asc(value, 8);
    BigUint::from_bytes_le(&digits)
}

/// Whether `candidate` is a plausible modulus for a signature of `len` bytes
/// with `signature^exponent mod candidate == encoded`.
fn verifies(
    candidate: &BigUint,
    exponent: u32,
    len: usize,
    signature: &BigUint,
    encoded: &BigUint,
) -> bool {
    candidate.bits().div_ceil(8) as usize == len
        && signature < candidate
        && encoded < candidate
        && signature.modpow(&BigUint::from(exponent), candidate) == *encoded
}

struct PreparedSignature {
    value: BigUint,
    digest: Vec<u8>,
}

impl PreparedSignature {
    fn from_record(record: &SignatureRecord) -> Result<Self, RecoveryError> {
        let digest = record
            .digest()
            .map_err(|e| RecoveryError::InvalidDigest {
                signature_id: record.id,
                reason: e.to_string(),
            })?;
        Ok(Self {
            value: BigUint::from_bytes_be(&record.signature),
            digest,
        })
    }
}

/// Runs the hash/exponent search over one signature pair.
#[derive(Debug, Clone, Default)]
pub struct ModulusRecovery {
    config: SearchConfig,
}

impl ModulusRecovery {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Try every hash algorithm (outer) and exponent (inner) until a
    /// candidate above 1 is accepted.
    ///
    /// # Errors
    /// * `RecoveryError::SizeMismatch` - signature lengths differ
    /// * `RecoveryError::SignatureTooLarge` - signatures wider than
    ///   `MAX_MODULUS_BITS`, refused before any exponentiation
    /// * `RecoveryError::InvalidDigest` - a header hash is not hex
    /// * `RecoveryError::Encoding` - the signature is too short to hold an
    ///   encoded digest
    pub fn recover(
        &self,
        a: &SignatureRecord,
        b: &SignatureRecord,
    ) -> Result<Option<RecoveredKey>, RecoveryError> {
        let len = a.signature_len();
        if len != b.signature_len() {
            return Err(RecoveryError::SizeMismatch {
                left: len,
                right: b.signature_len(),
            });
        }
        let max_len = MAX_MODULUS_BITS / 8;
        if len > max_len {
            return Err(RecoveryError::SignatureTooLarge { len, max_len });
        }
        let first = PreparedSignature::from_record(a)?;
        let second = PreparedSignature::from_record(b)?;

        for &hash_algorithm in &self.config.hash_algorithms {
            let m1 = encode_digest(len, &first.digest, hash_algorithm)?;
            let m2 = encode_digest(len, &second.digest, hash_algorithm)?;

            for &exponent in &self.config.exponents {
                debug!(
                    signature_a = a.id,
                    signature_b = b.id,
                    hash = hash_algorithm.name(),
                    exponent,
                    "Solving for modulus"
                );
                let started = Instant::now();
                let candidate = modulus_candidate(
                    (&first.value, &m1),
                    (&second.value, &m2),
                    exponent,
                    &self.config.small_primes,
                );
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "GCD done");

                if candidate <= BigUint::one() {
                    continue;
                }
                if self.config.verify_candidates
                    && !(verifies(&candidate, exponent, len, &first.value, &m1)
                        && verifies(&candidate, exponent, len, &second.value, &m2))
                {
                    debug!(
                        bits = candidate.bits(),
                        exponent,
                        hash = hash_algorithm.name(),
                        "Candidate rejected"
                    );
                    continue;
                }

                info!(
                    signature_a = a.id,
                    signature_b = b.id,
                    bits = candidate.bits(),
                    exponent,
                    hash = hash_algorithm.name(),
                    "Found modulus candidate"
                );
                return Ok(Some(RecoveredKey {
                    modulus: candidate,
                    exponent,
                    hash_algorithm,
                }));
            }
        }

        Ok(None)
    }
}

/// Hash algorithm implied by a header hash, for logging and validation.
pub fn implied_algorithm(record: &SignatureRecord) -> Option<HashAlgorithm> {
    record
        .digest()
        .ok()
        .and_then(|digest| HashAlgorithm::from_digest_len(digest.len()))
}
