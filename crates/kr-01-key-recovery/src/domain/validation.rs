//! # Key Validator
//!
//! Checks a key against one stored signature. Two independent checks, either
//! sufficient:
//!
//! 1. **Library check**: `rsa`'s PKCS#1 v1.5 verifier over the raw header
//!    hash bytes.
//! 2. **Canonical check**: re-encode the digest with the local encoder at the
//!    signature's byte length and compare with `s^e mod n`.
//!
//! Both checks need the digest inside an EMSA-PKCS1-v1.5 block. A signature
//! whose `s^e mod n` is the bare digest integer validates under neither.
//!
//! Validation failure is a normal outcome; nothing here returns an error.

use num_bigint::BigUint;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Sha256, Sha512};
use shared_types::SignatureRecord;
use tracing::debug;

use super::encoding::encode_digest;
use super::entities::HashAlgorithm;
use super::keys::{RsaKeyMaterial, MAX_MODULUS_BITS};

/// Validate `signature` against stored base64 DER key data.
///
/// Unparseable key data fails validation.
pub fn validate_key_data(key_data: &str, signature: &SignatureRecord) -> bool {
    match RsaKeyMaterial::from_key_data(key_data) {
        Ok(key) => validate(&key, signature),
        Err(e) => {
            debug!(signature_id = signature.id, error = %e, "Key data not usable for validation");
            false
        }
    }
}

/// Validate `signature` against `key`.
pub fn validate(key: &RsaKeyMaterial, signature: &SignatureRecord) -> bool {
    let Ok(digest) = signature.digest() else {
        debug!(signature_id = signature.id, "Header hash is not hex");
        return false;
    };

    if verify_with_library(key, &signature.signature, &digest) {
        debug!(signature_id = signature.id, "Signature validated with raw hash bytes");
        return true;
    }
    if verify_canonical(key, &signature.signature, &digest) {
        debug!(signature_id = signature.id, "Signature validated with local padding");
        return true;
    }
    false
}

fn verify_with_library(key: &RsaKeyMaterial, signature: &[u8], digest: &[u8]) -> bool {
    let Ok(public_key) = RsaPublicKey::new_with_max_size(
        rsa::BigUint::from_bytes_be(&key.modulus.to_bytes_be()),
        rsa::BigUint::from_bytes_be(&key.exponent.to_bytes_be()),
        MAX_MODULUS_BITS,
    ) else {
        return false;
    };

    let scheme = match HashAlgorithm::from_digest_len(digest.len()) {
        Some(HashAlgorithm::Sha512) => Pkcs1v15Sign::new::<Sha512>(),
        _ => Pkcs1v15Sign::new::<Sha256>(),
    };
    public_key.verify(scheme, digest, signature).is_ok()
}

/// Compare `s^e mod n` with the local encoding of `digest`.
///
/// The algorithm is picked from the digest length (SHA-256 when unknown).
pub fn verify_canonical(key: &RsaKeyMaterial, signature: &[u8], digest: &[u8]) -> bool {
    if key.modulus <= BigUint::from(1u32) || signature.len() != key.size_bytes() {
        return false;
    }
    let algorithm = HashAlgorithm::from_digest_len(digest.len()).unwrap_or(HashAlgorithm::Sha256);
    let Ok(expected) = encode_digest(signature.len(), digest, algorithm) else {
        return false;
    };

    let s = BigUint::from_bytes_be(signature);
    if s >= key.modulus {
        return false;
    }
    key.public_op(&s) == expected
}
