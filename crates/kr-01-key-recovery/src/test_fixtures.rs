//! Deterministic 2048-bit RSA keys for unit tests.
//!
//! Signatures are produced as `encode(digest)^d mod n`, left-padded to the
//! key size, exactly as a DKIM signer would.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::Deserialize;
use shared_types::SignatureRecord;

use crate::domain::encoding::{encode_digest, left_pad};
use crate::domain::entities::HashAlgorithm;
use crate::domain::keys::RsaKeyMaterial;

const KEYS_JSON: &str = include_str!("../tests/fixtures/keys.json");

pub const DOMAIN: &str = "example.com";
pub const SELECTOR: &str = "s1";

pub const MESSAGES: [&[u8]; 3] = [
    b"from:alice@example.com\r\nsubject:first message\r\n",
    b"from:alice@example.com\r\nsubject:second message\r\n",
    b"from:alice@example.com\r\nsubject:third message\r\n",
];

#[derive(Deserialize)]
struct RawKey {
    modulus: String,
    exponent: u32,
    private_exponent: String,
    #[serde(default)]
    spki_der_base64: Option<String>,
}

pub struct FixtureKey {
    pub modulus: BigUint,
    pub exponent: u32,
    pub private_exponent: BigUint,
    pub spki_der_base64: Option<String>,
}

fn parse_hex(text: &str) -> BigUint {
    BigUint::parse_bytes(text.as_bytes(), 16).expect("fixture hex")
}

/// Load one of `e65537`, `e3`, `e17`.
pub fn fixture_key(name: &str) -> FixtureKey {
    let keys: HashMap<String, RawKey> = serde_json::from_str(KEYS_JSON).expect("fixture json");
    let raw = keys.get(name).expect("fixture key name");
    FixtureKey {
        modulus: parse_hex(&raw.modulus),
        exponent: raw.exponent,
        private_exponent: parse_hex(&raw.private_exponent),
        spki_der_base64: raw.spki_der_base64.clone(),
    }
}

impl FixtureKey {
    pub fn material(&self) -> RsaKeyMaterial {
        RsaKeyMaterial::new(self.modulus.clone(), BigUint::from(self.exponent))
    }

    pub fn size_bytes(&self) -> usize {
        self.material().size_bytes()
    }

    pub fn sign_digest(&self, digest: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
        let encoded = encode_digest(self.size_bytes(), digest, algorithm).expect("encode");
        let signature = encoded.modpow(&self.private_exponent, &self.modulus);
        left_pad(&signature, self.size_bytes()).expect("signature fits key size")
    }
}

/// Signature over `message` by `key`, hashed with `algorithm`.
pub fn signature_record(
    key: &FixtureKey,
    id: u64,
    message: &[u8],
    algorithm: HashAlgorithm,
    timestamp: Option<DateTime<Utc>>,
) -> SignatureRecord {
    let digest = algorithm.digest(message);
    SignatureRecord {
        id,
        domain: DOMAIN.to_string(),
        selector: SELECTOR.to_string(),
        header_hash: hex::encode(&digest),
        signature: key.sign_digest(&digest, algorithm),
        timestamp,
    }
}
