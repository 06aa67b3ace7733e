//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use kr_01_key_recovery::{
    encode_digest, left_pad, HashAlgorithm, ModulusSolver, RecoveredKey, RecoveryError,
    RsaKeyMaterial,
};
use num_bigint::BigUint;
use serde::Deserialize;
use shared_types::SignatureRecord;

const KEYS_JSON: &str = include_str!("../fixtures/keys.json");

pub const MESSAGES: [&[u8]; 4] = [
    b"from:alice@example.com\r\nsubject:first message\r\n",
    b"from:alice@example.com\r\nsubject:second message\r\n",
    b"from:alice@example.com\r\nsubject:third message\r\n",
    b"from:bob@example.com\r\nsubject:fourth message\r\n",
];

#[derive(Deserialize)]
struct RawKey {
    modulus: String,
    exponent: u32,
    private_exponent: String,
    #[serde(default)]
    spki_der_base64: Option<String>,
}

pub struct TestKey {
    pub modulus: BigUint,
    pub exponent: u32,
    pub private_exponent: BigUint,
    pub spki_der_base64: Option<String>,
}

impl TestKey {
    pub fn load(name: &str) -> Self {
        let keys: HashMap<String, RawKey> = serde_json::from_str(KEYS_JSON).unwrap();
        let raw = &keys[name];
        Self {
            modulus: BigUint::parse_bytes(raw.modulus.as_bytes(), 16).unwrap(),
            exponent: raw.exponent,
            private_exponent: BigUint::parse_bytes(raw.private_exponent.as_bytes(), 16).unwrap(),
            spki_der_base64: raw.spki_der_base64.clone(),
        }
    }

    pub fn material(&self) -> RsaKeyMaterial {
        RsaKeyMaterial::new(self.modulus.clone(), BigUint::from(self.exponent))
    }

    pub fn key_data(&self) -> String {
        self.material().to_key_data().unwrap()
    }

    /// Sign `message` the way a DKIM signer does: encode, then `m^d mod n`.
    pub fn sign(
        &self,
        id: u64,
        (domain, selector): (&str, &str),
        message: &[u8],
        timestamp: Option<DateTime<Utc>>,
    ) -> SignatureRecord {
        let size = self.material().size_bytes();
        let digest = HashAlgorithm::Sha256.digest(message);
        let encoded = encode_digest(size, &digest, HashAlgorithm::Sha256).unwrap();
        let signature = encoded.modpow(&self.private_exponent, &self.modulus);
        SignatureRecord {
            id,
            domain: domain.to_string(),
            selector: selector.to_string(),
            header_hash: hex::encode(digest),
            signature: left_pad(&signature, size).unwrap(),
            timestamp,
        }
    }
}

pub fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 11, n, 9, 30, 0).unwrap()
}

/// Solver wrapper that counts calls per pair.
pub struct CountingSolver<S> {
    inner: S,
    pub calls: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl<S> CountingSolver<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait::async_trait]
impl<S: ModulusSolver> ModulusSolver for CountingSolver<S> {
    async fn solve(
        &self,
        a: SignatureRecord,
        b: SignatureRecord,
    ) -> Result<Option<RecoveredKey>, RecoveryError> {
        self.calls.lock().unwrap().push((a.id, b.id));
        self.inner.solve(a, b).await
    }
}
