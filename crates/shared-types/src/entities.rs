//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Ingested**: `SignatureRecord` (one DKIM signature over one header hash)
//! - **Identity**: `DomainSelector`, `DomainSelectorPair`
//! - **Keys**: `KeyPeriodRecord`, `NewKeyPeriod`, `KeyType`
//! - **Commit log**: `PairKey`, `PairAttemptResult`

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store identifier of a `SignatureRecord`.
pub type SignatureId = u64;

/// Store identifier of a `DomainSelectorPair`.
pub type PairId = u64;

/// Store identifier of a `KeyPeriodRecord`.
pub type KeyPeriodId = u64;

// =============================================================================
// CLUSTER A: SIGNING IDENTITY
// =============================================================================

/// A DKIM signing identity: the DNS name `<selector>._domainkey.<domain>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainSelector {
    pub domain: String,
    pub selector: String,
}

impl DomainSelector {
    pub fn new(domain: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            selector: selector.into(),
        }
    }

    /// DNS name the key would be published under.
    pub fn dns_name(&self) -> String {
        format!("{}._domainkey.{}", self.selector, self.domain)
    }
}

impl fmt::Display for DomainSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.selector)
    }
}

/// A persisted signing identity, created lazily on first successful recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSelectorPair {
    pub id: PairId,
    pub domain: String,
    pub selector: String,
    /// Who created the row (e.g. `public_key_gcd_batch`).
    pub source_identifier: String,
}

impl DomainSelectorPair {
    pub fn domain_selector(&self) -> DomainSelector {
        DomainSelector::new(&self.domain, &self.selector)
    }
}

// =============================================================================
// CLUSTER B: INGESTED SIGNATURES
// =============================================================================

/// One historical DKIM signature.
///
/// `header_hash` is the hex digest of the canonicalized signed header block,
/// `signature` the raw RSA signature (its length is the key size in bytes).
/// A missing timestamp sorts after every dated signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    pub id: SignatureId,
    pub domain: String,
    pub selector: String,
    pub header_hash: String,
    #[serde(rename = "dkimSignature", with = "base64_bytes")]
    pub signature: Vec<u8>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SignatureRecord {
    pub fn domain_selector(&self) -> DomainSelector {
        DomainSelector::new(&self.domain, &self.selector)
    }

    /// Decode the hex header hash into digest bytes.
    pub fn digest(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(self.header_hash.trim())
    }

    /// Signature size in bytes, i.e. the byte length the signer padded to.
    pub fn signature_len(&self) -> usize {
        self.signature.len()
    }
}

// =============================================================================
// CLUSTER C: KEY VALIDITY PERIODS
// =============================================================================

/// Public key algorithm of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "Ed25519")]
    Ed25519,
}

/// A contiguous time window during which `key_data` was the key in effect
/// for one domain/selector pair. `first_seen_at <= last_seen_at` always.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPeriodRecord {
    pub id: KeyPeriodId,
    pub domain_selector_pair_id: PairId,
    /// DKIM TXT style record value (`k=rsa; p=...`).
    pub value: String,
    pub key_type: KeyType,
    /// Base64 DER SubjectPublicKeyInfo.
    pub key_data: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub source: String,
}

impl KeyPeriodRecord {
    /// Whether `at` lies inside `[first_seen_at, last_seen_at]`.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.first_seen_at <= at && at <= self.last_seen_at
    }
}

/// Insert form of a `KeyPeriodRecord`; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewKeyPeriod {
    pub domain_selector_pair_id: PairId,
    pub value: String,
    pub key_type: KeyType,
    pub key_data: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub source: String,
}

impl NewKeyPeriod {
    pub fn into_record(self, id: KeyPeriodId) -> KeyPeriodRecord {
        KeyPeriodRecord {
            id,
            domain_selector_pair_id: self.domain_selector_pair_id,
            value: self.value,
            key_type: self.key_type,
            key_data: self.key_data,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
            source: self.source,
        }
    }
}

// =============================================================================
// CLUSTER D: PAIR ATTEMPT COMMIT LOG
// =============================================================================

/// Unordered pair of signature ids. `PairKey::new(a, b) == PairKey::new(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    low: SignatureId,
    high: SignatureId,
}

impl PairKey {
    pub fn new(a: SignatureId, b: SignatureId) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    pub fn low(&self) -> SignatureId {
        self.low
    }

    pub fn high(&self) -> SignatureId {
        self.high
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.low, self.high)
    }
}

/// Outcome of one GCD attempt over a signature pair. Written once, never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairAttemptResult {
    #[serde(rename = "emailSignatureA_id")]
    pub signature_a_id: SignatureId,
    #[serde(rename = "emailSignatureB_id")]
    pub signature_b_id: SignatureId,
    pub found_gcd: bool,
    #[serde(rename = "dkimRecordId")]
    pub key_period_id: Option<KeyPeriodId>,
    pub timestamp: DateTime<Utc>,
}

impl PairAttemptResult {
    pub fn found(a: SignatureId, b: SignatureId, key_period_id: KeyPeriodId) -> Self {
        Self {
            signature_a_id: a,
            signature_b_id: b,
            found_gcd: true,
            key_period_id: Some(key_period_id),
            timestamp: Utc::now(),
        }
    }

    pub fn not_found(a: SignatureId, b: SignatureId) -> Self {
        Self {
            signature_a_id: a,
            signature_b_id: b,
            found_gcd: false,
            key_period_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(self.signature_a_id, self.signature_b_id)
    }
}

/// Serde helper storing raw bytes as standard base64 text.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.trim())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pair_key_is_unordered() {
        assert_eq!(PairKey::new(7, 3), PairKey::new(3, 7));
        assert_eq!(PairKey::new(7, 3).low(), 3);
        assert_eq!(PairKey::new(7, 3).high(), 7);
    }

    #[test]
    fn test_signature_record_json_shape() {
        let json = r#"{
            "id": 4,
            "domain": "example.com",
            "selector": "s1",
            "headerHash": "00ff",
            "dkimSignature": "AQID",
            "timestamp": "2024-01-02T03:04:05Z"
        }"#;
        let record: SignatureRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.signature, vec![1, 2, 3]);
        assert_eq!(record.digest().unwrap(), vec![0x00, 0xff]);
        assert_eq!(
            record.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(record.domain_selector().to_string(), "example.com:s1");
    }

    #[test]
    fn test_signature_record_timestamp_optional() {
        let json = r#"{"id":1,"domain":"d","selector":"s","headerHash":"","dkimSignature":""}"#;
        let record: SignatureRecord = serde_json::from_str(json).unwrap();
        assert!(record.timestamp.is_none());
    }

    #[test]
    fn test_key_period_covers_is_inclusive() {
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let record = NewKeyPeriod {
            domain_selector_pair_id: 1,
            value: "k=rsa; p=AAAA".into(),
            key_type: KeyType::Rsa,
            key_data: "AAAA".into(),
            first_seen_at: first,
            last_seen_at: last,
            source: "test".into(),
        }
        .into_record(9);

        assert!(record.covers(first));
        assert!(record.covers(last));
        assert!(!record.covers(last + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_dns_name() {
        let dsp = DomainSelector::new("example.com", "20230601");
        assert_eq!(dsp.dns_name(), "20230601._domainkey.example.com");
    }
}
