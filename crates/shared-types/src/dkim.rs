//! # DKIM Tag Lists
//!
//! Relaxed reader for the RFC 6376 section 3.2 tag=value list used by both
//! DKIM-Signature headers and `_domainkey` TXT records.
//!
//! - Parts without `=` or with an empty tag name are skipped.
//! - Duplicate tags: the last occurrence wins.

use std::collections::HashMap;

use crate::entities::KeyType;
use crate::errors::DkimRecordError;

/// Shortest `p=` value treated as a usable key.
///
/// Shorter values (including the empty revocation marker) are rejected.
/// This is a policy threshold, not a property of any key encoding.
pub const MIN_USABLE_KEY_DATA_LEN: usize = 10;

/// Parsed tag=value list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList {
    tags: HashMap<String, String>,
}

impl TagList {
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Parse a tag=value list.
pub fn parse_tag_list(text: &str) -> TagList {
    let mut tags = HashMap::new();
    for part in text.split(';') {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        tags.insert(name.to_string(), value.trim().to_string());
    }
    TagList { tags }
}

/// Map a `k=` tag to a key type. An absent tag means RSA.
pub fn key_type_from_tag(tag: Option<&str>) -> Result<KeyType, DkimRecordError> {
    match tag.map(str::to_ascii_lowercase).as_deref() {
        None | Some("rsa") => Ok(KeyType::Rsa),
        Some("ed25519") => Ok(KeyType::Ed25519),
        Some(other) => Err(DkimRecordError::UnknownKeyType(other.to_string())),
    }
}

/// Key-bearing part of a `_domainkey` TXT record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DkimKeyRecord {
    pub key_type: KeyType,
    /// Base64 key data from `p=`, whitespace removed.
    pub key_data: String,
}

impl DkimKeyRecord {
    /// Read `k=` and `p=` from a record value such as `v=DKIM1; k=rsa; p=MIIB...`.
    pub fn parse(value: &str) -> Result<Self, DkimRecordError> {
        let tags = parse_tag_list(value);
        let key_type = key_type_from_tag(tags.get("k"))?;
        let raw = tags.get("p").ok_or(DkimRecordError::MissingKeyData)?;
        let key_data: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if key_data.len() < MIN_USABLE_KEY_DATA_LEN {
            return Err(DkimRecordError::UnusableKey {
                len: key_data.len(),
            });
        }
        Ok(Self { key_type, key_data })
    }

    /// Render the record value stored alongside recovered keys.
    pub fn render(&self) -> String {
        let k = match self.key_type {
            KeyType::Rsa => "rsa",
            KeyType::Ed25519 => "ed25519",
        };
        format!("k={}; p={}", k, self.key_data)
    }
}
