//! # Digest Encoder
//!
//! EMSA-PKCS1-v1_5 encoding (RFC 8017 section 9.2):
//!
//! ```text
//! 00 01 FF .. FF 00 || DigestInfo
//! DigestInfo = SEQUENCE { SEQUENCE { OID, NULL }, OCTET STRING digest }
//! ```
//!
//! The FF run is sized so the block is exactly `k` bytes. Deterministic
//! output is what lets two signatures share the unknown quotient the GCD
//! attack cancels out.

use num_bigint::BigUint;

use super::entities::HashAlgorithm;
use super::errors::RecoveryError;

/// Bytes of fixed overhead around DigestInfo: `00 01`, eight `FF`, `00`.
const MIN_PADDING_OVERHEAD: usize = 11;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_OID: u8 = 0x06;
const TAG_NULL: u8 = 0x05;
const TAG_OCTET_STRING: u8 = 0x04;

fn der_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes: Vec<u8> = len
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|b| *b == 0)
        .collect();
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(0x80 | bytes.len() as u8);
    out.extend(bytes);
    out
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(der_length(content.len()));
    out.extend_from_slice(content);
    out
}

/// DER `DigestInfo` for `digest` under `algorithm`'s OID.
///
/// The digest length is taken as given; it is not checked against the
/// algorithm.
pub fn digest_info(algorithm: HashAlgorithm, digest: &[u8]) -> Vec<u8> {
    let mut algorithm_id = der_tlv(TAG_OID, algorithm.oid());
    algorithm_id.extend(der_tlv(TAG_NULL, &[]));
    let mut body = der_tlv(TAG_SEQUENCE, &algorithm_id);
    body.extend(der_tlv(TAG_OCTET_STRING, digest));
    der_tlv(TAG_SEQUENCE, &body)
}

/// Encode `digest` into a `target_len` byte block.
///
/// # Errors
/// * `RecoveryError::Encoding` - `target_len` is shorter than DigestInfo
///   plus 11 bytes
pub fn encode_block(
    target_len: usize,
    digest: &[u8],
    algorithm: HashAlgorithm,
) -> Result<Vec<u8>, RecoveryError> {
    let info = digest_info(algorithm, digest);
    let required_len = info.len() + MIN_PADDING_OVERHEAD;
    if target_len < required_len {
        return Err(RecoveryError::Encoding {
            target_len,
            required_len,
        });
    }

    let mut block = Vec::with_capacity(target_len);
    block.extend_from_slice(&[0x00, 0x01]);
    block.resize(target_len - info.len() - 1, 0xff);
    block.push(0x00);
    block.extend(info);
    Ok(block)
}

/// Encoded block as the integer an RSA signer exponentiates.
pub fn encode_digest(
    target_len: usize,
    digest: &[u8],
    algorithm: HashAlgorithm,
) -> Result<BigUint, RecoveryError> {
    encode_block(target_len, digest, algorithm).map(|block| BigUint::from_bytes_be(&block))
}

/// Big-endian bytes of `value` left-padded to exactly `len` bytes.
///
/// Returns `None` when the value needs more than `len` bytes.
pub fn left_pad(value: &BigUint, len: usize) -> Option<Vec<u8>> {
    let bytes = value.to_bytes_be();
    if bytes == [0] {
        return Some(vec![0; len]);
    }
    if bytes.len() > len {
        return None;
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend(bytes);
    Some(out)
}

/// Fields read back out of an encoded block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    /// OID content bytes.
    pub oid: Vec<u8>,
    pub digest: Vec<u8>,
}

impl DecodedBlock {
    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        HashAlgorithm::from_oid(&self.oid)
    }
}

fn read_tlv(input: &[u8], tag: u8) -> Option<(&[u8], &[u8])> {
    let (&first, rest) = input.split_first()?;
    if first != tag {
        return None;
    }
    let (&len_byte, mut rest) = rest.split_first()?;
    let len = if len_byte < 0x80 {
        len_byte as usize
    } else {
        let count = (len_byte & 0x7f) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() || rest.len() < count {
            return None;
        }
        let (len_bytes, tail) = rest.split_at(count);
        rest = tail;
        len_bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize)
    };
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}

/// Parse an EMSA-PKCS1-v1_5 block. Returns `None` on any structural error.
pub fn decode_block(block: &[u8]) -> Option<DecodedBlock> {
    let rest = block.strip_prefix(&[0x00, 0x01])?;
    let padding = rest.iter().take_while(|b| **b == 0xff).count();
    if padding < MIN_PADDING_OVERHEAD - 3 {
        return None;
    }
    let rest = rest[padding..].strip_prefix(&[0x00])?;

    let (info, trailing) = read_tlv(rest, TAG_SEQUENCE)?;
    if !trailing.is_empty() {
        return None;
    }
    let (algorithm_id, info_rest) = read_tlv(info, TAG_SEQUENCE)?;
    let (oid, params) = read_tlv(algorithm_id, TAG_OID)?;
    let (null, _) = read_tlv(params, TAG_NULL)?;
    if !null.is_empty() {
        return None;
    }
    let (digest, tail) = read_tlv(info_rest, TAG_OCTET_STRING)?;
    if !tail.is_empty() {
        return None;
    }

    Some(DecodedBlock {
        oid: oid.to_vec(),
        digest: digest.to_vec(),
    })
}
