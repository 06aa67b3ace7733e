//! # RSA Key Material
//!
//! Conversion between `(modulus, exponent)` and the stored `keyData`
//! (base64 DER SubjectPublicKeyInfo). PKCS#1 `RSAPublicKey` DER is accepted
//! on input, as published DKIM records use both.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use num_bigint::BigUint;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use shared_types::{DkimKeyRecord, KeyType};

use super::entities::RecoveredKey;
use super::errors::KeyMaterialError;

/// Largest modulus accepted when encoding or decoding DER.
pub const MAX_MODULUS_BITS: usize = 16384;

/// An RSA public key as plain integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKeyMaterial {
    pub modulus: BigUint,
    pub exponent: BigUint,
}

impl RsaKeyMaterial {
    pub fn new(modulus: BigUint, exponent: BigUint) -> Self {
        Self { modulus, exponent }
    }

    /// Key size in bytes, i.e. the length of every signature it makes.
    pub fn size_bytes(&self) -> usize {
        self.modulus.bits().div_ceil(8) as usize
    }

    /// `value^e mod n`.
    pub fn public_op(&self, value: &BigUint) -> BigUint {
        value.modpow(&self.exponent, &self.modulus)
    }

    /// Parse SubjectPublicKeyInfo DER, falling back to PKCS#1.
    pub fn from_der(der: &[u8]) -> Result<Self, KeyMaterialError> {
        let key = RsaPublicKey::from_public_key_der(der)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(der))
            .map_err(|e| KeyMaterialError::Der(e.to_string()))?;
        Ok(Self {
            modulus: BigUint::from_bytes_be(&key.n().to_bytes_be()),
            exponent: BigUint::from_bytes_be(&key.e().to_bytes_be()),
        })
    }

    /// Parse stored `keyData` (base64 DER, whitespace tolerated).
    pub fn from_key_data(key_data: &str) -> Result<Self, KeyMaterialError> {
        let compact: String = key_data.chars().filter(|c| !c.is_whitespace()).collect();
        let der = STANDARD
            .decode(compact)
            .map_err(|e| KeyMaterialError::Base64(e.to_string()))?;
        Self::from_der(&der)
    }

    /// Parse a DKIM TXT style value such as `v=DKIM1; k=rsa; p=MIIB...`.
    pub fn from_dkim_value(value: &str) -> Result<Self, KeyMaterialError> {
        let record = DkimKeyRecord::parse(value)?;
        if record.key_type != KeyType::Rsa {
            return Err(KeyMaterialError::UnsupportedKeyType(format!(
                "{:?}",
                record.key_type
            )));
        }
        Self::from_key_data(&record.key_data)
    }

    /// SubjectPublicKeyInfo DER.
    pub fn to_der(&self) -> Result<Vec<u8>, KeyMaterialError> {
        let key = RsaPublicKey::new_with_max_size(
            rsa::BigUint::from_bytes_be(&self.modulus.to_bytes_be()),
            rsa::BigUint::from_bytes_be(&self.exponent.to_bytes_be()),
            MAX_MODULUS_BITS,
        )
        .map_err(|e| KeyMaterialError::InvalidParameters(e.to_string()))?;
        let der = key
            .to_public_key_der()
            .map_err(|e| KeyMaterialError::Der(e.to_string()))?;
        Ok(der.as_bytes().to_vec())
    }

    /// Base64 SubjectPublicKeyInfo, the stored `keyData` form.
    pub fn to_key_data(&self) -> Result<String, KeyMaterialError> {
        self.to_der().map(|der| STANDARD.encode(der))
    }

    /// DKIM record value stored on created key periods.
    pub fn to_dkim_value(&self) -> Result<String, KeyMaterialError> {
        let record = DkimKeyRecord {
            key_type: KeyType::Rsa,
            key_data: self.to_key_data()?,
        };
        Ok(record.render())
    }
}

impl From<&RecoveredKey> for RsaKeyMaterial {
    fn from(key: &RecoveredKey) -> Self {
        Self::new(key.modulus.clone(), BigUint::from(key.exponent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::fixture_key;

    /// Test: stored key data decodes to the fixture modulus
    #[test]
    fn test_from_key_data_matches_fixture() {
        let fixture = fixture_key("e65537");
        let key = RsaKeyMaterial::from_key_data(fixture.spki_der_base64.as_deref().unwrap()).unwrap();

        assert_eq!(key.modulus, fixture.modulus);
        assert_eq!(key.exponent, BigUint::from(65537u32));
        assert_eq!(key.size_bytes(), 256);
    }

    /// Test: encoding reproduces the fixture DER exactly
    #[test]
    fn test_to_key_data_is_canonical_spki() {
        let fixture = fixture_key("e65537");
        let key = RsaKeyMaterial::new(fixture.modulus.clone(), BigUint::from(65537u32));

        assert_eq!(
            key.to_key_data().unwrap(),
            fixture.spki_der_base64.clone().unwrap()
        );
    }

    /// Test: small exponents survive a DER round trip
    #[test]
    fn test_small_exponent_round_trip() {
        let fixture = fixture_key("e3");
        let key = RsaKeyMaterial::new(fixture.modulus.clone(), BigUint::from(3u32));
        let decoded = RsaKeyMaterial::from_key_data(&key.to_key_data().unwrap()).unwrap();
        assert_eq!(decoded, key);
    }

    /// Test: PKCS#1 RSAPublicKey DER is accepted
    #[test]
    fn test_from_pkcs1_der() {
        use rsa::pkcs1::EncodeRsaPublicKey;

        let fixture = fixture_key("e17");
        let key = RsaPublicKey::new(
            rsa::BigUint::from_bytes_be(&fixture.modulus.to_bytes_be()),
            rsa::BigUint::from(17u32),
        )
        .unwrap();
        let der = key.to_pkcs1_der().unwrap();

        let decoded = RsaKeyMaterial::from_der(der.as_bytes()).unwrap();
        assert_eq!(decoded.modulus, fixture.modulus);
        assert_eq!(decoded.exponent, BigUint::from(17u32));
    }

    /// Test: DKIM record values render and parse back
    #[test]
    fn test_dkim_value_round_trip() {
        let fixture = fixture_key("e65537");
        let key = RsaKeyMaterial::new(fixture.modulus.clone(), BigUint::from(65537u32));
        let value = key.to_dkim_value().unwrap();

        assert!(value.starts_with("k=rsa; p=MIIB"));
        assert_eq!(RsaKeyMaterial::from_dkim_value(&value).unwrap(), key);
    }

    /// Test: malformed inputs map to typed errors
    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            RsaKeyMaterial::from_key_data("not base64!!"),
            Err(KeyMaterialError::Base64(_))
        ));
        assert!(matches!(
            RsaKeyMaterial::from_key_data("AAAAAAAAAAAA"),
            Err(KeyMaterialError::Der(_))
        ));
        assert!(matches!(
            RsaKeyMaterial::from_dkim_value("k=rsa; p="),
            Err(KeyMaterialError::Record(_))
        ));
        assert!(matches!(
            RsaKeyMaterial::from_dkim_value("k=ed25519; p=11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo="),
            Err(KeyMaterialError::UnsupportedKeyType(_))
        ));
    }
}
