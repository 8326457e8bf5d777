//! Trusted signer certificates and the key lookup used for signature
//! verification.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use p256::ecdsa::VerifyingKey;
use p256::pkcs8::DecodePublicKey;
use serde::{Deserialize, Serialize};

use crate::error::CertError;

/// Identifier of a trusted signer key, byte-exact.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyIdentifier(Vec<u8>);

impl KeyIdentifier {
    /// The raw key id bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for KeyIdentifier {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl From<Vec<u8>> for KeyIdentifier {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyIdentifier({})", hex::encode(&self.0))
    }
}

/// One trusted document signer certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedCert {
    /// Issuing country of the signer.
    pub country: String,
    /// Key id the signer is referenced by.
    pub kid: KeyIdentifier,
    /// DER-encoded `SubjectPublicKeyInfo` of the signer's P-256 key.
    pub raw_data: Vec<u8>,
}

impl TrustedCert {
    /// Parses the signer's verification key.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Signature`] when the key is not a valid P-256
    /// public key (other algorithms are not supported).
    pub fn public_key(&self) -> Result<VerifyingKey, CertError> {
        VerifyingKey::from_public_key_der(&self.raw_data)
            .map_err(|_| CertError::signature("unsupported signer key"))
    }
}

/// One entry of the distributed trust list document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DscEntry {
    /// Base64-encoded key id.
    pub kid: String,
    /// Issuing country.
    pub country: String,
    /// Base64-encoded DER `SubjectPublicKeyInfo`.
    #[serde(rename = "rawData")]
    pub raw_data: String,
}

/// The versioned trust list, replaced atomically as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DscList {
    /// The trusted signer entries.
    pub certificates: Vec<DscEntry>,
}

impl DscList {
    /// Decodes the base64 wire entries into [`TrustedCert`]s.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Decode`] on invalid base64 fields.
    pub fn to_trusted_certs(&self) -> Result<Vec<TrustedCert>, CertError> {
        self.certificates
            .iter()
            .map(|entry| {
                let kid = BASE64
                    .decode(&entry.kid)
                    .map_err(|_| CertError::decode("invalid trust list kid"))?;
                let raw_data = BASE64
                    .decode(&entry.raw_data)
                    .map_err(|_| CertError::decode("invalid trust list key data"))?;
                Ok(TrustedCert {
                    country: entry.country.clone(),
                    kid: KeyIdentifier::from(kid),
                    raw_data,
                })
            })
            .collect()
    }
}

/// Holds the current trusted signer keys, indexed by `(country, key id)`.
///
/// Lookups are exact; the store never falls back to another country's key.
/// Replacement swaps the whole indexed snapshot in one step, so readers
/// never observe a partially updated list.
pub struct TrustStore {
    entries: RwLock<HashMap<(String, KeyIdentifier), VerifyingKey>>,
}

impl TrustStore {
    /// Creates a store from an initial certificate list.
    ///
    /// # Errors
    ///
    /// See [`TrustStore::replace`].
    pub fn new(certs: &[TrustedCert]) -> Result<Self, CertError> {
        Ok(Self {
            entries: RwLock::new(Self::index(certs)?),
        })
    }

    /// Creates an empty store.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves the verification key for an exact `(country, key id)` pair.
    #[must_use]
    pub fn resolve(&self, country: &str, kid: &KeyIdentifier) -> Option<VerifyingKey> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&(country.to_string(), kid.clone()))
            .cloned()
    }

    /// Replaces the whole store contents atomically.
    ///
    /// Only called with lists whose own signature has already been verified
    /// against the pinned trust anchor.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::AmbiguousTrustEntry`] when two entries collide on
    /// `(country, key id)` and [`CertError::Signature`] on unparseable keys.
    /// The previous contents are retained on any error.
    pub fn replace(&self, certs: &[TrustedCert]) -> Result<(), CertError> {
        let index = Self::index(certs)?;
        *self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner) = index;
        Ok(())
    }

    /// Number of trusted keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(
        certs: &[TrustedCert],
    ) -> Result<HashMap<(String, KeyIdentifier), VerifyingKey>, CertError> {
        let mut index = HashMap::with_capacity(certs.len());
        for cert in certs {
            let key = cert.public_key()?;
            let previous = index.insert((cert.country.clone(), cert.kid.clone()), key);
            if previous.is_some() {
                return Err(CertError::AmbiguousTrustEntry {
                    country: cert.country.clone(),
                    kid: cert.kid.to_string(),
                });
            }
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    use super::*;
    use crate::testing::trusted_cert;

    #[test]
    fn test_resolve_is_exact() {
        let key = SigningKey::random(&mut OsRng);
        let kid = KeyIdentifier::from(&[1u8, 2, 3, 4][..]);
        let store =
            TrustStore::new(&[trusted_cert("DE", kid.as_bytes(), &key)]).expect("store");

        assert!(store.resolve("DE", &kid).is_some());
        // Same kid, different country: no fallback.
        assert!(store.resolve("FR", &kid).is_none());
        // Same country, different kid.
        assert!(store
            .resolve("DE", &KeyIdentifier::from(&[9u8; 4][..]))
            .is_none());
    }

    #[test]
    fn test_replace_swaps_whole_snapshot() {
        let old_key = SigningKey::random(&mut OsRng);
        let new_key = SigningKey::random(&mut OsRng);
        let store =
            TrustStore::new(&[trusted_cert("DE", &[1], &old_key)]).expect("store");

        store
            .replace(&[trusted_cert("FR", &[2], &new_key)])
            .expect("replace");
        assert!(store
            .resolve("DE", &KeyIdentifier::from(&[1u8][..]))
            .is_none());
        assert!(store
            .resolve("FR", &KeyIdentifier::from(&[2u8][..]))
            .is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_pair_is_rejected_and_keeps_previous_state() {
        let key = SigningKey::random(&mut OsRng);
        let store = TrustStore::new(&[trusted_cert("DE", &[1], &key)]).expect("store");

        let result = store.replace(&[
            trusted_cert("DE", &[7], &key),
            trusted_cert("DE", &[7], &key),
        ]);
        assert!(matches!(
            result,
            Err(CertError::AmbiguousTrustEntry { .. })
        ));
        // Prior snapshot intact.
        assert!(store
            .resolve("DE", &KeyIdentifier::from(&[1u8][..]))
            .is_some());
    }

    #[test]
    fn test_dsc_list_wire_decoding() {
        let key = SigningKey::random(&mut OsRng);
        let cert = trusted_cert("DE", &[0xab, 0xcd], &key);
        let list = DscList {
            certificates: vec![DscEntry {
                kid: BASE64.encode(cert.kid.as_bytes()),
                country: "DE".to_string(),
                raw_data: BASE64.encode(&cert.raw_data),
            }],
        };
        assert_eq!(list.to_trusted_certs().expect("decode"), vec![cert]);

        let broken = DscList {
            certificates: vec![DscEntry {
                kid: "!!".to_string(),
                country: "DE".to_string(),
                raw_data: String::new(),
            }],
        };
        assert!(broken.to_trusted_certs().is_err());
    }
}
