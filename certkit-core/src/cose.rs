//! COSE Sign1 envelope parsing and signature verification.
//!
//! Only the single-signer `COSE_Sign1` shape used by health-certificate
//! tokens is supported, with ES256 (ECDSA P-256 / SHA-256) signatures.

use ciborium::Value;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};

use crate::error::CertError;
use crate::trust::KeyIdentifier;

const COSE_SIGN1_TAG: u64 = 18;
const HEADER_ALG: i128 = 1;
const HEADER_KID: i128 = 4;
const ALG_ES256: i128 = -7;

/// A parsed `COSE_Sign1` message.
///
/// The protected header is kept as its raw byte string so the exact signed
/// `Sig_structure` can be reconstructed for verification.
#[derive(Debug, Clone)]
pub struct CoseSign1 {
    protected: Vec<u8>,
    unprotected: Vec<(Value, Value)>,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

impl CoseSign1 {
    /// Parses a `COSE_Sign1` message from CBOR bytes.
    ///
    /// The outer tag 18 is accepted but not required; any other tag or a
    /// wrong array arity is a structural violation.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Decode`] when the bytes are not a well-formed
    /// single-signer COSE structure.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CertError> {
        let value: Value = ciborium::de::from_reader(data)
            .map_err(|_| CertError::decode("invalid cose structure"))?;
        let value = match value {
            Value::Tag(COSE_SIGN1_TAG, inner) => *inner,
            Value::Tag(_, _) => return Err(CertError::decode("not a cose-sign1 message")),
            other => other,
        };
        let Value::Array(items) = value else {
            return Err(CertError::decode("invalid cose structure"));
        };
        let items: [Value; 4] = items
            .try_into()
            .map_err(|_| CertError::decode("invalid cose structure"))?;
        let [protected, unprotected, payload, signature] = items;

        let (Value::Bytes(protected), Value::Map(unprotected)) = (protected, unprotected) else {
            return Err(CertError::decode("invalid cose structure"));
        };
        let (Value::Bytes(payload), Value::Bytes(signature)) = (payload, signature) else {
            return Err(CertError::decode("invalid cose structure"));
        };

        Ok(Self {
            protected,
            unprotected,
            payload,
            signature,
        })
    }

    /// The CBOR payload carried by the envelope (the CBOR Web Token).
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The signer key id, read from the protected header with an
    /// unprotected-header fallback.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Signature`] when neither header carries a key id
    /// and [`CertError::Decode`] when the protected header is malformed.
    pub fn key_identifier(&self) -> Result<KeyIdentifier, CertError> {
        let protected = self.protected_header()?;
        if let Some(Value::Bytes(kid)) = header_value(&protected, HEADER_KID) {
            return Ok(KeyIdentifier::from(kid.as_slice()));
        }
        if let Some(Value::Bytes(kid)) = header_value(&self.unprotected, HEADER_KID) {
            return Ok(KeyIdentifier::from(kid.as_slice()));
        }
        Err(CertError::signature("missing key identifier"))
    }

    /// The signature algorithm from the protected header, if present.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Decode`] when the protected header is malformed.
    pub fn algorithm(&self) -> Result<Option<i128>, CertError> {
        let protected = self.protected_header()?;
        Ok(match header_value(&protected, HEADER_ALG) {
            Some(Value::Integer(alg)) => Some(i128::from(*alg)),
            _ => None,
        })
    }

    /// Verifies the envelope signature over the reconstructed
    /// `Sig_structure` with the given public key.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Signature`] on an unsupported algorithm, a
    /// malformed signature encoding or a failed verification.
    pub fn verify_signature(&self, key: &VerifyingKey) -> Result<(), CertError> {
        if let Some(alg) = self.algorithm()? {
            if alg != ALG_ES256 {
                return Err(CertError::signature(format!(
                    "unsupported cose algorithm {alg}"
                )));
            }
        }
        let signature = Signature::from_slice(&self.signature)
            .map_err(|_| CertError::signature("malformed signature"))?;
        key.verify(&self.signed_payload()?, &signature)
            .map_err(|_| CertError::signature("invalid signature"))
    }

    fn protected_header(&self) -> Result<Vec<(Value, Value)>, CertError> {
        if self.protected.is_empty() {
            return Ok(Vec::new());
        }
        let value: Value = ciborium::de::from_reader(self.protected.as_slice())
            .map_err(|_| CertError::decode("invalid cose protected header"))?;
        match value {
            Value::Map(entries) => Ok(entries),
            _ => Err(CertError::decode("invalid cose protected header")),
        }
    }

    /// `Sig_structure` for a `Signature1` context with empty external data.
    fn signed_payload(&self) -> Result<Vec<u8>, CertError> {
        let structure = Value::Array(vec![
            Value::Text("Signature1".to_string()),
            Value::Bytes(self.protected.clone()),
            Value::Bytes(Vec::new()),
            Value::Bytes(self.payload.clone()),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&structure, &mut bytes)
            .map_err(|err| CertError::Serialization(err.to_string()))?;
        Ok(bytes)
    }
}

fn header_value(entries: &[(Value, Value)], label: i128) -> Option<&Value> {
    entries.iter().find_map(|(key, value)| match key {
        Value::Integer(i) if i128::from(*i) == label => Some(value),
        _ => None,
    })
}
