//! CBOR Web Token claim decoding.

use chrono::{DateTime, Utc};
use ciborium::Value;
use serde::de::DeserializeOwned;

use crate::error::CertError;

const CLAIM_ISSUER: i128 = 1;
const CLAIM_EXPIRATION: i128 = 4;
const CLAIM_ISSUED_AT: i128 = 6;
const CLAIM_HCERT: i128 = -260;
const HCERT_DGC: i128 = 1;

/// The claims of the CBOR Web Token wrapped by the COSE envelope.
#[derive(Debug, Clone)]
pub struct CborWebToken {
    /// Issuer claim (1), the issuing country code.
    pub issuer: String,
    /// Issued-at claim (6). Decoded when present, never enforced.
    pub issued_at: Option<DateTime<Utc>>,
    /// Expiration claim (4).
    pub expires_at: DateTime<Utc>,
    health_certificate: Value,
}

impl CborWebToken {
    /// Decodes the CWT claims from the COSE payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Decode`] when the payload is not a CBOR map or
    /// a required claim (issuer, expiration, health certificate) is missing
    /// or of the wrong type.
    pub fn decode(payload: &[u8]) -> Result<Self, CertError> {
        let value: Value = ciborium::de::from_reader(payload)
            .map_err(|_| CertError::decode("invalid cwt payload"))?;
        let Value::Map(claims) = value else {
            return Err(CertError::decode("invalid cwt payload"));
        };

        let issuer = match claim(&claims, CLAIM_ISSUER) {
            Some(Value::Text(issuer)) => issuer.clone(),
            _ => return Err(CertError::decode("missing cwt issuer claim")),
        };
        let expires_at = timestamp_claim(&claims, CLAIM_EXPIRATION)?
            .ok_or_else(|| CertError::decode("missing cwt expiration claim"))?;
        let issued_at = timestamp_claim(&claims, CLAIM_ISSUED_AT)?;

        let health_certificate = match claim(&claims, CLAIM_HCERT) {
            Some(Value::Map(container)) => match claim(container, HCERT_DGC) {
                Some(dgc @ Value::Map(_)) => dgc.clone(),
                _ => return Err(CertError::decode("missing health certificate claim")),
            },
            _ => return Err(CertError::decode("missing health certificate claim")),
        };

        Ok(Self {
            issuer,
            issued_at,
            expires_at,
            health_certificate,
        })
    }

    /// Deserializes the embedded health-certificate claim into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Decode`] when the claim does not match `T`.
    pub fn health_certificate<T: DeserializeOwned>(&self) -> Result<T, CertError> {
        self.health_certificate
            .deserialized()
            .map_err(|err| CertError::decode(format!("invalid health certificate: {err}")))
    }
}

fn claim<'a>(claims: &'a [(Value, Value)], key: i128) -> Option<&'a Value> {
    claims.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if i128::from(*i) == key => Some(v),
        _ => None,
    })
}

fn timestamp_claim(
    claims: &[(Value, Value)],
    key: i128,
) -> Result<Option<DateTime<Utc>>, CertError> {
    match claim(claims, key) {
        None => Ok(None),
        Some(Value::Integer(secs)) => {
            let secs = i64::try_from(i128::from(*secs))
                .map_err(|_| CertError::decode("cwt timestamp out of range"))?;
            DateTime::from_timestamp(secs, 0)
                .map(Some)
                .ok_or_else(|| CertError::decode("cwt timestamp out of range"))
        }
        Some(_) => Err(CertError::decode("invalid cwt timestamp claim")),
    }
}
