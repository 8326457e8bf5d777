use thiserror::Error;

use crate::storage::StorageError;

/// Error outputs from `certkit`.
///
/// Decode, signature, expiry and blacklist failures abort certificate
/// processing immediately; rule-evaluation outcomes are aggregated by the
/// caller before one of the validation variants is produced.
#[derive(Debug, Error)]
pub enum CertError {
    /// Malformed Base45, zlib, COSE or CBOR structure.
    #[error("decode_error: {reason}")]
    Decode {
        /// What part of the decode pipeline rejected the input.
        reason: String,
    },
    /// Unknown signer or failed cryptographic verification.
    #[error("signature_error: {reason}")]
    Signature {
        /// Why the signature could not be validated.
        reason: String,
    },
    /// The token's CWT expiration claim is in the past.
    #[error("expired_certificate")]
    ExpiredCertificate,
    /// The issuing entity of the certificate is blacklisted.
    #[error("blacklisted_entity")]
    BlacklistedEntity,
    /// A trust list contained two entries for the same (country, key id) pair.
    #[error("ambiguous_trust_entry: {country}/{kid}")]
    AmbiguousTrustEntry {
        /// Country of the colliding entries.
        country: String,
        /// Hex-encoded key id of the colliding entries.
        kid: String,
    },
    /// One or more applicable business rules failed.
    #[error("validation_failed")]
    ValidationFailed,
    /// No applicable rule could be found for the given country/date/type.
    #[error("no_applicable_rules")]
    NoApplicableRules,
    /// Network connection error with details.
    #[error("network_error: {url}: {error}")]
    Network {
        /// The URL the request was sent to.
        url: String,
        /// HTTP status code, when a response was received.
        status: Option<u16>,
        /// Human-readable failure description.
        error: String,
    },
    /// HTTP request failure below the retry layer.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Unexpected error serializing or deserializing information.
    #[error("serialization_error: {0}")]
    Serialization(String),
    /// Failure at the persistence boundary.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CertError {
    /// Shorthand for a [`CertError::Decode`] with the given reason.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`CertError::Signature`] with the given reason.
    pub fn signature(reason: impl Into<String>) -> Self {
        Self::Signature {
            reason: reason.into(),
        }
    }
}
