//! Certificate validation: signature verification against the trust store
//! plus temporal and blacklist checks, producing the structured model.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cert::CovCertificate;
use crate::cose::CoseSign1;
use crate::cwt::CborWebToken;
use crate::error::CertError;
use crate::issuing_entity::validate_entity;
use crate::trust::TrustStore;

/// Validates and decodes signed tokens into [`CovCertificate`]s.
///
/// Stateless apart from the shared trust store; safe to use concurrently.
pub struct CertValidator {
    trust_store: Arc<TrustStore>,
}

impl CertValidator {
    /// Creates a validator over the given trust store.
    pub fn new(trust_store: Arc<TrustStore>) -> Self {
        Self { trust_store }
    }

    /// Verifies the token and maps its claims into a [`CovCertificate`].
    ///
    /// The signer is resolved by the exact pair of the CWT issuer country
    /// and the COSE key id; there is no cross-country fallback.
    ///
    /// # Errors
    ///
    /// - [`CertError::Decode`] on malformed CWT claims or an entry-less
    ///   certificate payload,
    /// - [`CertError::Signature`] on an unknown signer or failed
    ///   verification,
    /// - [`CertError::ExpiredCertificate`] when the expiration claim is not
    ///   after `now`,
    /// - [`CertError::BlacklistedEntity`] when the issuing entity is
    ///   blacklisted.
    pub fn validate_and_decode(
        &self,
        cose: &CoseSign1,
        now: DateTime<Utc>,
    ) -> Result<CovCertificate, CertError> {
        let cwt = CborWebToken::decode(cose.payload())?;
        let kid = cose.key_identifier()?;
        let key = self
            .trust_store
            .resolve(&cwt.issuer, &kid)
            .ok_or_else(|| CertError::signature("unknown signer"))?;
        cose.verify_signature(&key)?;

        if cwt.expires_at <= now {
            return Err(CertError::ExpiredCertificate);
        }

        let mut certificate: CovCertificate = cwt.health_certificate()?;
        certificate.issuer = cwt.issuer;
        certificate.issued_at = cwt.issued_at;
        certificate.valid_until = Some(cwt.expires_at);

        let entry = certificate
            .dgc_entry()
            .ok_or_else(|| CertError::decode("certificate carries no entry"))?;
        validate_entity(entry.id_without_prefix())?;

        Ok(certificate)
    }
}
