//! QR string decoding: the multi-layer pipeline from scanned text to a
//! verified certificate.

use std::sync::Arc;

use chrono::Utc;

use crate::cert::CovCertificate;
use crate::cose::CoseSign1;
use crate::error::CertError;
use crate::validator::CertValidator;
use crate::{base45, zlib};

const QR_SCHEME_PREFIX: &str = "HC1:";

/// Decodes QR code strings into certificates.
pub struct QrCoder {
    validator: Arc<CertValidator>,
}

impl QrCoder {
    /// Creates a coder that verifies against the given validator.
    pub fn new(validator: Arc<CertValidator>) -> Self {
        Self { validator }
    }

    /// Returns the raw COSE bytes contained within the QR string.
    ///
    /// A missing scheme prefix is not itself fatal; the text is passed on
    /// as-is and fails Base45 decoding if it is not a token.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Decode`] on malformed Base45 or zlib layers.
    pub fn decode_raw_cose(&self, qr_content: &str) -> Result<Vec<u8>, CertError> {
        let content = qr_content
            .strip_prefix(QR_SCHEME_PREFIX)
            .unwrap_or(qr_content);
        zlib::decompress(&base45::decode(content)?)
    }

    /// Parses the COSE Sign1 envelope from the QR string.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Decode`] on any malformed layer.
    pub fn decode_cose(&self, qr_content: &str) -> Result<CoseSign1, CertError> {
        CoseSign1::from_bytes(&self.decode_raw_cose(qr_content)?)
    }

    /// Converts QR content into a verified [`CovCertificate`].
    ///
    /// # Errors
    ///
    /// Propagates the typed decode, signature, expiry and blacklist failures
    /// of the pipeline.
    pub fn decode_cov_cert(&self, qr_content: &str) -> Result<CovCertificate, CertError> {
        self.validator
            .validate_and_decode(&self.decode_cose(qr_content)?, Utc::now())
    }
}
