//! Scan-time orchestration: decode, validate against business rules and map
//! the per-rule verdicts to one user-facing outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cert::{CovCertificate, DgcEntry};
use crate::error::CertError;
use crate::qr::QrCoder;
use crate::rules::validator::{RulesValidator, ValidationResult, Verdict};

/// Aggregated verdict over the applicable rules of one certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckValidationResult {
    /// No applicable rule was found; not the same as passing.
    TechnicalError,
    /// At least one applicable rule did not pass.
    ValidationError,
    /// Every applicable rule passed.
    Success,
}

/// Maps per-rule results to the aggregated verdict.
///
/// Empty input is a technical condition. Any verdict other than PASSED
/// (FAILED or undecidable OPEN) makes the certificate invalid for entry.
#[must_use]
pub fn aggregate(results: &[ValidationResult]) -> CheckValidationResult {
    if results.is_empty() {
        return CheckValidationResult::TechnicalError;
    }
    if results
        .iter()
        .any(|result| result.verdict != Verdict::Passed)
    {
        return CheckValidationResult::ValidationError;
    }
    CheckValidationResult::Success
}

/// Outcome of a successful certificate check.
///
/// Test certificates are routed by subtype purely for downstream
/// presentation; the validation outcome is the same.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// A passing vaccination certificate.
    ValidVaccination(CovCertificate),
    /// A passing recovery certificate.
    ValidRecovery(CovCertificate),
    /// A passing PCR test certificate.
    ValidPcrTest {
        /// The verified certificate.
        certificate: CovCertificate,
        /// When the sample was collected.
        sample_collection: DateTime<Utc>,
    },
    /// A passing rapid antigen test certificate.
    ValidAntigenTest {
        /// The verified certificate.
        certificate: CovCertificate,
        /// When the sample was collected.
        sample_collection: DateTime<Utc>,
    },
}

/// Drives the full scan flow for checking a presented certificate.
pub struct CertificateChecker {
    qr_coder: Arc<QrCoder>,
    rules_validator: Arc<RulesValidator>,
}

impl CertificateChecker {
    /// Creates the checker.
    pub fn new(qr_coder: Arc<QrCoder>, rules_validator: Arc<RulesValidator>) -> Self {
        Self {
            qr_coder,
            rules_validator,
        }
    }

    /// Decodes and fully validates scanned QR content for entry into
    /// `country_code` at `clock`.
    ///
    /// # Errors
    ///
    /// Propagates the typed decode/signature/expiry/blacklist failures of
    /// the pipeline; additionally returns
    /// [`CertError::NoApplicableRules`] when no rule was applicable and
    /// [`CertError::ValidationFailed`] when at least one rule did not pass.
    pub async fn check(
        &self,
        qr_content: &str,
        country_code: &str,
        clock: DateTime<Utc>,
    ) -> Result<CheckOutcome, CertError> {
        let certificate = self.qr_coder.decode_cov_cert(qr_content)?;
        let results = self
            .rules_validator
            .validate(&certificate, country_code, clock)
            .await?;
        match aggregate(&results) {
            CheckValidationResult::TechnicalError => Err(CertError::NoApplicableRules),
            CheckValidationResult::ValidationError => Err(CertError::ValidationFailed),
            CheckValidationResult::Success => Ok(route(certificate)),
        }
    }
}

fn route(certificate: CovCertificate) -> CheckOutcome {
    enum Route {
        Vaccination,
        Recovery,
        Pcr(DateTime<Utc>),
        Antigen(DateTime<Utc>),
    }
    let route = match certificate.dgc_entry() {
        Some(DgcEntry::Vaccination(_)) | None => Route::Vaccination,
        Some(DgcEntry::Recovery(_)) => Route::Recovery,
        Some(DgcEntry::Test(test)) => {
            if test.is_pcr() {
                Route::Pcr(test.sample_collection)
            } else {
                Route::Antigen(test.sample_collection)
            }
        }
    };
    match route {
        Route::Vaccination => CheckOutcome::ValidVaccination(certificate),
        Route::Recovery => CheckOutcome::ValidRecovery(certificate),
        Route::Pcr(sample_collection) => CheckOutcome::ValidPcrTest {
            certificate,
            sample_collection,
        },
        Route::Antigen(sample_collection) => CheckOutcome::ValidAntigenTest {
            certificate,
            sample_collection,
        },
    }
}
