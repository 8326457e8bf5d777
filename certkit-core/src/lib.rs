//! Decoding, signature verification and business-rule validation for
//! digitally signed health certificates.
//!
//! The crate covers the full verification pipeline — `HC1:` QR text,
//! Base45, zlib, COSE Sign1, CBOR Web Token — against a synchronized trust
//! list, plus the incremental-diff synchronization of business rules, value
//! sets, booster rules and countries, their selection and evaluation
//! through an injected certlogic engine, and booster notification
//! derivation over stored certificates.
//!
//! Hosts construct a [`context::SdkContext`] once and drive the periodic
//! [`worker`] entry points from their own scheduler.

pub mod base45;
pub mod cert;
pub mod check;
pub mod context;
pub mod cose;
pub mod cwt;
pub mod dsc;
pub mod error;
pub mod grouped;
pub mod http_request;
pub mod issuing_entity;
pub mod qr;
pub mod rules;
pub mod storage;
pub mod testing;
pub mod trust;
pub mod validator;
pub mod worker;
pub mod zlib;

pub use cert::{CovCertificate, DgcEntry, DgcEntryKind, Name, Recovery, TestCert, Vaccination};
pub use check::{CertificateChecker, CheckOutcome, CheckValidationResult};
pub use context::{SdkConfig, SdkContext};
pub use error::CertError;
pub use qr::QrCoder;
pub use rules::validator::{CertLogicEngine, RulesValidator, ValidationResult, Verdict};
pub use trust::{DscList, KeyIdentifier, TrustStore, TrustedCert};
pub use validator::CertValidator;
