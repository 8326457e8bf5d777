//! Certificate data model: the structured result of a verified token.
//!
//! Field names follow the health-certificate schema's short JSON/CBOR keys,
//! so the same serde definitions decode the CWT claim and persist snapshots.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Holder name with its ICAO-transliterated standardized forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    /// Given name as printed.
    #[serde(rename = "gn", default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// Family name as printed.
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Standardized given name.
    #[serde(rename = "gnt", default, skip_serializing_if = "Option::is_none")]
    pub given_name_transliterated: Option<String>,
    /// Standardized family name. The only mandatory name component.
    #[serde(rename = "fnt", default)]
    pub family_name_transliterated: String,
}

impl Name {
    /// Printable full name, preferring the non-transliterated forms.
    #[must_use]
    pub fn full_name(&self) -> String {
        let given = self
            .given_name
            .as_deref()
            .or(self.given_name_transliterated.as_deref())
            .unwrap_or_default();
        let family = self
            .family_name
            .as_deref()
            .unwrap_or(&self.family_name_transliterated);
        format!("{given} {family}").trim().to_string()
    }

    /// Standardized machine-readable name used to group certificates of one
    /// person.
    #[must_use]
    pub fn standardized(&self) -> String {
        match self.given_name_transliterated.as_deref() {
            Some(given) if !given.is_empty() => {
                format!("{}<<{given}", self.family_name_transliterated)
            }
            _ => self.family_name_transliterated.clone(),
        }
    }
}

/// A single vaccination record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vaccination {
    /// Targeted disease code.
    #[serde(rename = "tg")]
    pub target_disease: String,
    /// Vaccine or prophylaxis code.
    #[serde(rename = "vp")]
    pub vaccine_code: String,
    /// Medicinal product code.
    #[serde(rename = "mp")]
    pub product: String,
    /// Marketing authorization holder or manufacturer code.
    #[serde(rename = "ma")]
    pub manufacturer: String,
    /// Number in a series of doses.
    #[serde(rename = "dn")]
    pub dose_number: u32,
    /// Overall number of doses in the series.
    #[serde(rename = "sd")]
    pub total_serial_doses: u32,
    /// Date of vaccination.
    #[serde(rename = "dt")]
    pub occurrence: NaiveDate,
    /// Country of vaccination.
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer.
    #[serde(rename = "is")]
    pub certificate_issuer: String,
    /// Unique certificate identifier (UVCI).
    #[serde(rename = "ci")]
    pub id: String,
}

impl Vaccination {
    /// Whether the vaccination series is complete.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.dose_number >= self.total_serial_doses
    }

    /// Whether this record is a booster shot.
    #[must_use]
    pub const fn is_booster(&self) -> bool {
        self.dose_number > self.total_serial_doses
            || (self.dose_number == self.total_serial_doses && self.dose_number > 2)
    }
}

/// A single recovery record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recovery {
    /// Targeted disease code.
    #[serde(rename = "tg")]
    pub target_disease: String,
    /// Date of the first positive test result.
    #[serde(rename = "fr")]
    pub first_result: NaiveDate,
    /// Certificate valid from.
    #[serde(rename = "df")]
    pub valid_from: NaiveDate,
    /// Certificate valid until.
    #[serde(rename = "du")]
    pub valid_until: NaiveDate,
    /// Country of test.
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer.
    #[serde(rename = "is")]
    pub certificate_issuer: String,
    /// Unique certificate identifier (UVCI).
    #[serde(rename = "ci")]
    pub id: String,
}

/// A single test record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCert {
    /// Targeted disease code.
    #[serde(rename = "tg")]
    pub target_disease: String,
    /// Test type code.
    #[serde(rename = "tt")]
    pub test_type: String,
    /// Test result code.
    #[serde(rename = "tr")]
    pub test_result: String,
    /// Sample collection time.
    #[serde(rename = "sc")]
    pub sample_collection: DateTime<Utc>,
    /// Testing centre or facility.
    #[serde(rename = "tc", default)]
    pub testing_center: String,
    /// Country of test.
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer.
    #[serde(rename = "is")]
    pub certificate_issuer: String,
    /// Unique certificate identifier (UVCI).
    #[serde(rename = "ci")]
    pub id: String,
}

impl TestCert {
    /// Test type code for PCR (NAAT) tests.
    pub const PCR_TEST: &'static str = "LP6464-4";
    /// Test type code for rapid antigen tests.
    pub const ANTIGEN_TEST: &'static str = "LP217198-3";
    /// Result code for a negative ("not detected") result.
    pub const NEGATIVE_RESULT: &'static str = "260415000";
    /// Result code for a positive ("detected") result.
    pub const POSITIVE_RESULT: &'static str = "260373001";

    /// Classification of this record, when both codes are known.
    #[must_use]
    pub fn classify(&self) -> Option<TestCertType> {
        let negative = match self.test_result.as_str() {
            Self::NEGATIVE_RESULT => true,
            Self::POSITIVE_RESULT => false,
            _ => return None,
        };
        match (self.test_type.as_str(), negative) {
            (Self::PCR_TEST, true) => Some(TestCertType::NegativePcrTest),
            (Self::PCR_TEST, false) => Some(TestCertType::PositivePcrTest),
            (Self::ANTIGEN_TEST, true) => Some(TestCertType::NegativeAntigenTest),
            (Self::ANTIGEN_TEST, false) => Some(TestCertType::PositiveAntigenTest),
            _ => None,
        }
    }

    /// Whether this is a PCR test.
    #[must_use]
    pub fn is_pcr(&self) -> bool {
        self.test_type == Self::PCR_TEST
    }
}

/// Test record classification by type and result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TestCertType {
    /// Negative PCR test.
    NegativePcrTest,
    /// Positive PCR test.
    PositivePcrTest,
    /// Negative rapid antigen test.
    NegativeAntigenTest,
    /// Positive rapid antigen test.
    PositiveAntigenTest,
}

/// Entry kind of a certificate, used for rule applicability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DgcEntryKind {
    /// A vaccination entry.
    Vaccination,
    /// A recovery entry.
    Recovery,
    /// A test entry.
    Test,
}

/// Borrowing view of the single active entry of a certificate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DgcEntry<'a> {
    /// A vaccination entry.
    Vaccination(&'a Vaccination),
    /// A recovery entry.
    Recovery(&'a Recovery),
    /// A test entry.
    Test(&'a TestCert),
}

const UVCI_PREFIX: &str = "URN:UVCI:";

impl DgcEntry<'_> {
    /// The entry's unique certificate identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Vaccination(v) => &v.id,
            Self::Recovery(r) => &r.id,
            Self::Test(t) => &t.id,
        }
    }

    /// The identifier without its `URN:UVCI:` prefix.
    #[must_use]
    pub fn id_without_prefix(&self) -> &str {
        let id = self.id();
        id.strip_prefix(UVCI_PREFIX).unwrap_or(id)
    }

    /// The entry kind.
    #[must_use]
    pub const fn kind(&self) -> DgcEntryKind {
        match self {
            Self::Vaccination(_) => DgcEntryKind::Vaccination,
            Self::Recovery(_) => DgcEntryKind::Recovery,
            Self::Test(_) => DgcEntryKind::Test,
        }
    }
}

/// A decoded, verified health certificate.
///
/// Immutable once decoded. The `issuer`, `issued_at` and `valid_until`
/// fields come from the verified CWT claims rather than the certificate
/// payload itself and are filled in by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovCertificate {
    /// Schema version of the certificate payload.
    #[serde(rename = "ver")]
    pub version: String,
    /// Holder name.
    #[serde(rename = "nam")]
    pub name: Name,
    /// Holder date of birth. Kept as a string, partial dates are allowed.
    #[serde(rename = "dob", default)]
    pub birth_date: String,
    /// Vaccination entries.
    #[serde(rename = "v", default, skip_serializing_if = "Vec::is_empty")]
    pub vaccinations: Vec<Vaccination>,
    /// Recovery entries.
    #[serde(rename = "r", default, skip_serializing_if = "Vec::is_empty")]
    pub recoveries: Vec<Recovery>,
    /// Test entries.
    #[serde(rename = "t", default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestCert>,
    /// Issuing country, from the CWT issuer claim.
    #[serde(default)]
    pub issuer: String,
    /// Token issuance time, from the CWT issued-at claim.
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    /// Token expiry, from the CWT expiration claim.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl CovCertificate {
    /// The single active entry of this certificate.
    ///
    /// A token carries exactly one payload type; the first non-empty group
    /// wins, which also keeps a merged vaccination+recovery view (used for
    /// booster evaluation) a vaccination certificate.
    #[must_use]
    pub fn dgc_entry(&self) -> Option<DgcEntry<'_>> {
        if let Some(vaccination) = self.vaccinations.first() {
            return Some(DgcEntry::Vaccination(vaccination));
        }
        if let Some(recovery) = self.recoveries.first() {
            return Some(DgcEntry::Recovery(recovery));
        }
        self.tests.first().map(DgcEntry::Test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vaccination(dose_number: u32, total: u32) -> Vaccination {
        Vaccination {
            target_disease: "840539006".to_string(),
            vaccine_code: "1119349007".to_string(),
            product: "EU/1/20/1528".to_string(),
            manufacturer: "ORG-100030215".to_string(),
            dose_number,
            total_serial_doses: total,
            occurrence: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            country: "DE".to_string(),
            certificate_issuer: "Robert Koch-Institut".to_string(),
            id: "URN:UVCI:01DE/IZ12345A/5CWLU12RNOB9RXSEOP6FG8#W".to_string(),
        }
    }

    #[test]
    fn test_decode_from_schema_json() {
        let json = r#"{
            "ver": "1.3.0",
            "nam": {"fn": "Mustermann", "gn": "Erika", "fnt": "MUSTERMANN", "gnt": "ERIKA"},
            "dob": "1964-08-12",
            "v": [{
                "tg": "840539006", "vp": "1119349007", "mp": "EU/1/20/1528",
                "ma": "ORG-100030215", "dn": 2, "sd": 2, "dt": "2021-05-29",
                "co": "DE", "is": "Robert Koch-Institut",
                "ci": "URN:UVCI:01DE/IZ12345A/5CWLU12RNOB9RXSEOP6FG8#W"
            }]
        }"#;
        let cert: CovCertificate = serde_json::from_str(json).expect("decode");
        assert_eq!(cert.name.full_name(), "Erika Mustermann");
        assert_eq!(cert.name.standardized(), "MUSTERMANN<<ERIKA");
        assert_eq!(cert.birth_date, "1964-08-12");

        let entry = cert.dgc_entry().expect("entry");
        assert_eq!(entry.kind(), DgcEntryKind::Vaccination);
        assert_eq!(
            entry.id_without_prefix(),
            "01DE/IZ12345A/5CWLU12RNOB9RXSEOP6FG8#W"
        );
    }

    #[test]
    fn test_entry_selection_prefers_vaccination() {
        let mut cert: CovCertificate = serde_json::from_str(
            r#"{"ver": "1.3.0", "nam": {"fnt": "MUSTERMANN"}, "dob": ""}"#,
        )
        .expect("decode");
        assert!(cert.dgc_entry().is_none());

        cert.recoveries.push(Recovery {
            target_disease: "840539006".to_string(),
            first_result: NaiveDate::from_ymd_opt(2021, 1, 10).unwrap(),
            valid_from: NaiveDate::from_ymd_opt(2021, 1, 24).unwrap(),
            valid_until: NaiveDate::from_ymd_opt(2021, 6, 24).unwrap(),
            country: "DE".to_string(),
            certificate_issuer: "RKI".to_string(),
            id: "URN:UVCI:01DE/RECOV/1".to_string(),
        });
        assert_eq!(cert.dgc_entry().unwrap().kind(), DgcEntryKind::Recovery);

        cert.vaccinations.push(vaccination(2, 2));
        assert_eq!(cert.dgc_entry().unwrap().kind(), DgcEntryKind::Vaccination);
    }

    #[test]
    fn test_booster_derivation() {
        assert!(!vaccination(1, 2).is_complete());
        assert!(!vaccination(1, 2).is_booster());
        assert!(vaccination(2, 2).is_complete());
        assert!(!vaccination(2, 2).is_booster());
        assert!(vaccination(3, 2).is_booster());
        assert!(vaccination(3, 3).is_booster());
    }

    #[test]
    fn test_test_classification() {
        let mut test = TestCert {
            target_disease: "840539006".to_string(),
            test_type: TestCert::PCR_TEST.to_string(),
            test_result: TestCert::NEGATIVE_RESULT.to_string(),
            sample_collection: "2021-05-30T10:12:22Z".parse().unwrap(),
            testing_center: "Testzentrum Köln".to_string(),
            country: "DE".to_string(),
            certificate_issuer: "RKI".to_string(),
            id: "URN:UVCI:01DE/TEST/1".to_string(),
        };
        assert_eq!(test.classify(), Some(TestCertType::NegativePcrTest));
        assert!(test.is_pcr());

        test.test_type = TestCert::ANTIGEN_TEST.to_string();
        test.test_result = TestCert::POSITIVE_RESULT.to_string();
        assert_eq!(test.classify(), Some(TestCertType::PositiveAntigenTest));

        test.test_result = "999999999".to_string();
        assert_eq!(test.classify(), None);
    }

    #[test]
    fn test_persistence_round_trip_keeps_cwt_fields() {
        let mut cert: CovCertificate = serde_json::from_str(
            r#"{"ver": "1.3.0", "nam": {"fnt": "MUSTERMANN"}, "dob": "1964-08-12"}"#,
        )
        .expect("decode");
        cert.vaccinations.push(vaccination(2, 2));
        cert.issuer = "DE".to_string();
        cert.valid_until = Some("2022-06-01T00:00:00Z".parse().unwrap());

        let encoded = serde_json::to_string(&cert).expect("encode");
        let decoded: CovCertificate = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, cert);
    }
}
