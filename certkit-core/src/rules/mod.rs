//! Business rules, booster rules, value sets and their synchronization,
//! selection and evaluation.

pub mod booster;
pub mod local;
pub mod remote;
pub mod sync;
pub mod validator;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cert::DgcEntryKind;

/// Whether a rule grants entry or invalidates a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleType {
    /// Acceptance rule of a destination country.
    Acceptance,
    /// Invalidation rule of the issuing country.
    Invalidation,
}

/// Certificate kinds a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleCertificateType {
    /// Applies to every certificate kind.
    General,
    /// Applies to vaccination certificates.
    Vaccination,
    /// Applies to recovery certificates.
    Recovery,
    /// Applies to test certificates.
    Test,
}

impl RuleCertificateType {
    /// Whether a certificate entry of `kind` is covered by this rule type.
    #[must_use]
    pub const fn matches(self, kind: DgcEntryKind) -> bool {
        matches!(
            (self, kind),
            (Self::General, _)
                | (Self::Vaccination, DgcEntryKind::Vaccination)
                | (Self::Recovery, DgcEntryKind::Recovery)
                | (Self::Test, DgcEntryKind::Test)
        )
    }
}

/// One localized rule description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDescription {
    /// Language code, e.g. `en`.
    pub lang: String,
    /// Description text.
    pub desc: String,
}

/// A business rule of one country, as kept in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovRule {
    /// Rule identifier, unique per country.
    pub identifier: String,
    /// Acceptance or invalidation.
    pub rule_type: RuleType,
    /// Country the rule belongs to.
    pub country: String,
    /// Optional sub-national region.
    pub region: Option<String>,
    /// Rule version.
    pub version: String,
    /// Certificate schema version the rule was written against.
    pub schema_version: String,
    /// Evaluation engine name, e.g. `CERTLOGIC`.
    pub engine: String,
    /// Evaluation engine version.
    pub engine_version: String,
    /// Certificate kinds the rule applies to.
    pub certificate_type: RuleCertificateType,
    /// Localized descriptions.
    pub descriptions: Vec<RuleDescription>,
    /// Start of the validity window (inclusive).
    pub valid_from: DateTime<Utc>,
    /// End of the validity window (exclusive).
    pub valid_to: DateTime<Utc>,
    /// Certificate fields the rule expression reads.
    pub affected_fields: Vec<String>,
    /// The declarative rule expression.
    pub logic: serde_json::Value,
    /// Content fingerprint from the distribution manifest.
    pub hash: String,
}

impl CovRule {
    /// Whether `clock` falls within the rule's `[valid_from, valid_to)` window.
    #[must_use]
    pub fn covers(&self, clock: DateTime<Utc>) -> bool {
        self.valid_from <= clock && clock < self.valid_to
    }

    /// The description for a language code, case-insensitive.
    #[must_use]
    pub fn description_for(&self, lang: &str) -> Option<&str> {
        description_for(&self.descriptions, lang)
    }
}

/// A booster recommendation rule, country-independent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterRule {
    /// Rule identifier.
    pub identifier: String,
    /// Rule version.
    pub version: String,
    /// Certificate schema version the rule was written against.
    pub schema_version: String,
    /// Evaluation engine name.
    pub engine: String,
    /// Evaluation engine version.
    pub engine_version: String,
    /// Certificate kinds the rule applies to.
    pub certificate_type: RuleCertificateType,
    /// Localized descriptions.
    pub descriptions: Vec<RuleDescription>,
    /// Start of the validity window (inclusive).
    pub valid_from: DateTime<Utc>,
    /// End of the validity window (exclusive).
    pub valid_to: DateTime<Utc>,
    /// Certificate fields the rule expression reads.
    pub affected_fields: Vec<String>,
    /// The declarative rule expression.
    pub logic: serde_json::Value,
    /// Content fingerprint from the distribution manifest.
    pub hash: String,
}

impl BoosterRule {
    /// Whether `clock` falls within the rule's `[valid_from, valid_to)` window.
    #[must_use]
    pub fn covers(&self, clock: DateTime<Utc>) -> bool {
        self.valid_from <= clock && clock < self.valid_to
    }

    /// The description for a language code, case-insensitive.
    #[must_use]
    pub fn description_for(&self, lang: &str) -> Option<&str> {
        description_for(&self.descriptions, lang)
    }
}

fn description_for<'a>(descriptions: &'a [RuleDescription], lang: &str) -> Option<&'a str> {
    descriptions
        .iter()
        .find(|description| description.lang.eq_ignore_ascii_case(lang))
        .map(|description| description.desc.as_str())
}

/// A code-to-display-value mapping referenced by rule expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSet {
    /// Value-set identifier.
    pub id: String,
    /// Release date of the value set.
    pub date: NaiveDate,
    /// Mapping of code to display metadata.
    pub values: serde_json::Value,
    /// Content fingerprint from the distribution manifest.
    pub hash: String,
}

impl ValueSet {
    /// The codes contained in this value set.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.values
            .as_object()
            .map(|values| values.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_type_matching() {
        use DgcEntryKind::{Recovery, Test, Vaccination};
        assert!(RuleCertificateType::General.matches(Vaccination));
        assert!(RuleCertificateType::General.matches(Test));
        assert!(RuleCertificateType::Vaccination.matches(Vaccination));
        assert!(!RuleCertificateType::Vaccination.matches(Recovery));
        assert!(!RuleCertificateType::Test.matches(Recovery));
    }

    #[test]
    fn test_value_set_codes() {
        let value_set = ValueSet {
            id: "vaccines-covid-19-names".to_string(),
            date: NaiveDate::from_ymd_opt(2021, 4, 27).unwrap(),
            values: serde_json::json!({
                "EU/1/20/1528": {"display": "Comirnaty"},
                "EU/1/20/1507": {"display": "Spikevax"}
            }),
            hash: "abc".to_string(),
        };
        let mut codes = value_set.codes();
        codes.sort_unstable();
        assert_eq!(codes, vec!["EU/1/20/1507", "EU/1/20/1528"]);
    }
}
