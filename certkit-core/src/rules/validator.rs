//! Rule selection and evaluation against the injected certlogic engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use strum::Display;

use super::sync::{RulesRepository, ValueSetsRepository};
use super::CovRule;
use crate::cert::{CovCertificate, DgcEntryKind};
use crate::error::CertError;
use crate::rules::RuleType;

/// Verdict of one rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Verdict {
    /// The certificate satisfies the rule.
    Passed,
    /// The certificate violates the rule.
    Failed,
    /// The rule could not be decided for this certificate.
    Open,
}

/// The verdict of one applicable rule for one certificate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// The evaluated rule.
    pub rule: CovRule,
    /// The engine's verdict.
    pub verdict: Verdict,
}

/// The injected declarative rule-expression evaluator.
///
/// Implementations evaluate a JsonLogic-style expression against the
/// certificate data projection and the value-set mappings. Engine-internal
/// failures surface as [`Verdict::Open`], never as panics.
pub trait CertLogicEngine: Send + Sync {
    /// Evaluates `expression` for `certificate_data` and `value_sets`.
    fn evaluate(
        &self,
        expression: &serde_json::Value,
        certificate_data: &serde_json::Value,
        value_sets: &serde_json::Value,
    ) -> Verdict;
}

/// Selects the applicable rules for a certificate and aggregates engine
/// verdicts.
pub struct RulesValidator {
    rules: Arc<RulesRepository>,
    value_sets: Arc<ValueSetsRepository>,
    engine: Arc<dyn CertLogicEngine>,
}

impl RulesValidator {
    /// Creates the validator.
    pub fn new(
        rules: Arc<RulesRepository>,
        value_sets: Arc<ValueSetsRepository>,
        engine: Arc<dyn CertLogicEngine>,
    ) -> Self {
        Self {
            rules,
            value_sets,
            engine,
        }
    }

    /// Evaluates every applicable rule for `certificate` when entering
    /// `country_code` at `validation_clock`.
    ///
    /// Selection requires a country match (acceptance rules match the
    /// destination, invalidation rules the issuing country), a certificate
    /// type match and `validation_clock` within the rule's validity window.
    /// All selected rules are evaluated; nothing short-circuits, so callers
    /// can display every failure reason. An empty result means no rule was
    /// applicable, which callers must treat as a technical condition rather
    /// than success.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Serialization`] when the certificate cannot be
    /// projected for evaluation.
    pub async fn validate(
        &self,
        certificate: &CovCertificate,
        country_code: &str,
        validation_clock: DateTime<Utc>,
    ) -> Result<Vec<ValidationResult>, CertError> {
        let Some(entry) = certificate.dgc_entry() else {
            return Ok(Vec::new());
        };
        let kind = entry.kind();

        let mut selected: Vec<CovRule> = self
            .rules
            .all_rules()
            .await
            .into_iter()
            .filter(|rule| {
                rule_applies(rule, kind, country_code, &certificate.issuer, validation_clock)
            })
            .collect();
        // Deterministic evaluation and display order.
        selected.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        let value_sets = self.value_sets.external_value().await;
        let data = certificate_data(certificate, country_code, validation_clock)?;

        Ok(selected
            .into_iter()
            .map(|rule| {
                let verdict = self.engine.evaluate(&rule.logic, &data, &value_sets);
                ValidationResult { rule, verdict }
            })
            .collect())
    }
}

fn rule_applies(
    rule: &CovRule,
    kind: DgcEntryKind,
    country_code: &str,
    issuer_country: &str,
    clock: DateTime<Utc>,
) -> bool {
    if !rule.covers(clock) || !rule.certificate_type.matches(kind) {
        return false;
    }
    match rule.rule_type {
        RuleType::Acceptance => rule.country.eq_ignore_ascii_case(country_code),
        RuleType::Invalidation => rule.country.eq_ignore_ascii_case(issuer_country),
    }
}

/// The data projection handed to the engine: the certificate payload plus
/// the external evaluation parameters.
fn certificate_data(
    certificate: &CovCertificate,
    country_code: &str,
    validation_clock: DateTime<Utc>,
) -> Result<serde_json::Value, CertError> {
    projection(certificate, Some(country_code), validation_clock)
}

/// Booster evaluation projects the same data without a destination country.
pub(crate) fn certificate_data_for_booster(
    certificate: &CovCertificate,
    validation_clock: DateTime<Utc>,
) -> Result<serde_json::Value, CertError> {
    projection(certificate, None, validation_clock)
}

fn projection(
    certificate: &CovCertificate,
    country_code: Option<&str>,
    validation_clock: DateTime<Utc>,
) -> Result<serde_json::Value, CertError> {
    let payload = serde_json::to_value(certificate)
        .map_err(|err| CertError::Serialization(err.to_string()))?;
    Ok(json!({
        "payload": payload,
        "external": {
            "validationClock": validation_clock.to_rfc3339(),
            "countryCode": country_code.map(str::to_ascii_lowercase),
            "exp": certificate.valid_until.map(|t| t.to_rfc3339()),
            "iat": certificate.issued_at.map(|t| t.to_rfc3339()),
        },
    }))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::rules::local::LocalStore;
    use crate::rules::remote::RulesRemoteDataSource;
    use crate::rules::{RuleCertificateType, ValueSet};
    use crate::storage::{InMemoryStore, UpdateStore};

    /// Engine stub with a fixed verdict per rule identifier.
    struct FixedEngine(Vec<(String, Verdict)>);

    impl CertLogicEngine for FixedEngine {
        fn evaluate(
            &self,
            expression: &serde_json::Value,
            _certificate_data: &serde_json::Value,
            _value_sets: &serde_json::Value,
        ) -> Verdict {
            let id = expression["rule"].as_str().unwrap_or_default();
            self.0
                .iter()
                .find(|(rule_id, _)| rule_id == id)
                .map_or(Verdict::Open, |(_, verdict)| *verdict)
        }
    }

    fn rule(
        identifier: &str,
        country: &str,
        certificate_type: RuleCertificateType,
        valid_from: &str,
        valid_to: &str,
    ) -> CovRule {
        CovRule {
            identifier: identifier.to_string(),
            rule_type: RuleType::Acceptance,
            country: country.to_string(),
            region: None,
            version: "1.0.0".to_string(),
            schema_version: "1.0.0".to_string(),
            engine: "CERTLOGIC".to_string(),
            engine_version: "0.7.5".to_string(),
            certificate_type,
            descriptions: Vec::new(),
            valid_from: valid_from.parse().unwrap(),
            valid_to: valid_to.parse().unwrap(),
            affected_fields: Vec::new(),
            logic: json!({"rule": identifier}),
            hash: format!("hash-{identifier}"),
        }
    }

    fn certificate() -> CovCertificate {
        let mut cert: CovCertificate = serde_json::from_str(
            r#"{
                "ver": "1.3.0",
                "nam": {"fnt": "MUSTERMANN"},
                "dob": "1964-08-12",
                "v": [{
                    "tg": "840539006", "vp": "1119349007", "mp": "EU/1/20/1528",
                    "ma": "ORG-100030215", "dn": 2, "sd": 2, "dt": "2021-05-29",
                    "co": "DE", "is": "RKI", "ci": "URN:UVCI:01DE/A/1"
                }]
            }"#,
        )
        .expect("decode");
        cert.issuer = "DE".to_string();
        cert
    }

    async fn validator_with(
        rules: Vec<CovRule>,
        engine: FixedEngine,
    ) -> RulesValidator {
        let backend: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        let local = Arc::new(LocalStore::new("rules", backend.clone()));
        local.replace_all(rules).await.expect("seed");
        let repository = Arc::new(RulesRepository::new(
            Arc::new(RulesRemoteDataSource::new(
                Arc::new(crate::http_request::Request::new()),
                "https://unused.invalid",
            )),
            local,
            Arc::new(UpdateStore::new(backend.clone())),
        ));
        let value_sets_local = Arc::new(LocalStore::<ValueSet>::new("value_sets", backend.clone()));
        let value_sets = Arc::new(ValueSetsRepository::new(
            Arc::new(crate::rules::remote::ValueSetsRemoteDataSource::new(
                Arc::new(crate::http_request::Request::new()),
                "https://unused.invalid",
            )),
            value_sets_local,
            Arc::new(UpdateStore::new(backend)),
        ));
        RulesValidator::new(repository, value_sets, Arc::new(engine))
    }

    fn clock(value: &str) -> DateTime<Utc> {
        value.parse().unwrap()
    }

    #[tokio::test]
    async fn test_selection_by_country_window_and_type() {
        let validator = validator_with(
            vec![
                rule(
                    "VR-DE-0001",
                    "DE",
                    RuleCertificateType::Vaccination,
                    "2021-07-01T00:00:00Z",
                    "2030-06-01T00:00:00Z",
                ),
                // Wrong country.
                rule(
                    "VR-FR-0001",
                    "FR",
                    RuleCertificateType::Vaccination,
                    "2021-07-01T00:00:00Z",
                    "2030-06-01T00:00:00Z",
                ),
                // Window expired.
                rule(
                    "VR-DE-0002",
                    "DE",
                    RuleCertificateType::Vaccination,
                    "2021-01-01T00:00:00Z",
                    "2021-06-01T00:00:00Z",
                ),
                // Wrong certificate type.
                rule(
                    "TR-DE-0001",
                    "DE",
                    RuleCertificateType::Test,
                    "2021-07-01T00:00:00Z",
                    "2030-06-01T00:00:00Z",
                ),
                // General rules apply to every kind.
                rule(
                    "GR-DE-0001",
                    "DE",
                    RuleCertificateType::General,
                    "2021-07-01T00:00:00Z",
                    "2030-06-01T00:00:00Z",
                ),
            ],
            FixedEngine(vec![
                ("VR-DE-0001".to_string(), Verdict::Passed),
                ("GR-DE-0001".to_string(), Verdict::Passed),
            ]),
        )
        .await;

        let results = validator
            .validate(&certificate(), "DE", clock("2022-01-01T12:00:00Z"))
            .await
            .expect("validate");
        let ids: Vec<&str> = results.iter().map(|r| r.rule.identifier.as_str()).collect();
        assert_eq!(ids, vec!["GR-DE-0001", "VR-DE-0001"]);
        assert!(results.iter().all(|r| r.verdict == Verdict::Passed));
    }

    #[tokio::test]
    async fn test_window_bounds_are_half_open() {
        let rules = vec![rule(
            "VR-DE-0001",
            "DE",
            RuleCertificateType::Vaccination,
            "2021-07-01T00:00:00Z",
            "2021-08-01T00:00:00Z",
        )];
        let engine = || FixedEngine(vec![("VR-DE-0001".to_string(), Verdict::Passed)]);

        let validator = validator_with(rules.clone(), engine()).await;
        // Inclusive start.
        assert_eq!(
            validator
                .validate(&certificate(), "DE", clock("2021-07-01T00:00:00Z"))
                .await
                .expect("validate")
                .len(),
            1
        );
        // Exclusive end.
        assert!(validator
            .validate(&certificate(), "DE", clock("2021-08-01T00:00:00Z"))
            .await
            .expect("validate")
            .is_empty());
        // Outside the window entirely.
        assert!(validator
            .validate(&certificate(), "DE", clock("2021-06-30T23:59:59Z"))
            .await
            .expect("validate")
            .is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_rules_match_issuing_country() {
        let mut invalidation = rule(
            "IR-DE-0001",
            "DE",
            RuleCertificateType::General,
            "2021-07-01T00:00:00Z",
            "2030-06-01T00:00:00Z",
        );
        invalidation.rule_type = RuleType::Invalidation;
        let validator = validator_with(
            vec![invalidation],
            FixedEngine(vec![("IR-DE-0001".to_string(), Verdict::Failed)]),
        )
        .await;

        // Destination FR, but the certificate is issued by DE: the DE
        // invalidation rule still applies.
        let results = validator
            .validate(&certificate(), "FR", clock("2022-01-01T00:00:00Z"))
            .await
            .expect("validate");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].verdict, Verdict::Failed);
    }

    #[tokio::test]
    async fn test_all_rules_are_evaluated_without_short_circuit() {
        let validator = validator_with(
            vec![
                rule(
                    "VR-DE-0001",
                    "DE",
                    RuleCertificateType::Vaccination,
                    "2021-07-01T00:00:00Z",
                    "2030-06-01T00:00:00Z",
                ),
                rule(
                    "VR-DE-0002",
                    "DE",
                    RuleCertificateType::Vaccination,
                    "2021-07-01T00:00:00Z",
                    "2030-06-01T00:00:00Z",
                ),
            ],
            FixedEngine(vec![
                ("VR-DE-0001".to_string(), Verdict::Failed),
                ("VR-DE-0002".to_string(), Verdict::Passed),
            ]),
        )
        .await;

        let results = validator
            .validate(&certificate(), "DE", clock("2022-01-01T00:00:00Z"))
            .await
            .expect("validate");
        // Both rules got a verdict even though the first one failed.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].verdict, Verdict::Failed);
        assert_eq!(results[1].verdict, Verdict::Passed);
    }
}
