//! Booster rule evaluation and the notification engine that maintains
//! per-person booster state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::sync::{BoosterRulesRepository, ValueSetsRepository};
use super::validator::{certificate_data_for_booster, CertLogicEngine, Verdict};
use super::BoosterRule;
use crate::cert::CovCertificate;
use crate::error::CertError;
use crate::grouped::{
    BoosterNotification, BoosterResult, CertRepository, GroupedCertificates,
    GroupedCertificatesId,
};

/// The verdict of one booster rule for one certificate.
#[derive(Debug, Clone, PartialEq)]
pub struct BoosterValidationResult {
    /// The evaluated rule.
    pub rule: BoosterRule,
    /// The engine's verdict.
    pub verdict: Verdict,
}

/// Evaluates booster rules in a stable, identifier-sorted order.
pub struct BoosterRulesValidator {
    rules: Arc<BoosterRulesRepository>,
    value_sets: Arc<ValueSetsRepository>,
    engine: Arc<dyn CertLogicEngine>,
}

impl BoosterRulesValidator {
    /// Creates the validator.
    pub fn new(
        rules: Arc<BoosterRulesRepository>,
        value_sets: Arc<ValueSetsRepository>,
        engine: Arc<dyn CertLogicEngine>,
    ) -> Self {
        Self {
            rules,
            value_sets,
            engine,
        }
    }

    /// Evaluates every currently valid booster rule applicable to the
    /// certificate's entry kind, ordered by rule identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Serialization`] when the certificate cannot be
    /// projected for evaluation.
    pub async fn validate(
        &self,
        certificate: &CovCertificate,
        clock: DateTime<Utc>,
    ) -> Result<Vec<BoosterValidationResult>, CertError> {
        let Some(entry) = certificate.dgc_entry() else {
            return Ok(Vec::new());
        };
        let kind = entry.kind();

        let mut selected: Vec<BoosterRule> = self
            .rules
            .all_rules()
            .await
            .into_iter()
            .filter(|rule| rule.covers(clock) && rule.certificate_type.matches(kind))
            .collect();
        // First-match semantics downstream require a deterministic order.
        selected.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        let value_sets = self.value_sets.external_value().await;
        let data = certificate_data_for_booster(certificate, clock)?;

        Ok(selected
            .into_iter()
            .map(|rule| {
                let verdict = self.engine.evaluate(&rule.logic, &data, &value_sets);
                BoosterValidationResult { rule, verdict }
            })
            .collect())
    }
}

/// Recomputes booster notifications over all certificate groups.
///
/// One `run` reads the current groups, evaluates each person's merged
/// vaccination/recovery view, and writes the updated state back in a single
/// read-modify-write step. Re-running with unchanged inputs does not re-fire
/// notifications.
pub struct BoosterEngine {
    cert_repository: Arc<CertRepository>,
    validator: Arc<BoosterRulesValidator>,
}

impl BoosterEngine {
    /// Creates the engine.
    pub fn new(cert_repository: Arc<CertRepository>, validator: Arc<BoosterRulesValidator>) -> Self {
        Self {
            cert_repository,
            validator,
        }
    }

    /// Runs one recomputation pass over every certificate group.
    ///
    /// # Errors
    ///
    /// Returns an error when evaluation or the store update fails; no
    /// partial state is written in that case.
    pub async fn run(&self, clock: DateTime<Utc>) -> Result<(), CertError> {
        let groups = self.cert_repository.snapshot().await;
        let mut outcomes: Vec<(GroupedCertificatesId, BoosterNotification)> = Vec::new();
        for group in &groups.certificates {
            let notification = self.notification_for(group, clock).await?;
            outcomes.push((group.id.clone(), notification));
        }

        // Apply against the latest snapshot; groups deleted meanwhile are
        // skipped.
        self.cert_repository
            .update(|list| {
                for (id, notification) in outcomes {
                    if let Some(group) = list.get_mut(&id) {
                        apply_notification(group, notification);
                    }
                }
            })
            .await?;
        Ok(())
    }

    async fn notification_for(
        &self,
        group: &GroupedCertificates,
        clock: DateTime<Utc>,
    ) -> Result<BoosterNotification, CertError> {
        let latest_vaccination = group.latest_vaccination();
        let latest_recovery = group.latest_recovery();
        match (latest_vaccination, latest_recovery) {
            (Some(vaccination), Some(recovery)) => {
                // Merged view: the vaccination certificate with the latest
                // recovery attached as auxiliary evidence.
                let mut merged = vaccination.clone();
                merged.recoveries = vec![recovery.clone()];
                self.first_passed(&merged, clock).await
            }
            (Some(vaccination), None) => self.first_passed(vaccination, clock).await,
            _ => Ok(BoosterNotification::failed()),
        }
    }

    /// Evaluates the candidate rules and takes the first PASSED one.
    async fn first_passed(
        &self,
        certificate: &CovCertificate,
        clock: DateTime<Utc>,
    ) -> Result<BoosterNotification, CertError> {
        let results = self.validator.validate(certificate, clock).await?;
        Ok(results
            .into_iter()
            .find(|result| result.verdict == Verdict::Passed)
            .map_or(BoosterNotification::failed(), |result| {
                BoosterNotification {
                    result: BoosterResult::Passed,
                    description_en: result.rule.description_for("en").map(str::to_string),
                    description_de: result.rule.description_for("de").map(str::to_string),
                    rule_id: Some(result.rule.identifier),
                }
            }))
    }
}

fn apply_notification(group: &mut GroupedCertificates, notification: BoosterNotification) {
    let fires_new_notification = notification.result == BoosterResult::Passed
        && notification
            .rule_id
            .as_ref()
            .is_some_and(|rule_id| !group.booster_notification_rule_ids.contains(rule_id));

    if fires_new_notification {
        if let Some(rule_id) = notification.rule_id.clone() {
            group.booster_notification_rule_ids.push(rule_id);
        }
        group.has_seen_booster_notification = false;
        group.has_seen_booster_detail_notification = false;
    }
    group.booster_notification = notification;
}
