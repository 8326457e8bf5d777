//! Remote data sources for the rule, value-set, booster-rule and country
//! distribution endpoints.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{BoosterRule, CovRule, RuleCertificateType, RuleDescription, RuleType, ValueSet};
use crate::error::CertError;
use crate::http_request::Request;

/// One entry of the rule identifier manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleIdentifier {
    /// Rule identifier.
    pub identifier: String,
    /// Rule version.
    pub version: String,
    /// Country the rule belongs to.
    pub country: String,
    /// Content fingerprint of the rule body.
    pub hash: String,
}

/// One entry of the booster-rule identifier manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterRuleIdentifier {
    /// Rule identifier.
    pub identifier: String,
    /// Rule version.
    pub version: String,
    /// Content fingerprint of the rule body.
    pub hash: String,
}

/// One entry of the value-set identifier manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSetIdentifier {
    /// Value-set identifier.
    pub id: String,
    /// Content fingerprint of the value-set body.
    pub hash: String,
}

/// A rule body as served by the distribution endpoint (schema key casing).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CovRuleRemote {
    /// Rule identifier.
    pub identifier: String,
    /// Acceptance or invalidation.
    #[serde(rename = "Type")]
    pub rule_type: RuleType,
    /// Country the rule belongs to.
    pub country: String,
    /// Optional sub-national region.
    #[serde(default)]
    pub region: Option<String>,
    /// Rule version.
    pub version: String,
    /// Certificate schema version.
    pub schema_version: String,
    /// Evaluation engine name.
    pub engine: String,
    /// Evaluation engine version.
    pub engine_version: String,
    /// Certificate kinds the rule applies to.
    pub certificate_type: RuleCertificateType,
    /// Localized descriptions.
    #[serde(rename = "Description", default)]
    pub descriptions: Vec<RuleDescription>,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window.
    pub valid_to: DateTime<Utc>,
    /// Certificate fields the rule expression reads.
    #[serde(default)]
    pub affected_fields: Vec<String>,
    /// The declarative rule expression.
    pub logic: serde_json::Value,
}

impl CovRuleRemote {
    /// Attaches the manifest `hash` and converts into the local model.
    #[must_use]
    pub fn into_rule(self, hash: String) -> CovRule {
        CovRule {
            identifier: self.identifier,
            rule_type: self.rule_type,
            country: self.country,
            region: self.region,
            version: self.version,
            schema_version: self.schema_version,
            engine: self.engine,
            engine_version: self.engine_version,
            certificate_type: self.certificate_type,
            descriptions: self.descriptions,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            affected_fields: self.affected_fields,
            logic: self.logic,
            hash,
        }
    }
}

/// A booster-rule body as served by the distribution endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoosterRuleRemote {
    /// Rule identifier.
    pub identifier: String,
    /// Rule version.
    pub version: String,
    /// Certificate schema version.
    pub schema_version: String,
    /// Evaluation engine name.
    pub engine: String,
    /// Evaluation engine version.
    pub engine_version: String,
    /// Certificate kinds the rule applies to.
    pub certificate_type: RuleCertificateType,
    /// Localized descriptions.
    #[serde(rename = "Description", default)]
    pub descriptions: Vec<RuleDescription>,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window.
    pub valid_to: DateTime<Utc>,
    /// Certificate fields the rule expression reads.
    #[serde(default)]
    pub affected_fields: Vec<String>,
    /// The declarative rule expression.
    pub logic: serde_json::Value,
}

impl BoosterRuleRemote {
    /// Attaches the manifest `hash` and converts into the local model.
    #[must_use]
    pub fn into_rule(self, hash: String) -> BoosterRule {
        BoosterRule {
            identifier: self.identifier,
            version: self.version,
            schema_version: self.schema_version,
            engine: self.engine,
            engine_version: self.engine_version,
            certificate_type: self.certificate_type,
            descriptions: self.descriptions,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            affected_fields: self.affected_fields,
            logic: self.logic,
            hash,
        }
    }
}

/// A value-set body as served by the distribution endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ValueSetRemote {
    /// Value-set identifier.
    #[serde(rename = "valueSetId")]
    pub value_set_id: String,
    /// Release date of the value set.
    #[serde(rename = "valueSetDate")]
    pub value_set_date: NaiveDate,
    /// Mapping of code to display metadata.
    #[serde(rename = "valueSetValues")]
    pub value_set_values: serde_json::Value,
}

impl ValueSetRemote {
    /// Attaches the manifest `hash` and converts into the local model.
    #[must_use]
    pub fn into_value_set(self, hash: String) -> ValueSet {
        ValueSet {
            id: self.value_set_id,
            date: self.value_set_date,
            values: self.value_set_values,
            hash,
        }
    }
}

/// Client for the business-rule endpoints.
pub struct RulesRemoteDataSource {
    request: Arc<Request>,
    base_url: String,
}

impl RulesRemoteDataSource {
    /// Creates a data source against `base_url` (scheme + host).
    pub fn new(request: Arc<Request>, base_url: impl Into<String>) -> Self {
        Self {
            request,
            base_url: base_url.into(),
        }
    }

    /// Fetches the lightweight identifier/hash manifest.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure.
    pub async fn rule_identifiers(&self) -> Result<Vec<RuleIdentifier>, CertError> {
        self.request
            .get_json(&format!("{}/rules", self.base_url))
            .await
    }

    /// Fetches one full rule body.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure.
    pub async fn rule(&self, country: &str, hash: &str) -> Result<CovRuleRemote, CertError> {
        self.request
            .get_json(&format!("{}/rules/{country}/{hash}", self.base_url))
            .await
    }
}

/// Client for the value-set endpoints.
pub struct ValueSetsRemoteDataSource {
    request: Arc<Request>,
    base_url: String,
}

impl ValueSetsRemoteDataSource {
    /// Creates a data source against `base_url` (scheme + host).
    pub fn new(request: Arc<Request>, base_url: impl Into<String>) -> Self {
        Self {
            request,
            base_url: base_url.into(),
        }
    }

    /// Fetches the lightweight identifier/hash manifest.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure.
    pub async fn value_set_identifiers(&self) -> Result<Vec<ValueSetIdentifier>, CertError> {
        self.request
            .get_json(&format!("{}/valuesets", self.base_url))
            .await
    }

    /// Fetches one full value-set body.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure.
    pub async fn value_set(&self, hash: &str) -> Result<ValueSetRemote, CertError> {
        self.request
            .get_json(&format!("{}/valuesets/{hash}", self.base_url))
            .await
    }
}

/// Client for the booster-rule endpoints, served from a distinct host.
pub struct BoosterRulesRemoteDataSource {
    request: Arc<Request>,
    base_url: String,
}

impl BoosterRulesRemoteDataSource {
    /// Creates a data source against `base_url` (scheme + host).
    pub fn new(request: Arc<Request>, base_url: impl Into<String>) -> Self {
        Self {
            request,
            base_url: base_url.into(),
        }
    }

    /// Fetches the lightweight identifier/hash manifest.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure.
    pub async fn rule_identifiers(&self) -> Result<Vec<BoosterRuleIdentifier>, CertError> {
        self.request
            .get_json(&format!("{}/rules", self.base_url))
            .await
    }

    /// Fetches one full booster-rule body.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure.
    pub async fn rule(&self, hash: &str) -> Result<BoosterRuleRemote, CertError> {
        self.request
            .get_json(&format!("{}/rules/{hash}", self.base_url))
            .await
    }
}

/// Client for the country-list endpoint.
pub struct CountriesRemoteDataSource {
    request: Arc<Request>,
    base_url: String,
}

impl CountriesRemoteDataSource {
    /// Creates a data source against `base_url` (scheme + host).
    pub fn new(request: Arc<Request>, base_url: impl Into<String>) -> Self {
        Self {
            request,
            base_url: base_url.into(),
        }
    }

    /// Fetches the full country-code list.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure.
    pub async fn countries(&self) -> Result<Vec<String>, CertError> {
        self.request
            .get_json(&format!("{}/countrylist", self.base_url))
            .await
    }
}
