//! Per-person certificate groups and the repository persisting them,
//! including the booster notification state owned by the booster engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::RwLock;

use crate::cert::{CovCertificate, Recovery};
use crate::storage::{CborStore, KeyValueStore, StorageError};

/// Identity of one person's certificate group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupedCertificatesId {
    /// Standardized holder name.
    pub name: String,
    /// Holder date of birth.
    pub birth_date: String,
}

impl GroupedCertificatesId {
    /// Derives the group identity for a certificate.
    #[must_use]
    pub fn for_certificate(certificate: &CovCertificate) -> Self {
        Self {
            name: certificate.name.standardized(),
            birth_date: certificate.birth_date.trim().to_string(),
        }
    }
}

/// Result of a booster evaluation for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum BoosterResult {
    /// A booster rule passed.
    Passed,
    /// No booster rule passed.
    Failed,
}

/// The booster notification attached to a certificate group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterNotification {
    /// Evaluation outcome.
    pub result: BoosterResult,
    /// English description of the passed rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_en: Option<String>,
    /// German description of the passed rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_de: Option<String>,
    /// Identifier of the passed rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl BoosterNotification {
    /// A failed evaluation without a rule.
    #[must_use]
    pub const fn failed() -> Self {
        Self {
            result: BoosterResult::Failed,
            description_en: None,
            description_de: None,
            rule_id: None,
        }
    }
}

impl Default for BoosterNotification {
    fn default() -> Self {
        Self::failed()
    }
}

/// The certificates of one person plus persisted booster state.
///
/// The "seen" flags belong to the UI layer but are persisted here alongside
/// the notification they refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedCertificates {
    /// Group identity.
    pub id: GroupedCertificatesId,
    /// All certificates of this person.
    pub certificates: Vec<CovCertificate>,
    /// Latest booster evaluation outcome.
    #[serde(default)]
    pub booster_notification: BoosterNotification,
    /// Identifiers of booster rules that already fired a notification.
    #[serde(default)]
    pub booster_notification_rule_ids: Vec<String>,
    /// Whether the current notification was seen on the overview.
    #[serde(default)]
    pub has_seen_booster_notification: bool,
    /// Whether the current notification was seen on the detail page.
    #[serde(default)]
    pub has_seen_booster_detail_notification: bool,
}

impl GroupedCertificates {
    /// Creates a group from its first certificate.
    #[must_use]
    pub fn new(certificate: CovCertificate) -> Self {
        Self {
            id: GroupedCertificatesId::for_certificate(&certificate),
            certificates: vec![certificate],
            booster_notification: BoosterNotification::failed(),
            booster_notification_rule_ids: Vec::new(),
            has_seen_booster_notification: false,
            has_seen_booster_detail_notification: false,
        }
    }

    /// The certificate carrying the latest vaccination, by occurrence date.
    #[must_use]
    pub fn latest_vaccination(&self) -> Option<&CovCertificate> {
        self.certificates
            .iter()
            .filter_map(|certificate| {
                certificate
                    .vaccinations
                    .first()
                    .map(|vaccination| (vaccination.occurrence, certificate))
            })
            .max_by_key(|(occurrence, _)| *occurrence)
            .map(|(_, certificate)| certificate)
    }

    /// The latest recovery record, by first-result date.
    #[must_use]
    pub fn latest_recovery(&self) -> Option<&Recovery> {
        self.certificates
            .iter()
            .flat_map(|certificate| certificate.recoveries.iter())
            .max_by_key(|recovery| recovery.first_result)
    }
}

/// All certificate groups known to the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupedCertificatesList {
    /// The groups, one per person.
    pub certificates: Vec<GroupedCertificates>,
}

impl GroupedCertificatesList {
    /// The group with the given identity, if present.
    #[must_use]
    pub fn get_mut(&mut self, id: &GroupedCertificatesId) -> Option<&mut GroupedCertificates> {
        self.certificates.iter_mut().find(|group| &group.id == id)
    }

    /// Adds a certificate to its person's group, creating the group when
    /// needed. Returns the group identity.
    pub fn add_certificate(&mut self, certificate: CovCertificate) -> GroupedCertificatesId {
        let id = GroupedCertificatesId::for_certificate(&certificate);
        match self.certificates.iter().position(|group| group.id == id) {
            Some(index) => self.certificates[index].certificates.push(certificate),
            None => self.certificates.push(GroupedCertificates::new(certificate)),
        }
        id
    }

    /// Removes a whole group.
    pub fn remove_group(&mut self, id: &GroupedCertificatesId) {
        self.certificates.retain(|group| &group.id != id);
    }
}

/// Persisted store of all certificate groups.
///
/// Every mutation is a read-modify-write against the latest snapshot under
/// the write lock, so periodic recomputation and user-triggered edits cannot
/// race destructively.
pub struct CertRepository {
    persistence: CborStore<GroupedCertificatesList>,
    certs: RwLock<GroupedCertificatesList>,
}

impl CertRepository {
    /// Creates the repository, restoring the persisted list if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted snapshot cannot be read.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let persistence = CborStore::new(store, "grouped_certificates");
        let certs = persistence.get()?.unwrap_or_default();
        Ok(Self {
            persistence,
            certs: RwLock::new(certs),
        })
    }

    /// A copy of the current list.
    pub async fn snapshot(&self) -> GroupedCertificatesList {
        self.certs.read().await.clone()
    }

    /// Adds a certificate and persists the updated list.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted.
    pub async fn add_certificate(
        &self,
        certificate: CovCertificate,
    ) -> Result<GroupedCertificatesId, StorageError> {
        let mut id = None;
        self.update(|list| {
            id = Some(list.add_certificate(certificate));
        })
        .await?;
        Ok(id.unwrap_or(GroupedCertificatesId {
            name: String::new(),
            birth_date: String::new(),
        }))
    }

    /// Applies `mutate` to the latest list state and persists the result in
    /// one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted.
    pub async fn update<F>(&self, mutate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut GroupedCertificatesList),
    {
        let mut certs = self.certs.write().await;
        mutate(&mut certs);
        self.persistence.put(&certs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::cert::Vaccination;
    use crate::storage::InMemoryStore;

    fn cert_with_vaccination(fnt: &str, dob: &str, date: &str) -> CovCertificate {
        let mut certificate: CovCertificate = serde_json::from_str(&format!(
            r#"{{"ver": "1.3.0", "nam": {{"fnt": "{fnt}"}}, "dob": "{dob}"}}"#
        ))
        .expect("decode");
        certificate.vaccinations.push(Vaccination {
            target_disease: "840539006".to_string(),
            vaccine_code: "1119349007".to_string(),
            product: "EU/1/20/1528".to_string(),
            manufacturer: "ORG-100030215".to_string(),
            dose_number: 2,
            total_serial_doses: 2,
            occurrence: date.parse().unwrap(),
            country: "DE".to_string(),
            certificate_issuer: "RKI".to_string(),
            id: format!("URN:UVCI:01DE/{fnt}/{date}"),
        });
        certificate
    }

    #[test]
    fn test_grouping_by_person() {
        let mut list = GroupedCertificatesList::default();
        let id_a = list.add_certificate(cert_with_vaccination("MUSTERMANN", "1964-08-12", "2021-05-01"));
        let id_b = list.add_certificate(cert_with_vaccination("MUSTERMANN", "1964-08-12", "2021-11-01"));
        let id_c = list.add_certificate(cert_with_vaccination("DOE", "1990-01-01", "2021-06-01"));

        assert_eq!(id_a, id_b);
        assert_ne!(id_a, id_c);
        assert_eq!(list.certificates.len(), 2);
        assert_eq!(list.get_mut(&id_a).unwrap().certificates.len(), 2);
    }

    #[test]
    fn test_latest_vaccination_by_occurrence() {
        let mut list = GroupedCertificatesList::default();
        let id = list.add_certificate(cert_with_vaccination("MUSTERMANN", "1964-08-12", "2021-05-01"));
        list.add_certificate(cert_with_vaccination("MUSTERMANN", "1964-08-12", "2021-11-01"));

        let group = list.get_mut(&id).unwrap();
        let latest = group.latest_vaccination().expect("latest");
        assert_eq!(
            latest.vaccinations[0].occurrence,
            NaiveDate::from_ymd_opt(2021, 11, 1).unwrap()
        );
        assert!(group.latest_recovery().is_none());
    }

    #[tokio::test]
    async fn test_repository_round_trip() {
        let backend: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        let repository = CertRepository::new(backend.clone()).expect("create");
        let id = repository
            .add_certificate(cert_with_vaccination("MUSTERMANN", "1964-08-12", "2021-05-01"))
            .await
            .expect("add");

        // Reopening the repository restores the persisted groups.
        let reopened = CertRepository::new(backend).expect("reopen");
        let snapshot = reopened.snapshot().await;
        assert_eq!(snapshot.certificates.len(), 1);
        assert_eq!(snapshot.certificates[0].id, id);
    }
}
