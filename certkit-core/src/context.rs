//! Explicit dependency wiring. Replaces ambient dependency containers: the
//! context is constructed once at process start from a [`SdkConfig`] plus
//! the injected capabilities, and passed by reference into the host layers.

use std::sync::Arc;

use crate::check::CertificateChecker;
use crate::dsc::{DscListDecoder, DscListService, DscRepository};
use crate::error::CertError;
use crate::grouped::CertRepository;
use crate::http_request::Request;
use crate::qr::QrCoder;
use crate::rules::booster::{BoosterEngine, BoosterRulesValidator};
use crate::rules::local::{CountryStore, LocalStore};
use crate::rules::remote::{
    BoosterRulesRemoteDataSource, CountriesRemoteDataSource, RulesRemoteDataSource,
    ValueSetsRemoteDataSource,
};
use crate::rules::sync::{
    BoosterRulesRepository, CountriesRepository, RulesRepository, ValueSetsRepository,
};
use crate::rules::validator::{CertLogicEngine, RulesValidator};
use crate::rules::{BoosterRule, CovRule, ValueSet};
use crate::storage::{KeyValueStore, UpdateStore};
use crate::trust::{DscList, TrustStore};
use crate::validator::CertValidator;
use crate::worker::{
    BoosterCheckWorker, BoosterRulesWorker, CountriesWorker, DscListWorker, RulesWorker,
    ValueSetsWorker,
};

/// Static configuration for the SDK: service hosts, the pinned trust
/// anchor and the bundled offline seed data.
pub struct SdkConfig {
    /// Base URL of the trust-list service.
    pub trust_service_url: String,
    /// Base URL of the rule/value-set/country distribution service.
    pub rules_service_url: String,
    /// Base URL of the booster-rule distribution service.
    pub booster_rules_service_url: String,
    /// Pinned public key (DER `SubjectPublicKeyInfo`) the signed trust list
    /// is verified against. Embedded at build time.
    pub trust_anchor_public_key: Vec<u8>,
    /// Trust list shipped with the build, used before the first sync.
    pub bundled_dsc_list: DscList,
    /// Rules shipped with the build.
    pub bundled_rules: Vec<CovRule>,
    /// Value sets shipped with the build.
    pub bundled_value_sets: Vec<ValueSet>,
    /// Booster rules shipped with the build.
    pub bundled_booster_rules: Vec<BoosterRule>,
    /// Country codes shipped with the build.
    pub bundled_countries: Vec<String>,
}

/// The constructed dependency graph.
pub struct SdkContext {
    /// Trusted signer keys.
    pub trust_store: Arc<TrustStore>,
    /// Token validator.
    pub cert_validator: Arc<CertValidator>,
    /// QR decoding pipeline.
    pub qr_coder: Arc<QrCoder>,
    /// Trust-list persistence.
    pub dsc_repository: Arc<DscRepository>,
    /// Trust-list download service.
    pub dsc_list_service: Arc<DscListService>,
    /// Trust-list signature verification.
    pub dsc_list_decoder: Arc<DscListDecoder>,
    /// Business-rule synchronization and lookup.
    pub rules_repository: Arc<RulesRepository>,
    /// Value-set synchronization and lookup.
    pub value_sets_repository: Arc<ValueSetsRepository>,
    /// Booster-rule synchronization and lookup.
    pub booster_rules_repository: Arc<BoosterRulesRepository>,
    /// Country-list synchronization and lookup.
    pub countries_repository: Arc<CountriesRepository>,
    /// Business-rule selection and evaluation.
    pub rules_validator: Arc<RulesValidator>,
    /// Booster-rule evaluation.
    pub booster_rules_validator: Arc<BoosterRulesValidator>,
    /// Booster notification recomputation.
    pub booster_engine: Arc<BoosterEngine>,
    /// Stored certificate groups.
    pub cert_repository: Arc<CertRepository>,
    /// Scan-flow orchestration.
    pub certificate_checker: Arc<CertificateChecker>,
    /// Last-sync timestamps.
    pub updates: Arc<UpdateStore>,
}

impl SdkContext {
    /// Builds the full graph, restores persisted snapshots and seeds the
    /// stores with bundled data where nothing is persisted yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the pinned trust anchor or the bundled trust
    /// list is invalid, or persisted snapshots cannot be read.
    pub async fn new(
        config: SdkConfig,
        store: Arc<dyn KeyValueStore>,
        certlogic: Arc<dyn CertLogicEngine>,
    ) -> Result<Self, CertError> {
        let request = Arc::new(Request::new());
        let updates = Arc::new(UpdateStore::new(store.clone()));

        let trust_store = Arc::new(TrustStore::empty());
        let dsc_list_decoder = Arc::new(DscListDecoder::new(&config.trust_anchor_public_key)?);
        let dsc_list_service = Arc::new(DscListService::new(
            request.clone(),
            config.trust_service_url,
        ));
        let dsc_repository = Arc::new(DscRepository::new(
            store.clone(),
            updates.clone(),
            trust_store.clone(),
        ));
        dsc_repository.initialize(&config.bundled_dsc_list)?;

        let cert_validator = Arc::new(CertValidator::new(trust_store.clone()));
        let qr_coder = Arc::new(QrCoder::new(cert_validator.clone()));

        let rules_local = Arc::new(LocalStore::<CovRule>::new("rules", store.clone()));
        rules_local.restore().await?;
        let rules_repository = Arc::new(RulesRepository::new(
            Arc::new(RulesRemoteDataSource::new(
                request.clone(),
                config.rules_service_url.clone(),
            )),
            rules_local,
            updates.clone(),
        ));
        rules_repository.prepopulate(config.bundled_rules).await?;

        let value_sets_local = Arc::new(LocalStore::<ValueSet>::new("value_sets", store.clone()));
        value_sets_local.restore().await?;
        let value_sets_repository = Arc::new(ValueSetsRepository::new(
            Arc::new(ValueSetsRemoteDataSource::new(
                request.clone(),
                config.rules_service_url.clone(),
            )),
            value_sets_local,
            updates.clone(),
        ));
        value_sets_repository
            .prepopulate(config.bundled_value_sets)
            .await?;

        let booster_local = Arc::new(LocalStore::<BoosterRule>::new(
            "booster_rules",
            store.clone(),
        ));
        booster_local.restore().await?;
        let booster_rules_repository = Arc::new(BoosterRulesRepository::new(
            Arc::new(BoosterRulesRemoteDataSource::new(
                request.clone(),
                config.booster_rules_service_url,
            )),
            booster_local,
            updates.clone(),
        ));
        booster_rules_repository
            .prepopulate(config.bundled_booster_rules)
            .await?;

        let countries_local = Arc::new(CountryStore::new(store.clone()));
        countries_local.restore().await?;
        let countries_repository = Arc::new(CountriesRepository::new(
            Arc::new(CountriesRemoteDataSource::new(
                request,
                config.rules_service_url,
            )),
            countries_local,
            updates.clone(),
        ));
        countries_repository
            .prepopulate(config.bundled_countries)
            .await?;

        let rules_validator = Arc::new(RulesValidator::new(
            rules_repository.clone(),
            value_sets_repository.clone(),
            certlogic.clone(),
        ));
        let booster_rules_validator = Arc::new(BoosterRulesValidator::new(
            booster_rules_repository.clone(),
            value_sets_repository.clone(),
            certlogic,
        ));

        let cert_repository = Arc::new(CertRepository::new(store)?);
        let booster_engine = Arc::new(BoosterEngine::new(
            cert_repository.clone(),
            booster_rules_validator.clone(),
        ));
        let certificate_checker = Arc::new(CertificateChecker::new(
            qr_coder.clone(),
            rules_validator.clone(),
        ));

        Ok(Self {
            trust_store,
            cert_validator,
            qr_coder,
            dsc_repository,
            dsc_list_service,
            dsc_list_decoder,
            rules_repository,
            value_sets_repository,
            booster_rules_repository,
            countries_repository,
            rules_validator,
            booster_rules_validator,
            booster_engine,
            cert_repository,
            certificate_checker,
            updates,
        })
    }

    /// The worker set to hand to the host scheduler.
    #[must_use]
    pub fn workers(&self) -> SdkWorkers {
        SdkWorkers {
            rules: RulesWorker::new(self.rules_repository.clone()),
            value_sets: ValueSetsWorker::new(self.value_sets_repository.clone()),
            booster_rules: BoosterRulesWorker::new(self.booster_rules_repository.clone()),
            countries: CountriesWorker::new(self.countries_repository.clone()),
            dsc_list: DscListWorker::new(
                self.dsc_list_service.clone(),
                self.dsc_list_decoder.clone(),
                self.dsc_repository.clone(),
            ),
            booster_check: BoosterCheckWorker::new(self.booster_engine.clone()),
        }
    }
}

/// The periodic workers of the SDK.
pub struct SdkWorkers {
    /// Business-rule sync.
    pub rules: RulesWorker,
    /// Value-set sync.
    pub value_sets: ValueSetsWorker,
    /// Booster-rule sync.
    pub booster_rules: BoosterRulesWorker,
    /// Country-list sync.
    pub countries: CountriesWorker,
    /// Trust-list refresh.
    pub dsc_list: DscListWorker,
    /// Booster notification recomputation.
    pub booster_check: BoosterCheckWorker,
}
