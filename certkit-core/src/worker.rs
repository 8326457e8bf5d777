//! Background-job entry points. The host's scheduler decides cadence and
//! backoff; each worker only defines what one idempotent `run` accomplishes.
//! Failures are logged and reported as retryable, never surfaced as
//! certificate-validation failures.

use std::sync::Arc;

use chrono::Utc;
use log::error;

use crate::dsc::{DscListDecoder, DscListService, DscRepository};
use crate::rules::booster::BoosterEngine;
use crate::rules::sync::{
    BoosterRulesRepository, CountriesRepository, RulesRepository, ValueSetsRepository,
};

/// What the scheduler should do after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The run completed; schedule the next regular run.
    Success,
    /// The run failed; retry with the platform's backoff.
    Retry,
}

/// Synchronizes business rules.
pub struct RulesWorker {
    repository: Arc<RulesRepository>,
}

impl RulesWorker {
    /// Creates the worker.
    pub fn new(repository: Arc<RulesRepository>) -> Self {
        Self { repository }
    }

    /// Runs one rules sync.
    pub async fn run(&self) -> WorkerOutcome {
        match self.repository.load_rules().await {
            Ok(()) => WorkerOutcome::Success,
            Err(err) => {
                error!("rules sync failed: {err}");
                WorkerOutcome::Retry
            }
        }
    }
}

/// Synchronizes value sets.
pub struct ValueSetsWorker {
    repository: Arc<ValueSetsRepository>,
}

impl ValueSetsWorker {
    /// Creates the worker.
    pub fn new(repository: Arc<ValueSetsRepository>) -> Self {
        Self { repository }
    }

    /// Runs one value-set sync.
    pub async fn run(&self) -> WorkerOutcome {
        match self.repository.load_value_sets().await {
            Ok(()) => WorkerOutcome::Success,
            Err(err) => {
                error!("value-set sync failed: {err}");
                WorkerOutcome::Retry
            }
        }
    }
}

/// Synchronizes booster rules.
pub struct BoosterRulesWorker {
    repository: Arc<BoosterRulesRepository>,
}

impl BoosterRulesWorker {
    /// Creates the worker.
    pub fn new(repository: Arc<BoosterRulesRepository>) -> Self {
        Self { repository }
    }

    /// Runs one booster-rule sync.
    pub async fn run(&self) -> WorkerOutcome {
        match self.repository.load_booster_rules().await {
            Ok(()) => WorkerOutcome::Success,
            Err(err) => {
                error!("booster-rule sync failed: {err}");
                WorkerOutcome::Retry
            }
        }
    }
}

/// Synchronizes the country list.
pub struct CountriesWorker {
    repository: Arc<CountriesRepository>,
}

impl CountriesWorker {
    /// Creates the worker.
    pub fn new(repository: Arc<CountriesRepository>) -> Self {
        Self { repository }
    }

    /// Runs one country-list sync.
    pub async fn run(&self) -> WorkerOutcome {
        match self.repository.load_countries().await {
            Ok(()) => WorkerOutcome::Success,
            Err(err) => {
                error!("country-list sync failed: {err}");
                WorkerOutcome::Retry
            }
        }
    }
}

/// Fetches, verifies and installs the signed trust list.
pub struct DscListWorker {
    service: Arc<DscListService>,
    decoder: Arc<DscListDecoder>,
    repository: Arc<DscRepository>,
}

impl DscListWorker {
    /// Creates the worker.
    pub fn new(
        service: Arc<DscListService>,
        decoder: Arc<DscListDecoder>,
        repository: Arc<DscRepository>,
    ) -> Self {
        Self {
            service,
            decoder,
            repository,
        }
    }

    /// Runs one trust-list refresh. A failed signature check leaves the
    /// previous list in effect.
    pub async fn run(&self) -> WorkerOutcome {
        let result = async {
            let document = self.service.fetch_trust_list().await?;
            let list = self.decoder.decode_dsc_list(&document)?;
            self.repository.replace(&list)
        }
        .await;
        match result {
            Ok(()) => WorkerOutcome::Success,
            Err(err) => {
                error!("trust-list sync failed: {err}");
                WorkerOutcome::Retry
            }
        }
    }
}

/// Recomputes booster notifications.
pub struct BoosterCheckWorker {
    engine: Arc<BoosterEngine>,
}

impl BoosterCheckWorker {
    /// Creates the worker.
    pub fn new(engine: Arc<BoosterEngine>) -> Self {
        Self { engine }
    }

    /// Runs one booster recomputation pass.
    pub async fn run(&self) -> WorkerOutcome {
        match self.engine.run(Utc::now()).await {
            Ok(()) => WorkerOutcome::Success,
            Err(err) => {
                error!("booster check failed: {err}");
                WorkerOutcome::Retry
            }
        }
    }
}
