//! Service facade and its builder.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::canonical::KeyCase;
use crate::config::{AppConfig, StoreConfig};
use crate::error::Result;
use crate::external::{DatasourceProvider, DeploymentProvider, Predictor, Providers, Trainer};
use crate::history::HistoryLedger;
use crate::lifecycle::VersionLifecycle;
use crate::registry::{AlgorithmRegistry, DatasourceRegistry, ModelRegistry};
use crate::scheduler::SchedulerManager;
use crate::store::Store;

/// Entry point to the model lifecycle.
///
/// Cloning is cheap; every clone shares one store and one set of providers.
#[derive(Clone)]
pub struct MlService {
    datasources: DatasourceRegistry,
    models: ModelRegistry,
    algorithms: AlgorithmRegistry,
    versions: VersionLifecycle,
    schedulers: SchedulerManager,
    history: HistoryLedger,
}

impl MlService {
    pub fn builder() -> MlServiceBuilder {
        MlServiceBuilder::new()
    }

    pub fn datasources(&self) -> &DatasourceRegistry {
        &self.datasources
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn algorithms(&self) -> &AlgorithmRegistry {
        &self.algorithms
    }

    pub fn versions(&self) -> &VersionLifecycle {
        &self.versions
    }

    pub fn schedulers(&self) -> &SchedulerManager {
        &self.schedulers
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }
}

/// Builder for configuring an [`MlService`].
///
/// # Example
///
/// ```rust,ignore
/// use maio_core::{KeyCase, MlService};
///
/// let service = MlService::builder()
///     .data_dir("/var/lib/maio")
///     .key_case(KeyCase::Preserve)
///     .build()?;
/// ```
pub struct MlServiceBuilder {
    db_path: Option<PathBuf>,
    providers: Providers,
    key_case: KeyCase,
    default_user_id: i64,
}

impl Default for MlServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MlServiceBuilder {
    /// In-memory store and in-process providers until told otherwise.
    pub fn new() -> Self {
        Self {
            db_path: None,
            providers: Providers::in_memory(),
            key_case: KeyCase::default(),
            default_user_id: AppConfig::DEFAULT_USER_ID,
        }
    }

    /// Store the database at this exact path.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Store the database under `dir` with the default file name.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.db_path = Some(dir.into().join(StoreConfig::DB_FILE_NAME));
        self
    }

    pub fn providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }

    pub fn datasources(mut self, datasources: Arc<dyn DatasourceProvider>) -> Self {
        self.providers.datasources = datasources;
        self
    }

    pub fn trainer(mut self, trainer: Arc<dyn Trainer>) -> Self {
        self.providers.trainer = trainer;
        self
    }

    pub fn predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.providers.predictor = predictor;
        self
    }

    pub fn deployer(mut self, deployer: Arc<dyn DeploymentProvider>) -> Self {
        self.providers.deployer = deployer;
        self
    }

    /// How algorithm parameter keys compare.
    ///
    /// Default: [`KeyCase::Fold`]
    pub fn key_case(mut self, key_case: KeyCase) -> Self {
        self.key_case = key_case;
        self
    }

    /// Creator recorded when a request does not name one.
    pub fn default_user_id(mut self, user_id: i64) -> Self {
        self.default_user_id = user_id;
        self
    }

    pub fn build(self) -> Result<MlService> {
        let store = match &self.db_path {
            Some(path) => Store::open_at(path)?,
            None => Store::open_in_memory()?,
        };
        let Providers {
            datasources,
            trainer,
            predictor,
            deployer,
        } = self.providers;

        let datasource_registry = DatasourceRegistry::new(datasources.clone());
        let algorithms = AlgorithmRegistry::new(store.clone(), self.key_case);
        let models = ModelRegistry::new(store.clone(), datasources.clone(), self.default_user_id);
        let versions = VersionLifecycle::new(
            store.clone(),
            algorithms.clone(),
            datasources.clone(),
            trainer,
            deployer,
        );
        let schedulers =
            SchedulerManager::new(store.clone(), datasources, predictor, self.default_user_id);
        schedulers.recover_interrupted()?;
        let history = HistoryLedger::new(store);

        match &self.db_path {
            Some(path) => info!("{} store at {}", AppConfig::APP_NAME, path.display()),
            None => info!("{} using an in-memory store", AppConfig::APP_NAME),
        }

        Ok(MlService {
            datasources: datasource_registry,
            models,
            algorithms,
            versions,
            schedulers,
            history,
        })
    }
}
