//! Version lifecycle manager.
//!
//! Owns the status state machine. Every transition is checked against
//! [`VersionStatus::transition`] inside one immediate transaction. Calls to
//! the trainer and the deployment provider happen after the commit; their
//! failures land on the version as `FAILED` instead of being returned.

use crate::error::{MaioError, Result};
use crate::external::{
    DatasourceProvider, DeploymentProvider, Trainer, TrainingOutcome, TrainingRequest,
};
use crate::models::{
    validate_name, validate_training_percentage, Deployment, ModelVersion, NewVersion,
    VersionAction, VersionPatch, VersionStatus,
};
use crate::registry::AlgorithmRegistry;
use crate::store::{self, time, Store};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct VersionLifecycle {
    store: Store,
    algorithms: AlgorithmRegistry,
    datasources: Arc<dyn DatasourceProvider>,
    trainer: Arc<dyn Trainer>,
    deployer: Arc<dyn DeploymentProvider>,
    /// Trainer calls in flight, keyed by version id.
    training: Arc<Mutex<HashMap<i64, JoinHandle<()>>>>,
}

impl VersionLifecycle {
    pub fn new(
        store: Store,
        algorithms: AlgorithmRegistry,
        datasources: Arc<dyn DatasourceProvider>,
        trainer: Arc<dyn Trainer>,
        deployer: Arc<dyn DeploymentProvider>,
    ) -> Self {
        Self {
            store,
            algorithms,
            datasources,
            trainer,
            deployer,
            training: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new version of a model in `PENDING`.
    ///
    /// The version number is reserved from the model's counter in the same
    /// transaction as the insert.
    pub async fn create(&self, input: NewVersion) -> Result<ModelVersion> {
        validate_name("name", &input.name)?;
        validate_training_percentage(input.training_percentage)?;
        if let Some(mapping) = &input.datasource_mapping {
            mapping.validate()?;
            self.require_datasource(mapping.datasource_id).await?;
        }

        let version = self.store.write(|tx| {
            if store::models::get(tx, input.model_id)?.is_none() {
                return Err(MaioError::not_found("model", input.model_id));
            }

            let (algorithm_id, parameters) = match &input.algorithm {
                Some(algo_ref) => {
                    let algorithm = match &algo_ref.parameters {
                        Some(params) => self.algorithms.resolve_or_fork_in(tx, algo_ref.id, params)?,
                        None => store::algorithms::get(tx, algo_ref.id)?
                            .ok_or_else(|| MaioError::not_found("algorithm", algo_ref.id))?,
                    };
                    (Some(algorithm.id), Some(algorithm.parameters))
                }
                None => (None, None),
            };

            let number = store::models::next_version_number(tx, input.model_id)?
                .ok_or_else(|| MaioError::not_found("model", input.model_id))?;

            let now = time::now();
            let mut version = ModelVersion {
                id: 0,
                model_id: input.model_id,
                name: input.name.clone(),
                description: input.description.clone(),
                version: number,
                status: VersionStatus::Pending,
                version_type: input.version_type.unwrap_or_default(),
                algorithm_id,
                parameters,
                datasource_mapping: input.datasource_mapping.clone(),
                training_percentage: input.training_percentage,
                artifact_ref: None,
                failure_reason: None,
                archived: false,
                created_at: now,
                updated_at: now,
            };
            version.id = store::versions::insert(tx, &version)?;
            store::models::touch(tx, input.model_id, &now)?;
            Ok(version)
        })?;

        info!(
            "Created version {} (#{}) of model {}",
            version.id, version.version, version.model_id
        );
        Ok(version)
    }

    pub fn get(&self, id: i64) -> Result<ModelVersion> {
        self.store.read(|conn| load(conn, id))
    }

    /// Versions of a model ordered by version number.
    pub fn list_by_model(&self, model_id: i64) -> Result<Vec<ModelVersion>> {
        self.store.read(|conn| {
            if store::models::get(conn, model_id)?.is_none() {
                return Err(MaioError::not_found("model", model_id));
            }
            store::versions::list_by_model(conn, model_id)
        })
    }

    /// The live deployment of a version, if any.
    pub fn get_deployment(&self, version_id: i64) -> Result<Option<Deployment>> {
        self.store.read(|conn| {
            load(conn, version_id)?;
            store::deployments::get(conn, version_id)
        })
    }

    /// Apply a patch. Never changes status.
    ///
    /// Training inputs are frozen while the version is training or deployed.
    pub async fn update(&self, id: i64, patch: VersionPatch) -> Result<ModelVersion> {
        if let Some(name) = &patch.name {
            validate_name("name", name)?;
        }
        validate_training_percentage(patch.training_percentage)?;
        if let Some(mapping) = &patch.datasource_mapping {
            mapping.validate()?;
            self.require_datasource(mapping.datasource_id).await?;
        }

        let version = self.store.write(|tx| {
            let mut version = load(tx, id)?;

            if patch.touches_training_inputs() && version.status.is_locked() {
                return Err(MaioError::InvalidState {
                    entity: "model version",
                    id,
                    message: format!("training inputs cannot change while {}", version.status),
                });
            }

            if let Some(name) = patch.name {
                version.name = name;
            }
            if let Some(description) = patch.description {
                version.description = Some(description);
            }
            if let Some(archived) = patch.archived {
                version.archived = archived;
            }
            if let Some(version_type) = patch.version_type {
                version.version_type = version_type;
            }
            if let Some(algo_ref) = patch.algorithm {
                let algorithm = match &algo_ref.parameters {
                    Some(params) => self.algorithms.resolve_or_fork_in(tx, algo_ref.id, params)?,
                    None => store::algorithms::get(tx, algo_ref.id)?
                        .ok_or_else(|| MaioError::not_found("algorithm", algo_ref.id))?,
                };
                version.algorithm_id = Some(algorithm.id);
                version.parameters = Some(algorithm.parameters);
            }
            if let Some(mapping) = patch.datasource_mapping {
                version.datasource_mapping = Some(mapping);
            }
            if let Some(pct) = patch.training_percentage {
                version.training_percentage = Some(pct);
            }

            version.updated_at = time::now();
            store::versions::save(tx, &version)?;
            Ok(version)
        })?;

        debug!("Updated version {}", id);
        Ok(version)
    }

    /// Move a version to `TRAINING` and hand it to the trainer.
    ///
    /// Returns once `TRAINING` is committed. The trainer runs on a background
    /// task; its answer moves the version to `TRAINED` or `FAILED`.
    pub async fn train(&self, id: i64) -> Result<ModelVersion> {
        let version = self.store.write(|tx| {
            let mut version = load(tx, id)?;
            version.status = version.status.transition(id, VersionAction::Train)?;
            version.artifact_ref = None;
            version.failure_reason = None;
            version.updated_at = time::now();
            store::versions::save(tx, &version)?;
            Ok(version)
        })?;
        info!("Version {} is TRAINING", id);

        let request = TrainingRequest {
            version_id: version.id,
            model_id: version.model_id,
            version_type: version.version_type,
            parameters: version.parameters.clone(),
            datasource_mapping: version.datasource_mapping.clone(),
            training_percentage: version.training_percentage,
        };
        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.run_training(request).await;
        });
        if let Ok(mut training) = self.training.lock() {
            training.retain(|_, task| !task.is_finished());
            training.insert(id, handle);
        }

        Ok(version)
    }

    async fn run_training(&self, request: TrainingRequest) {
        let id = request.version_id;
        let outcome = match self.trainer.submit_training(&request).await {
            Ok(TrainingOutcome::Accepted) => {
                debug!("Trainer accepted version {}", id);
                return;
            }
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Trainer call for version {} failed: {}", id, e);
                TrainingOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        if let Err(e) = self.complete_training(id, outcome) {
            error!("Could not record training result for version {}: {}", id, e);
        }
    }

    /// Record the trainer's result for a version in `TRAINING`.
    pub fn complete_training(&self, id: i64, outcome: TrainingOutcome) -> Result<ModelVersion> {
        let version = self.store.write(|tx| {
            let mut version = load(tx, id)?;
            if version.status != VersionStatus::Training {
                return Err(MaioError::InvalidTransition {
                    version_id: id,
                    from: version.status,
                    action: VersionAction::CompleteTraining,
                });
            }
            match outcome {
                TrainingOutcome::Trained { artifact_ref } => {
                    version.status = version
                        .status
                        .transition(id, VersionAction::CompleteTraining)?;
                    version.artifact_ref = Some(artifact_ref);
                }
                TrainingOutcome::Failed { reason } => {
                    version.status = version.status.transition(id, VersionAction::Fail)?;
                    version.failure_reason = Some(reason);
                }
                TrainingOutcome::Accepted => {
                    return Err(MaioError::validation(
                        "outcome",
                        "a completion must be TRAINED or FAILED",
                    ));
                }
            }
            version.updated_at = time::now();
            store::versions::save(tx, &version)?;
            Ok(version)
        })?;

        info!("Version {} is {}", id, version.status);
        Ok(version)
    }

    /// Wait for the background trainer call of a version, if one is running.
    pub async fn join_training(&self, id: i64) {
        let handle = self
            .training
            .lock()
            .ok()
            .and_then(|mut training| training.remove(&id));
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Training task for version {} panicked: {}", id, e);
            }
        }
    }

    /// Deploy a `TRAINED` version.
    ///
    /// The deployment record and `DEPLOYED` status are committed first, so a
    /// concurrent deploy sees them and fails. The provider is then asked for
    /// an endpoint; if it refuses, the version becomes `FAILED`.
    pub async fn deploy(&self, id: i64) -> Result<ModelVersion> {
        let version = self.store.write(|tx| {
            let mut version = load(tx, id)?;
            let next = version.status.transition(id, VersionAction::Deploy)?;
            if store::deployments::get(tx, id)?.is_some() {
                return Err(MaioError::AlreadyDeployed { version_id: id });
            }
            let now = time::now();
            store::deployments::insert(tx, id, &now)?;
            version.status = next;
            version.updated_at = now;
            store::versions::save(tx, &version)?;
            Ok(version)
        })?;
        info!("Version {} is DEPLOYED, provisioning endpoint", id);

        match self
            .deployer
            .deploy(id, version.artifact_ref.as_deref())
            .await
        {
            Ok(endpoint_ref) => {
                let recorded = self
                    .store
                    .write(|tx| store::deployments::set_endpoint(tx, id, &endpoint_ref))?;
                if !recorded {
                    // Undeployed while the provider was working.
                    warn!(
                        "Version {} lost its deployment before endpoint {} was recorded",
                        id, endpoint_ref
                    );
                    if let Err(e) = self.deployer.undeploy(&endpoint_ref).await {
                        warn!("Failed to release endpoint {}: {}", endpoint_ref, e);
                    }
                }
                self.get(id)
            }
            Err(e) => {
                warn!("Deployment of version {} failed: {}", id, e);
                self.fail_deployment(id, e.to_string())
            }
        }
    }

    fn fail_deployment(&self, id: i64, reason: String) -> Result<ModelVersion> {
        self.store.write(|tx| {
            let mut version = load(tx, id)?;
            if version.status != VersionStatus::Deployed {
                return Ok(version);
            }
            version.status = version.status.transition(id, VersionAction::Fail)?;
            version.failure_reason = Some(reason);
            version.updated_at = time::now();
            store::deployments::delete(tx, id)?;
            store::schedulers::disable_for_version(tx, id)?;
            store::versions::save(tx, &version)?;
            Ok(version)
        })
    }

    /// Undeploy a `DEPLOYED` version.
    ///
    /// Removes the deployment record and disables the version's schedulers in
    /// one transaction. Releasing the endpoint afterwards is best-effort.
    pub async fn undeploy(&self, id: i64) -> Result<ModelVersion> {
        let (version, endpoint_ref, disabled) = self.store.write(|tx| {
            let mut version = load(tx, id)?;
            version.status = version.status.transition(id, VersionAction::Undeploy)?;
            let endpoint_ref = store::deployments::get(tx, id)?.and_then(|d| d.endpoint_ref);
            store::deployments::delete(tx, id)?;
            let disabled = store::schedulers::disable_for_version(tx, id)?;
            version.updated_at = time::now();
            store::versions::save(tx, &version)?;
            Ok((version, endpoint_ref, disabled))
        })?;
        info!(
            "Version {} is UNDEPLOYED, {} scheduler(s) disabled",
            id, disabled
        );

        if let Some(endpoint_ref) = endpoint_ref {
            if let Err(e) = self.deployer.undeploy(&endpoint_ref).await {
                warn!("Failed to release endpoint {}: {}", endpoint_ref, e);
            }
        }
        Ok(version)
    }

    /// Delete a version that is neither training nor deployed.
    ///
    /// Its schedulers and their history are deleted with it. The version
    /// number is not reused.
    pub fn delete(&self, id: i64) -> Result<()> {
        self.store.write(|tx| {
            let version = load(tx, id)?;
            if version.status.is_locked() {
                return Err(MaioError::InvalidState {
                    entity: "model version",
                    id,
                    message: format!("cannot delete while {}", version.status),
                });
            }
            store::versions::delete(tx, id)?;
            store::models::touch(tx, version.model_id, &time::now())?;
            Ok(())
        })?;
        info!("Deleted version {}", id);
        Ok(())
    }

    async fn require_datasource(&self, datasource_id: i64) -> Result<()> {
        match self.datasources.get_datasource(datasource_id).await? {
            Some(_) => Ok(()),
            None => Err(MaioError::not_found("datasource", datasource_id)),
        }
    }
}

fn load(conn: &Connection, id: i64) -> Result<ModelVersion> {
    store::versions::get(conn, id)?.ok_or_else(|| MaioError::not_found("model version", id))
}
