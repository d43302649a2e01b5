//! In-process providers.
//!
//! Deterministic stand-ins for the external services, used by the binary in
//! development mode and by tests. Each one records the calls it receives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    Datasource, DatasourceProvider, DeploymentProvider, Prediction, PredictionRequest, Predictor,
    TagEntry, TimeSeries, Trainer, TrainingOutcome, TrainingRequest,
};
use crate::config::SchedulerConfig;
use crate::error::{MaioError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Datasources and their tag entries held in memory.
#[derive(Default)]
pub struct MemoryDatasources {
    datasources: Mutex<HashMap<i64, Datasource>>,
    entries: Mutex<HashMap<i64, Vec<TagEntry>>>,
}

impl MemoryDatasources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of a datasource.
    pub fn with_datasource(self, id: i64, name: &str) -> Self {
        self.add_datasource(id, name);
        self
    }

    pub fn add_datasource(&self, id: i64, name: &str) {
        lock(&self.datasources).insert(
            id,
            Datasource {
                id,
                name: name.to_string(),
            },
        );
    }

    pub fn push_entry(&self, datasource_id: i64, entry: TagEntry) {
        lock(&self.entries)
            .entry(datasource_id)
            .or_default()
            .push(entry);
    }
}

#[async_trait]
impl DatasourceProvider for MemoryDatasources {
    async fn get_datasource(&self, id: i64) -> Result<Option<Datasource>> {
        Ok(lock(&self.datasources).get(&id).cloned())
    }

    async fn list_datasources(&self) -> Result<Vec<Datasource>> {
        let mut datasources: Vec<Datasource> =
            lock(&self.datasources).values().cloned().collect();
        datasources.sort_by_key(|d| d.id);
        Ok(datasources)
    }

    async fn create_datasource(&self, name: &str) -> Result<Datasource> {
        let mut datasources = lock(&self.datasources);
        if datasources.values().any(|d| d.name == name) {
            return Err(MaioError::DuplicateName {
                entity: "datasource",
                name: name.to_string(),
            });
        }
        let id = datasources.keys().max().map_or(1, |max| max + 1);
        let datasource = Datasource {
            id,
            name: name.to_string(),
        };
        datasources.insert(id, datasource.clone());
        Ok(datasource)
    }

    async fn get_tag_entries(
        &self,
        datasource_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries> {
        if !lock(&self.datasources).contains_key(&datasource_id) {
            return Err(MaioError::not_found("datasource", datasource_id));
        }
        let entries = lock(&self.entries)
            .get(&datasource_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.timestamp >= start && e.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(TimeSeries {
            datasource_id,
            start,
            end,
            entries,
        })
    }
}

/// What [`MemoryTrainer`] answers to the next submissions.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainerBehavior {
    /// Finish immediately with an artifact named after the version.
    Succeed,
    Fail(String),
    /// Acknowledge and leave completion to the callback.
    Accept,
    /// Fail the call itself, as an unreachable trainer would.
    Unavailable(String),
}

pub struct MemoryTrainer {
    behavior: Mutex<TrainerBehavior>,
    submissions: Mutex<Vec<TrainingRequest>>,
}

impl Default for MemoryTrainer {
    fn default() -> Self {
        Self {
            behavior: Mutex::new(TrainerBehavior::Succeed),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: TrainerBehavior) -> Self {
        let trainer = Self::default();
        trainer.set_behavior(behavior);
        trainer
    }

    pub fn set_behavior(&self, behavior: TrainerBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn submissions(&self) -> Vec<TrainingRequest> {
        lock(&self.submissions).clone()
    }
}

#[async_trait]
impl Trainer for MemoryTrainer {
    async fn submit_training(&self, request: &TrainingRequest) -> Result<TrainingOutcome> {
        lock(&self.submissions).push(request.clone());
        let behavior = lock(&self.behavior).clone();
        match behavior {
            TrainerBehavior::Succeed => Ok(TrainingOutcome::Trained {
                artifact_ref: format!("memory://artifacts/{}", request.version_id),
            }),
            TrainerBehavior::Fail(reason) => Ok(TrainingOutcome::Failed { reason }),
            TrainerBehavior::Accept => Ok(TrainingOutcome::Accepted),
            TrainerBehavior::Unavailable(message) => Err(MaioError::External {
                service: "trainer",
                message,
            }),
        }
    }
}

/// Flags every input value at or above a score threshold.
pub struct MemoryPredictor {
    threshold: f64,
    failure: Mutex<Option<String>>,
    calls: Mutex<Vec<PredictionRequest>>,
}

impl Default for MemoryPredictor {
    fn default() -> Self {
        Self::with_threshold(SchedulerConfig::ANOMALY_SCORE_THRESHOLD)
    }
}

impl MemoryPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make subsequent invocations fail with `message`, or succeed again on `None`.
    pub fn set_failure(&self, message: Option<String>) {
        *lock(&self.failure) = message;
    }

    pub fn calls(&self) -> Vec<PredictionRequest> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Predictor for MemoryPredictor {
    async fn invoke(&self, request: &PredictionRequest) -> Result<Prediction> {
        lock(&self.calls).push(request.clone());
        if let Some(message) = lock(&self.failure).clone() {
            return Err(MaioError::External {
                service: "predictor",
                message,
            });
        }
        let anomaly_count = request
            .input
            .entries
            .iter()
            .filter(|e| e.value >= self.threshold)
            .count() as i64;
        Ok(Prediction {
            anomaly_detected: anomaly_count > 0,
            anomaly_count,
        })
    }
}

/// Keeps a set of live endpoints.
#[derive(Default)]
pub struct MemoryDeployer {
    live: Mutex<HashSet<String>>,
    failure: Mutex<Option<String>>,
    undeployed: Mutex<Vec<String>>,
}

impl MemoryDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure(&self, message: Option<String>) {
        *lock(&self.failure) = message;
    }

    pub fn is_live(&self, endpoint_ref: &str) -> bool {
        lock(&self.live).contains(endpoint_ref)
    }

    pub fn undeployed(&self) -> Vec<String> {
        lock(&self.undeployed).clone()
    }
}

#[async_trait]
impl DeploymentProvider for MemoryDeployer {
    async fn deploy(&self, version_id: i64, _artifact_ref: Option<&str>) -> Result<String> {
        if let Some(message) = lock(&self.failure).clone() {
            return Err(MaioError::External {
                service: "deployer",
                message,
            });
        }
        let endpoint = format!("memory://endpoints/{}", version_id);
        lock(&self.live).insert(endpoint.clone());
        Ok(endpoint)
    }

    async fn undeploy(&self, endpoint_ref: &str) -> Result<()> {
        lock(&self.live).remove(endpoint_ref);
        lock(&self.undeployed).push(endpoint_ref.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_tag_entries_respect_window() {
        let datasources = MemoryDatasources::new().with_datasource(1, "plant");
        let now = Utc::now();
        for minutes in [10, 300] {
            datasources.push_entry(
                1,
                TagEntry {
                    tag: "anom_score".into(),
                    timestamp: now - Duration::minutes(minutes),
                    value: 1.0,
                },
            );
        }
        let series = datasources
            .get_tag_entries(1, now - Duration::minutes(256), now)
            .await
            .unwrap();
        assert_eq!(series.entries.len(), 1);
        assert!(datasources.get_tag_entries(2, now, now).await.is_err());
    }

    #[tokio::test]
    async fn test_created_datasources_get_fresh_ids() {
        let datasources = MemoryDatasources::new().with_datasource(4, "plant");
        let created = datasources.create_datasource("line 2").await.unwrap();
        assert_eq!(created.id, 5);

        let err = datasources.create_datasource("plant").await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_NAME");

        let names: Vec<String> = datasources
            .list_datasources()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["plant", "line 2"]);
    }

    #[tokio::test]
    async fn test_predictor_counts_scores_over_threshold() {
        let predictor = MemoryPredictor::new();
        let now = Utc::now();
        let entries = [1.0, 4.5, 7.2]
            .into_iter()
            .map(|value| TagEntry {
                tag: "anom_score".into(),
                timestamp: now,
                value,
            })
            .collect();
        let request = PredictionRequest {
            version_id: 1,
            endpoint_ref: None,
            input: TimeSeries {
                datasource_id: 1,
                start: now,
                end: now,
                entries,
            },
        };
        let prediction = predictor.invoke(&request).await.unwrap();
        assert!(prediction.anomaly_detected);
        assert_eq!(prediction.anomaly_count, 2);
    }

    #[tokio::test]
    async fn test_deployer_tracks_live_endpoints() {
        let deployer = MemoryDeployer::new();
        let endpoint = deployer.deploy(3, Some("memory://artifacts/3")).await.unwrap();
        assert!(deployer.is_live(&endpoint));
        deployer.undeploy(&endpoint).await.unwrap();
        assert!(!deployer.is_live(&endpoint));
        assert_eq!(deployer.undeployed(), vec![endpoint]);
    }
}
