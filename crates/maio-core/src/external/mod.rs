//! Interfaces to the services the lifecycle drives but does not own.
//!
//! The registries only see these traits. [`http`] talks to real services over
//! JSON; [`memory`] keeps everything in process for development and tests.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{DatasourceMapping, VersionType};

/// A source of tag time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datasource {
    pub id: i64,
    pub name: String,
}

/// One observation of a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEntry {
    pub tag: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Tag observations of one datasource within `[start, end]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub datasource_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub entries: Vec<TagEntry>,
}

/// Everything the trainer needs to train one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRequest {
    pub version_id: i64,
    pub model_id: i64,
    pub version_type: VersionType,
    pub parameters: Option<Value>,
    pub datasource_mapping: Option<DatasourceMapping>,
    pub training_percentage: Option<f64>,
}

/// The trainer's answer to a submission, or a completion callback payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainingOutcome {
    Trained {
        #[serde(rename = "artifactRef")]
        artifact_ref: String,
    },
    Failed {
        reason: String,
    },
    /// Training continues remotely; the result arrives through
    /// [`crate::VersionLifecycle::complete_training`].
    Accepted,
}

/// Input window for one inference run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub version_id: i64,
    pub endpoint_ref: Option<String>,
    pub input: TimeSeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub anomaly_detected: bool,
    pub anomaly_count: i64,
}

#[async_trait]
pub trait DatasourceProvider: Send + Sync {
    /// Look up a datasource; `None` when it does not exist.
    async fn get_datasource(&self, id: i64) -> Result<Option<Datasource>>;

    async fn list_datasources(&self) -> Result<Vec<Datasource>>;

    /// Register a datasource and return it with its assigned id.
    async fn create_datasource(&self, name: &str) -> Result<Datasource>;

    async fn get_tag_entries(
        &self,
        datasource_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries>;
}

#[async_trait]
pub trait Trainer: Send + Sync {
    /// Submit a version for training.
    ///
    /// May run to completion and return the result, or return
    /// [`TrainingOutcome::Accepted`] and report later.
    async fn submit_training(&self, request: &TrainingRequest) -> Result<TrainingOutcome>;
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn invoke(&self, request: &PredictionRequest) -> Result<Prediction>;
}

#[async_trait]
pub trait DeploymentProvider: Send + Sync {
    /// Provision a serving endpoint and return its reference.
    async fn deploy(&self, version_id: i64, artifact_ref: Option<&str>) -> Result<String>;

    /// Tear down an endpoint. Must tolerate endpoints that are already gone.
    async fn undeploy(&self, endpoint_ref: &str) -> Result<()>;
}

/// The full set of collaborators a service instance talks to.
#[derive(Clone)]
pub struct Providers {
    pub datasources: Arc<dyn DatasourceProvider>,
    pub trainer: Arc<dyn Trainer>,
    pub predictor: Arc<dyn Predictor>,
    pub deployer: Arc<dyn DeploymentProvider>,
}

impl Providers {
    /// In-process providers with no datasources registered.
    pub fn in_memory() -> Self {
        Self {
            datasources: Arc::new(memory::MemoryDatasources::new()),
            trainer: Arc::new(memory::MemoryTrainer::new()),
            predictor: Arc::new(memory::MemoryPredictor::new()),
            deployer: Arc::new(memory::MemoryDeployer::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_training_outcome_wire_format() {
        let outcome: TrainingOutcome =
            serde_json::from_value(json!({"status": "TRAINED", "artifactRef": "s3://m/1"}))
                .unwrap();
        assert_eq!(
            outcome,
            TrainingOutcome::Trained {
                artifact_ref: "s3://m/1".into()
            }
        );

        let outcome: TrainingOutcome =
            serde_json::from_value(json!({"status": "FAILED", "reason": "oom"})).unwrap();
        assert_eq!(outcome, TrainingOutcome::Failed { reason: "oom".into() });

        let accepted = serde_json::to_value(TrainingOutcome::Accepted).unwrap();
        assert_eq!(accepted, json!({"status": "ACCEPTED"}));
    }
}
