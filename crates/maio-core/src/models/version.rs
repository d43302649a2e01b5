//! Model version types and the lifecycle transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{MaioError, Result};

/// Lifecycle status of a model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Pending,
    Training,
    Trained,
    Deployed,
    Undeployed,
    Failed,
}

/// An event that may move a version between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionAction {
    Train,
    CompleteTraining,
    Deploy,
    Undeploy,
    Fail,
}

impl VersionStatus {
    pub const ALL: [VersionStatus; 6] = [
        VersionStatus::Pending,
        VersionStatus::Training,
        VersionStatus::Trained,
        VersionStatus::Deployed,
        VersionStatus::Undeployed,
        VersionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Pending => "PENDING",
            VersionStatus::Training => "TRAINING",
            VersionStatus::Trained => "TRAINED",
            VersionStatus::Deployed => "DEPLOYED",
            VersionStatus::Undeployed => "UNDEPLOYED",
            VersionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// The transition table. `None` means the action is not permitted.
    pub fn next(self, action: VersionAction) -> Option<VersionStatus> {
        use VersionAction::*;
        use VersionStatus::*;

        match self {
            Pending => match action {
                Train => Some(Training),
                Fail => Some(Failed),
                CompleteTraining | Deploy | Undeploy => None,
            },
            Training => match action {
                CompleteTraining => Some(Trained),
                Fail => Some(Failed),
                Train | Deploy | Undeploy => None,
            },
            Trained => match action {
                Deploy => Some(Deployed),
                Fail => Some(Failed),
                Train | CompleteTraining | Undeploy => None,
            },
            Deployed => match action {
                Undeploy => Some(Undeployed),
                Fail => Some(Failed),
                Train | CompleteTraining | Deploy => None,
            },
            Undeployed => match action {
                Train => Some(Training),
                Fail => Some(Failed),
                CompleteTraining | Deploy | Undeploy => None,
            },
            Failed => match action {
                Train | CompleteTraining | Deploy | Undeploy | Fail => None,
            },
        }
    }

    /// Validate a transition for a given version, producing the target status.
    pub fn transition(self, version_id: i64, action: VersionAction) -> Result<VersionStatus> {
        self.next(action).ok_or(MaioError::InvalidTransition {
            version_id,
            from: self,
            action,
        })
    }

    /// A version in flight or serving traffic cannot be deleted or retargeted.
    pub fn is_locked(&self) -> bool {
        matches!(self, VersionStatus::Training | VersionStatus::Deployed)
    }

    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        matches!(self, VersionStatus::Failed)
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for VersionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionAction::Train => "train",
            VersionAction::CompleteTraining => "complete training of",
            VersionAction::Deploy => "deploy",
            VersionAction::Undeploy => "undeploy",
            VersionAction::Fail => "fail",
        })
    }
}

/// What a version is trained to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionType {
    #[default]
    AnomalyDetection,
    TimeSeriesPrediction,
}

impl VersionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionType::AnomalyDetection => "ANOMALY_DETECTION",
            VersionType::TimeSeriesPrediction => "TIME_SERIES_PREDICTION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ANOMALY_DETECTION" => Some(VersionType::AnomalyDetection),
            "TIME_SERIES_PREDICTION" => Some(VersionType::TimeSeriesPrediction),
            _ => None,
        }
    }
}

/// Training data selection: a datasource and a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatasourceMapping {
    pub datasource_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl DatasourceMapping {
    pub fn validate(&self) -> Result<()> {
        if self.start_time >= self.end_time {
            return Err(MaioError::validation(
                "datasourceMapping",
                "startTime must be before endTime",
            ));
        }
        Ok(())
    }
}

/// A registered version of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    pub id: i64,
    pub model_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub version: i64,
    pub status: VersionStatus,
    pub version_type: VersionType,
    pub algorithm_id: Option<i64>,
    /// Parameter snapshot taken from the resolved algorithm.
    pub parameters: Option<Value>,
    pub datasource_mapping: Option<DatasourceMapping>,
    pub training_percentage: Option<f64>,
    pub artifact_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Algorithm selection on create/update: an existing algorithm, optionally
/// with overriding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AlgorithmRef {
    pub id: i64,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Input for creating a version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewVersion {
    pub model_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version_type: Option<VersionType>,
    #[serde(default)]
    pub algorithm: Option<AlgorithmRef>,
    #[serde(default)]
    pub datasource_mapping: Option<DatasourceMapping>,
    #[serde(default)]
    pub training_percentage: Option<f64>,
}

/// Permitted version updates. Status changes only through lifecycle actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VersionPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub version_type: Option<VersionType>,
    #[serde(default)]
    pub algorithm: Option<AlgorithmRef>,
    #[serde(default)]
    pub datasource_mapping: Option<DatasourceMapping>,
    #[serde(default)]
    pub training_percentage: Option<f64>,
}

impl VersionPatch {
    /// True if the patch changes anything the trainer consumes.
    pub fn touches_training_inputs(&self) -> bool {
        self.version_type.is_some()
            || self.algorithm.is_some()
            || self.datasource_mapping.is_some()
            || self.training_percentage.is_some()
    }
}

pub(crate) fn validate_training_percentage(value: Option<f64>) -> Result<()> {
    match value {
        Some(pct) if !(pct > 0.0 && pct <= 100.0) => Err(MaioError::validation(
            "trainingPercentage",
            format!("must be in (0, 100], got {}", pct),
        )),
        _ => Ok(()),
    }
}

/// A live deployment of a version to the serving endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub version_id: i64,
    /// Filled once the deployment provider answers.
    pub endpoint_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_happy_path_transitions() {
        use VersionAction::*;
        use VersionStatus::*;

        assert_eq!(Pending.next(Train), Some(Training));
        assert_eq!(Training.next(CompleteTraining), Some(Trained));
        assert_eq!(Trained.next(Deploy), Some(Deployed));
        assert_eq!(Deployed.next(Undeploy), Some(Undeployed));
        assert_eq!(Undeployed.next(Train), Some(Training));
    }

    #[test]
    fn test_deploy_only_from_trained() {
        for status in VersionStatus::ALL {
            let allowed = status.next(VersionAction::Deploy).is_some();
            assert_eq!(allowed, status == VersionStatus::Trained, "{}", status);
        }
    }

    #[test]
    fn test_undeploy_only_from_deployed() {
        for status in VersionStatus::ALL {
            let allowed = status.next(VersionAction::Undeploy).is_some();
            assert_eq!(allowed, status == VersionStatus::Deployed, "{}", status);
        }
    }

    #[test]
    fn test_train_rejected_while_training() {
        let err = VersionStatus::Training
            .transition(4, VersionAction::Train)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_failed_is_terminal() {
        for action in [
            VersionAction::Train,
            VersionAction::CompleteTraining,
            VersionAction::Deploy,
            VersionAction::Undeploy,
            VersionAction::Fail,
        ] {
            assert_eq!(VersionStatus::Failed.next(action), None);
        }
        assert!(VersionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in VersionStatus::ALL {
            assert_eq!(VersionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(VersionStatus::parse("DEPLOYING"), None);
    }

    #[test]
    fn test_patch_rejects_status_field() {
        let err = serde_json::from_value::<VersionPatch>(json!({"status": "DEPLOYED"}));
        assert!(err.is_err());
    }

    #[test]
    fn test_patch_training_inputs() {
        let patch: VersionPatch = serde_json::from_value(json!({"name": "renamed"})).unwrap();
        assert!(!patch.touches_training_inputs());
        let patch: VersionPatch =
            serde_json::from_value(json!({"trainingPercentage": 80.0})).unwrap();
        assert!(patch.touches_training_inputs());
    }

    #[test]
    fn test_mapping_requires_ordered_range() {
        let start = Utc::now();
        let mapping = DatasourceMapping {
            datasource_id: 1,
            start_time: start,
            end_time: start,
        };
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn test_training_percentage_bounds() {
        assert!(validate_training_percentage(None).is_ok());
        assert!(validate_training_percentage(Some(80.0)).is_ok());
        assert!(validate_training_percentage(Some(100.0)).is_ok());
        assert!(validate_training_percentage(Some(0.0)).is_err());
        assert!(validate_training_percentage(Some(120.0)).is_err());
    }
}
