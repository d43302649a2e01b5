//! Training algorithm configurations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, parameterized training configuration.
///
/// Records with a `base_algorithm_id` are forks created when a version asked
/// for parameters that differ from every existing member of the family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Algorithm {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
    pub base_algorithm_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Algorithm {
    /// Id of the root of this algorithm's fork family.
    pub fn root_id(&self) -> i64 {
        self.base_algorithm_id.unwrap_or(self.id)
    }

    pub fn is_fork(&self) -> bool {
        self.base_algorithm_id.is_some()
    }
}

/// Input for creating an algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewAlgorithm {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub parameters: Value,
}

/// Permitted algorithm updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AlgorithmPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}
