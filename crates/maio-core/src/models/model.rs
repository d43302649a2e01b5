//! Logical model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ModelVersion;
use crate::error::{MaioError, Result};

/// A tag designated as model input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelTag {
    pub label: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// A logical ML use case grouping its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub use_case: Option<String>,
    pub usage_guidelines: Option<String>,
    pub datasource_id: i64,
    pub output_tag: ModelTag,
    pub input_tags: Vec<ModelTag>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ordered by version number.
    pub versions: Vec<ModelVersion>,
}

/// Input for creating a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewModel {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub use_case: Option<String>,
    #[serde(default)]
    pub usage_guidelines: Option<String>,
    pub datasource_id: i64,
    pub output_tag: ModelTag,
    #[serde(default)]
    pub input_tags: Vec<ModelTag>,
    #[serde(default)]
    pub created_by: Option<i64>,
}

/// Permitted model updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub use_case: Option<String>,
    #[serde(default)]
    pub usage_guidelines: Option<String>,
    #[serde(default)]
    pub datasource_id: Option<i64>,
    #[serde(default)]
    pub output_tag: Option<ModelTag>,
    #[serde(default)]
    pub input_tags: Option<Vec<ModelTag>>,
}

impl ModelPatch {
    /// Name of the first signature field this patch would change, if any.
    pub fn signature_change(&self, current: &Model) -> Option<&'static str> {
        if self
            .datasource_id
            .is_some_and(|id| id != current.datasource_id)
        {
            return Some("datasource");
        }
        if self
            .output_tag
            .as_ref()
            .is_some_and(|tag| tag != &current.output_tag)
        {
            return Some("output tag");
        }
        if self
            .input_tags
            .as_ref()
            .is_some_and(|tags| tags != &current.input_tags)
        {
            return Some("input tags");
        }
        None
    }
}

pub(crate) fn validate_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MaioError::validation(field, "name is required"));
    }
    Ok(())
}

pub(crate) fn validate_tag(field: &str, tag: &ModelTag) -> Result<()> {
    if tag.label.trim().is_empty() {
        return Err(MaioError::validation(field, "tag label is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_model() -> Model {
        let now = Utc::now();
        Model {
            id: 1,
            name: "cooler".into(),
            description: None,
            use_case: None,
            usage_guidelines: None,
            datasource_id: 10,
            output_tag: ModelTag {
                label: "anom_score".into(),
                display_name: None,
                unit: None,
            },
            input_tags: vec![],
            created_by: 1,
            created_at: now,
            updated_at: now,
            versions: vec![],
        }
    }

    #[test]
    fn test_same_values_are_not_a_signature_change() {
        let model = sample_model();
        let patch = ModelPatch {
            datasource_id: Some(10),
            output_tag: Some(model.output_tag.clone()),
            input_tags: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(patch.signature_change(&model), None);
    }

    #[test]
    fn test_detects_signature_change() {
        let model = sample_model();
        let patch = ModelPatch {
            datasource_id: Some(11),
            ..Default::default()
        };
        assert_eq!(patch.signature_change(&model), Some("datasource"));

        let patch = ModelPatch {
            output_tag: Some(ModelTag {
                label: "other".into(),
                display_name: None,
                unit: None,
            }),
            ..Default::default()
        };
        assert_eq!(patch.signature_change(&model), Some("output tag"));
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let err = serde_json::from_value::<ModelPatch>(json!({"versions": []}));
        assert!(err.is_err());
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_name("name", "M1").is_ok());
    }
}
