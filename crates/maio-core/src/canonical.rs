//! Canonical JSON for algorithm parameter sets.
//!
//! Two parameter sets are equivalent iff their canonical serializations are
//! byte-identical. Canonical form sorts object keys recursively, emits no
//! insignificant whitespace and keeps array order. Under [`KeyCase::Fold`]
//! keys are lower-cased first, so `learningRate` and `learningrate` compare
//! equal; two keys of one object that fold to the same string are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{MaioError, Result};

/// How object keys are treated before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCase {
    /// Keys compare exactly as supplied.
    Preserve,
    /// Keys are lower-cased before sorting and comparison.
    Fold,
}

impl Default for KeyCase {
    fn default() -> Self {
        crate::config::CanonicalConfig::DEFAULT_KEY_CASE
    }
}

impl KeyCase {
    fn apply(self, key: &str) -> String {
        match self {
            KeyCase::Preserve => key.to_string(),
            KeyCase::Fold => key.to_lowercase(),
        }
    }
}

/// Check that a value is usable as a parameter set (a JSON object).
pub fn ensure_parameter_object(parameters: &Value) -> Result<()> {
    if parameters.is_object() {
        Ok(())
    } else {
        Err(MaioError::validation(
            "parameters",
            "parameter set must be a JSON object",
        ))
    }
}

/// Produce the canonical serialization of a parameter set.
pub fn canonicalize(parameters: &Value, key_case: KeyCase) -> Result<String> {
    ensure_parameter_object(parameters)?;
    let mut out = String::new();
    write_canonical(parameters, key_case, "", &mut out)?;
    Ok(out)
}

/// True when both parameter sets canonicalize to the same bytes.
#[cfg(test)]
pub fn equivalent(a: &Value, b: &Value, key_case: KeyCase) -> Result<bool> {
    Ok(canonicalize(a, key_case)? == canonicalize(b, key_case)?)
}

fn write_canonical(value: &Value, key_case: KeyCase, path: &str, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut sorted: BTreeMap<String, &Value> = BTreeMap::new();
            for (key, child) in map {
                let normalized = key_case.apply(key);
                if sorted.insert(normalized.clone(), child).is_some() {
                    return Err(MaioError::validation(
                        format!("parameters{}", path),
                        format!("keys collide after case folding: '{}'", normalized),
                    ));
                }
            }
            out.push('{');
            for (i, (key, child)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(&key)?);
                out.push(':');
                write_canonical(child, key_case, &format!("{}.{}", path, key), out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, key_case, &format!("{}[{}]", path, i), out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({"epochs": 10, "learningRate": 0.001});
        let b = json!({"learningRate": 0.001, "epochs": 10});
        assert!(equivalent(&a, &b, KeyCase::Preserve).unwrap());
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let value = json!({"b": {"z": 1, "a": [3, {"y": 2, "x": 1}]}, "a": null});
        assert_eq!(
            canonicalize(&value, KeyCase::Preserve).unwrap(),
            r#"{"a":null,"b":{"a":[3,{"x":1,"y":2}],"z":1}}"#
        );
    }

    #[test]
    fn test_array_order_is_significant() {
        let a = json!({"nLayers": [64, 32]});
        let b = json!({"nLayers": [32, 64]});
        assert!(!equivalent(&a, &b, KeyCase::Fold).unwrap());
    }

    #[test]
    fn test_fold_ignores_key_case() {
        let a = json!({"LearningRate": 0.01});
        let b = json!({"learningrate": 0.01});
        assert!(equivalent(&a, &b, KeyCase::Fold).unwrap());
        assert!(!equivalent(&a, &b, KeyCase::Preserve).unwrap());
    }

    #[test]
    fn test_fold_rejects_colliding_keys() {
        let value = json!({"hiddenSize": 64, "HiddenSize": 128});
        let err = canonicalize(&value, KeyCase::Fold).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(canonicalize(&value, KeyCase::Preserve).is_ok());
    }

    #[test]
    fn test_values_keep_their_case() {
        let value = json!({"Name": "LSTMODEL"});
        assert_eq!(
            canonicalize(&value, KeyCase::Fold).unwrap(),
            r#"{"name":"LSTMODEL"}"#
        );
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(canonicalize(&json!([1, 2]), KeyCase::Fold).is_err());
        assert!(canonicalize(&json!("x"), KeyCase::Fold).is_err());
    }
}
