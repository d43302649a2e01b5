//! Model version lifecycle handlers.

use crate::handlers::{parse_params, IdParams, PatchParams};
use crate::server::AppState;
use maio_core::{NewVersion, TrainingOutcome, VersionPatch};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ModelIdParams {
    model_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompleteTrainingParams {
    id: i64,
    outcome: TrainingOutcome,
}

pub async fn get_version(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let version = state.service.versions().get(id)?;
    Ok(serde_json::to_value(version)?)
}

pub async fn list_versions(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let ModelIdParams { model_id } = parse_params(params)?;
    let versions = state.service.versions().list_by_model(model_id)?;
    Ok(serde_json::to_value(versions)?)
}

/// Live deployment of a version, or null when it has none.
pub async fn get_deployment(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let deployment = state.service.versions().get_deployment(id)?;
    Ok(serde_json::to_value(deployment)?)
}

pub async fn create_version(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let input: NewVersion = parse_params(params)?;
    let version = state.service.versions().create(input).await?;
    Ok(serde_json::to_value(version)?)
}

pub async fn update_version(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let PatchParams { id, patch } = parse_params::<PatchParams<VersionPatch>>(params)?;
    let version = state.service.versions().update(id, patch).await?;
    Ok(serde_json::to_value(version)?)
}

/// Start training; returns the version as TRAINING while the trainer runs.
pub async fn train_version(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let version = state.service.versions().train(id).await?;
    Ok(serde_json::to_value(version)?)
}

/// Trainer callback for submissions that were accepted asynchronously.
pub async fn complete_training(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let CompleteTrainingParams { id, outcome } = parse_params(params)?;
    let version = state.service.versions().complete_training(id, outcome)?;
    Ok(serde_json::to_value(version)?)
}

pub async fn deploy_version(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let version = state.service.versions().deploy(id).await?;
    Ok(serde_json::to_value(version)?)
}

pub async fn undeploy_version(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let version = state.service.versions().undeploy(id).await?;
    Ok(serde_json::to_value(version)?)
}

pub async fn delete_version(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    state.service.versions().delete(id)?;
    Ok(json!({"deleted": id}))
}
