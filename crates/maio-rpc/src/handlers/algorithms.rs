//! Algorithm registry handlers.

use crate::handlers::{parse_params, IdParams, PatchParams};
use crate::server::AppState;
use maio_core::{AlgorithmPatch, NewAlgorithm};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ResolveParams {
    existing_id: i64,
    parameters: Value,
}

pub async fn get_algorithm(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let algorithm = state.service.algorithms().get(id)?;
    Ok(serde_json::to_value(algorithm)?)
}

pub async fn list_algorithms(state: &AppState, _params: &Value) -> maio_core::Result<Value> {
    let algorithms = state.service.algorithms().list()?;
    Ok(serde_json::to_value(algorithms)?)
}

pub async fn create_algorithm(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let input: NewAlgorithm = parse_params(params)?;
    let algorithm = state.service.algorithms().create(input)?;
    Ok(serde_json::to_value(algorithm)?)
}

pub async fn update_algorithm(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let PatchParams { id, patch } = parse_params::<PatchParams<AlgorithmPatch>>(params)?;
    let algorithm = state.service.algorithms().update(id, patch)?;
    Ok(serde_json::to_value(algorithm)?)
}

pub async fn delete_algorithm(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    state.service.algorithms().delete(id)?;
    Ok(json!({"deleted": id}))
}

/// Find the family member matching `parameters`, forking one if none does.
pub async fn resolve_or_fork(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let ResolveParams {
        existing_id,
        parameters,
    } = parse_params(params)?;
    let algorithm_id = state
        .service
        .algorithms()
        .resolve_or_fork(existing_id, &parameters)?;
    Ok(json!({"algorithmId": algorithm_id}))
}
