//! Model registry handlers.

use crate::handlers::{parse_params, IdParams, PatchParams};
use crate::server::AppState;
use maio_core::{ModelPatch, NewModel};
use serde_json::{json, Value};

pub async fn get_model(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let model = state.service.models().get(id)?;
    Ok(serde_json::to_value(model)?)
}

pub async fn list_models(state: &AppState, _params: &Value) -> maio_core::Result<Value> {
    let models = state.service.models().list()?;
    Ok(serde_json::to_value(models)?)
}

pub async fn create_model(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let input: NewModel = parse_params(params)?;
    let model = state.service.models().create(input).await?;
    Ok(serde_json::to_value(model)?)
}

pub async fn update_model(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let PatchParams { id, patch } = parse_params::<PatchParams<ModelPatch>>(params)?;
    let model = state.service.models().update(id, patch).await?;
    Ok(serde_json::to_value(model)?)
}

pub async fn delete_model(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    state.service.models().delete(id)?;
    Ok(json!({"deleted": id}))
}
