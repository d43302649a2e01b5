//! Datasource handlers.

use crate::handlers::{parse_params, IdParams};
use crate::server::AppState;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateDatasourceParams {
    name: String,
}

pub async fn get_datasource(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let datasource = state.service.datasources().get(id).await?;
    Ok(serde_json::to_value(datasource)?)
}

pub async fn list_datasources(state: &AppState, _params: &Value) -> maio_core::Result<Value> {
    let datasources = state.service.datasources().list().await?;
    Ok(serde_json::to_value(datasources)?)
}

pub async fn create_datasource(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let CreateDatasourceParams { name } = parse_params(params)?;
    let datasource = state.service.datasources().create(&name).await?;
    Ok(serde_json::to_value(datasource)?)
}
