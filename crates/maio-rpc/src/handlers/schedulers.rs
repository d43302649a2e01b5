//! Scheduler handlers.

use crate::handlers::{parse_params, IdParams};
use crate::server::AppState;
use maio_core::NewScheduler;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct VersionIdParams {
    version_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnabledParams {
    id: i64,
    enabled: bool,
}

pub async fn get_scheduler(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let scheduler = state.service.schedulers().get(id)?;
    Ok(serde_json::to_value(scheduler)?)
}

pub async fn list_schedulers(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let VersionIdParams { version_id } = parse_params(params)?;
    let schedulers = state.service.schedulers().list_by_version(version_id)?;
    Ok(serde_json::to_value(schedulers)?)
}

pub async fn create_scheduler(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let input: NewScheduler = parse_params(params)?;
    let scheduler = state.service.schedulers().create(input).await?;
    Ok(serde_json::to_value(scheduler)?)
}

pub async fn delete_scheduler(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    state.service.schedulers().delete(id)?;
    Ok(json!({"deleted": id}))
}

pub async fn set_scheduler_enabled(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let EnabledParams { id, enabled } = parse_params(params)?;
    let scheduler = state.service.schedulers().set_enabled(id, enabled)?;
    Ok(serde_json::to_value(scheduler)?)
}
