//! Execution history handlers.

use crate::handlers::{parse_params, IdParams};
use crate::server::AppState;
use maio_core::PageRequest;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListHistoryParams {
    scheduler_id: i64,
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn get_history_record(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let IdParams { id } = parse_params(params)?;
    let record = state.service.history().get(id)?;
    Ok(serde_json::to_value(record)?)
}

/// One page of a scheduler's history: `{items, pageInfo}`.
pub async fn list_history(state: &AppState, params: &Value) -> maio_core::Result<Value> {
    let ListHistoryParams {
        scheduler_id,
        after,
        limit,
    } = parse_params(params)?;
    let page = state
        .service
        .history()
        .list(scheduler_id, &PageRequest { after, limit })?;
    Ok(serde_json::to_value(page)?)
}
