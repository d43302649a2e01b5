//! JSON-RPC request handlers, split by domain.

mod algorithms;
mod datasources;
mod history;
mod models;
mod schedulers;
mod versions;

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use maio_core::MaioError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data,
            }),
            id,
        }
    }

    fn from_error(id: Option<Value>, err: &MaioError) -> Self {
        Self::error(
            id,
            err.to_rpc_error_code(),
            err.to_string(),
            Some(json!({ "code": err.code() })),
        )
    }
}

const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Deserialize the whole params object into a typed request.
pub(crate) fn parse_params<T: DeserializeOwned>(params: &Value) -> maio_core::Result<T> {
    T::deserialize(params).map_err(|e| MaioError::InvalidParams {
        message: e.to_string(),
    })
}

/// Params naming a single record.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct IdParams {
    pub id: i64,
}

/// Params carrying a record id and a partial update.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PatchParams<P> {
    pub id: i64,
    pub patch: P,
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let id = request.id.clone();

    if request.jsonrpc != "2.0" {
        warn!("Rejecting request with jsonrpc version {:?}", request.jsonrpc);
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Invalid request: jsonrpc must be \"2.0\"".to_string(),
                None,
            )),
        );
    }

    let method = request.method.as_str();
    let params = request.params.unwrap_or(Value::Object(Default::default()));

    debug!("RPC call: {}({:?})", method, params);

    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    match dispatch_method(&state, method, &params).await {
        Some(Ok(value)) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))),
        Some(Err(e)) => {
            if e.is_internal() {
                error!("RPC error for {}: {}", method, e);
            } else {
                debug!("RPC {} rejected: {}", method, e);
            }
            (StatusCode::OK, Json(JsonRpcResponse::from_error(id, &e)))
        }
        None => (
            StatusCode::OK,
            Json(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
                None,
            )),
        ),
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate domain handler.
///
/// Returns `None` for unknown methods.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> Option<maio_core::Result<Value>> {
    let result = match method {
        // Datasources
        "get_datasource" => datasources::get_datasource(state, params).await,
        "list_datasources" => datasources::list_datasources(state, params).await,
        "create_datasource" => datasources::create_datasource(state, params).await,

        // Models
        "get_model" => models::get_model(state, params).await,
        "list_models" => models::list_models(state, params).await,
        "create_model" => models::create_model(state, params).await,
        "update_model" => models::update_model(state, params).await,
        "delete_model" => models::delete_model(state, params).await,

        // Algorithms
        "get_algorithm" => algorithms::get_algorithm(state, params).await,
        "list_algorithms" => algorithms::list_algorithms(state, params).await,
        "create_algorithm" => algorithms::create_algorithm(state, params).await,
        "update_algorithm" => algorithms::update_algorithm(state, params).await,
        "delete_algorithm" => algorithms::delete_algorithm(state, params).await,
        "resolve_or_fork" => algorithms::resolve_or_fork(state, params).await,

        // Model versions
        "get_version" => versions::get_version(state, params).await,
        "list_versions" => versions::list_versions(state, params).await,
        "get_deployment" => versions::get_deployment(state, params).await,
        "create_version" => versions::create_version(state, params).await,
        "update_version" => versions::update_version(state, params).await,
        "train_version" => versions::train_version(state, params).await,
        "complete_training" => versions::complete_training(state, params).await,
        "deploy_version" => versions::deploy_version(state, params).await,
        "undeploy_version" => versions::undeploy_version(state, params).await,
        "delete_version" => versions::delete_version(state, params).await,

        // Schedulers
        "get_scheduler" => schedulers::get_scheduler(state, params).await,
        "list_schedulers" => schedulers::list_schedulers(state, params).await,
        "create_scheduler" => schedulers::create_scheduler(state, params).await,
        "delete_scheduler" => schedulers::delete_scheduler(state, params).await,
        "set_scheduler_enabled" => schedulers::set_scheduler_enabled(state, params).await,

        // Execution history
        "get_history_record" => history::get_history_record(state, params).await,
        "list_history" => history::list_history(state, params).await,

        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_carries_stable_code() {
        let err = MaioError::not_found("model", 7);
        let response = JsonRpcResponse::from_error(Some(json!(1)), &err);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"]["code"], -32001);
        assert_eq!(value["error"]["data"]["code"], "NOT_FOUND");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_parse_params_reports_invalid_params() {
        let err = parse_params::<IdParams>(&json!({"id": "seven"})).unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");
        assert_eq!(err.to_rpc_error_code(), -32602);

        let err = parse_params::<IdParams>(&json!({"id": 1, "extra": true})).unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");

        let parsed = parse_params::<IdParams>(&json!({"id": 3})).unwrap();
        assert_eq!(parsed.id, 3);
    }
}
