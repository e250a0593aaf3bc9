// src/server/http_server.rs

//! The admin HTTP surface: Prometheus `/metrics` plus the `/rtc/api/...`
//! routes, implemented as `axum::Router` handlers over the same
//! `ConfigManager`/`Registry` calls the subscribe channel uses.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::info;

use crate::core::errors::LivecfgError;
use crate::core::state::ServerState;

/// The uniform `{code, msg, data}` response envelope: `code: 0` on success,
/// `code: 1` with a human-readable `msg` on a domain error.
struct ApiResponse {
    code: i32,
    msg: String,
    data: Value,
}

impl ApiResponse {
    fn ok(data: Value) -> Self {
        Self {
            code: 0,
            msg: String::new(),
            data,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        Json(json!({"code": self.code, "msg": self.msg, "data": self.data})).into_response()
    }
}

impl From<LivecfgError> for ApiResponse {
    fn from(error: LivecfgError) -> Self {
        Self {
            code: 1,
            msg: error.to_string(),
            data: json!({}),
        }
    }
}

type ApiResult = Result<ApiResponse, ApiResponse>;

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/rtc/api/config/list", get(config_list))
        .route(
            "/rtc/api/config",
            get(config_get)
                .post(config_create)
                .put(config_update)
                .delete(config_delete),
        )
        .route(
            "/rtc/api/config/item",
            get(item_list)
                .post(item_create)
                .put(item_create)
                .delete(item_delete),
        )
        .route("/rtc/api/client", get(client_list))
        .with_state(state)
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        crate::core::metrics::gather_metrics(),
    )
}

#[derive(Debug, Deserialize)]
struct ConfigNameQuery {
    config_name: String,
}

async fn config_list(State(state): State<Arc<ServerState>>) -> ApiResult {
    let projects = state.manager.list_projects().await.map_err(ApiResponse::from)?;
    crate::core::metrics::PROJECT_COUNT.set(projects.len() as f64);
    Ok(ApiResponse::ok(json!({ "list": projects })))
}

#[derive(Debug, Deserialize)]
struct CreateConfigBody {
    #[serde(default)]
    copy_from: Option<String>,
    #[serde(default)]
    parent: Vec<String>,
}

async fn config_create(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ConfigNameQuery>,
    Json(body): Json<CreateConfigBody>,
) -> ApiResult {
    state
        .manager
        .create_project(&query.config_name, body.copy_from.as_deref(), body.parent)
        .await
        .map_err(ApiResponse::from)?;
    info!("created project {}", query.config_name);
    project_info(&state, &query.config_name).await
}

#[derive(Debug, Deserialize)]
struct UpdateConfigQuery {
    config_name: String,
    #[serde(default)]
    env: Option<String>,
}

async fn config_update(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<UpdateConfigQuery>,
    Json(body): Json<Value>,
) -> ApiResult {
    let Value::Object(map) = body else {
        return Err(ApiResponse::from(LivecfgError::GlobalApi(
            "config data must be an object".to_string(),
        )));
    };
    if map.is_empty() {
        return Err(ApiResponse::from(LivecfgError::GlobalApi(
            "config data cannot be empty".to_string(),
        )));
    }

    let mut document = state
        .manager
        .get_project(&query.config_name)
        .await
        .map_err(ApiResponse::from)?;

    match &query.env {
        Some(env) => {
            document.validate_env(&query.config_name, env).map_err(ApiResponse::from)?;
            let env_map = document.ensure_env(env);
            for (key, value) in map {
                env_map.insert(
                    key.clone(),
                    crate::core::model::Entry {
                        key,
                        desc: String::new(),
                        value,
                    },
                );
            }
        }
        None => {
            return Err(ApiResponse::from(LivecfgError::GlobalApi(
                "env query parameter is required".to_string(),
            )));
        }
    }

    state
        .manager
        .update_project(&query.config_name, document, false)
        .await
        .map_err(ApiResponse::from)?;
    project_info(&state, &query.config_name).await
}

async fn config_delete(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ConfigNameQuery>,
) -> ApiResult {
    state
        .manager
        .remove_project(&query.config_name)
        .await
        .map_err(ApiResponse::from)?;
    Ok(ApiResponse::ok(json!({})))
}

async fn config_get(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ConfigNameQuery>,
) -> ApiResult {
    project_info(&state, &query.config_name).await
}

async fn project_info(state: &Arc<ServerState>, config_name: &str) -> ApiResult {
    let document = state.manager.get_project(config_name).await.map_err(ApiResponse::from)?;
    Ok(ApiResponse::ok(
        serde_json::to_value(document).expect("ProjectDocument serialization cannot fail"),
    ))
}

#[derive(Debug, Deserialize)]
struct ItemQuery {
    config_name: String,
    env: String,
}

async fn item_list(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ItemQuery>,
) -> ApiResult {
    let document = state.manager.get_project(&query.config_name).await.map_err(ApiResponse::from)?;
    document
        .validate_env(&query.config_name, &query.env)
        .map_err(ApiResponse::from)?;
    let entries: Vec<Value> = document
        .get_env(&query.env)
        .map(|env_map| env_map.values().map(|e| serde_json::to_value(e).unwrap()).collect())
        .unwrap_or_default();
    Ok(ApiResponse::ok(json!(entries)))
}

#[derive(Debug, Deserialize)]
struct ItemBody {
    key: Option<String>,
    #[serde(default)]
    desc: String,
    value: Option<Value>,
    #[serde(default)]
    operator: Option<String>,
}

async fn item_create(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ItemQuery>,
    method: axum::http::Method,
    Json(body): Json<ItemBody>,
) -> ApiResult {
    let Some(key) = body.key.filter(|k| !k.is_empty()) else {
        return Err(ApiResponse::from(LivecfgError::GlobalApi(
            "entry key is empty or invalid".to_string(),
        )));
    };
    let Some(value) = body.value else {
        return Err(ApiResponse::from(LivecfgError::GlobalApi(
            "entry value cannot be empty".to_string(),
        )));
    };
    let reject_if_exists = method == axum::http::Method::POST;
    state
        .manager
        .set_entry(
            &query.config_name,
            &query.env,
            &key,
            body.desc,
            value,
            body.operator,
            reject_if_exists,
        )
        .await
        .map_err(ApiResponse::from)?;
    Ok(ApiResponse::ok(json!({})))
}

#[derive(Debug, Deserialize)]
struct DeleteItemBody {
    key: Option<String>,
    #[serde(default)]
    operator: Option<String>,
}

async fn item_delete(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ItemQuery>,
    Json(body): Json<DeleteItemBody>,
) -> ApiResult {
    let Some(key) = body.key.filter(|k| !k.is_empty()) else {
        return Err(ApiResponse::from(LivecfgError::GlobalApi(
            "entry key is empty or invalid".to_string(),
        )));
    };
    state
        .manager
        .remove_entry(&query.config_name, &query.env, &key, body.operator)
        .await
        .map_err(ApiResponse::from)?;
    Ok(ApiResponse::ok(json!({})))
}

async fn client_list(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ConfigNameQuery>,
) -> ApiResult {
    let sessions = state.registry.list(&query.config_name);
    let mut clients = Vec::with_capacity(sessions.len());
    for session_id in sessions {
        if let Some(record) = state.registry.last_pull(&session_id) {
            clients.push(json!({
                "session_id": session_id,
                "config_name": record.config_name,
                "env": record.env,
                "hash_code": record.hash_code,
            }));
        }
    }
    Ok(ApiResponse::ok(json!(clients)))
}

/// Runs the HTTP server until `shutdown_rx` fires.
pub async fn run(state: Arc<ServerState>, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let port = state.config.http.port;
    let host = state.config.host.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    info!("admin HTTP surface listening on {host}:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;
    Ok(())
}
