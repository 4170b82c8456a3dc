//! API route handlers for the control surface.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use wamark_core::error::WamarkError;
use wamark_core::types::{ClientEntry, ReactSettings};
use wamark_engine::BacklogQuery;

use super::server::AppState;

/// Engine error mapped onto an HTTP status with an `{"error": ...}` body.
pub struct ApiError(WamarkError);

impl From<WamarkError> for ApiError {
    fn from(e: WamarkError) -> Self {
        Self(e)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self(WamarkError::Json(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WamarkError::NotReady => StatusCode::CONFLICT,
            WamarkError::Campaign(_) | WamarkError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Health check endpoint.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "wamark",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn status_payload(state: &AppState) -> Value {
    let scheduler = state.scheduler.status();
    let bulk = state.bulk.status();
    json!({
        "isReady": scheduler.ready,
        "running": scheduler.running,
        "queueSize": scheduler.queue_size,
        "selectedGroupIds": state.engine.selected(),
        "clients": state.engine.roster(),
        "settings": state.engine.settings(),
        "bulk": {
            "running": bulk.running,
            "paused": bulk.paused,
            "index": bulk.index,
            "total": bulk.total,
        },
    })
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(status_payload(&state))
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<ReactSettings> {
    Json(state.engine.settings())
}

/// Merge the posted fields over the current settings, persist, and
/// recompile the roster patterns. Returns the merged result.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<Value>,
) -> ApiResult<Json<ReactSettings>> {
    let mut merged = serde_json::to_value(state.engine.settings())?;
    if let (Some(base), Some(fields)) = (merged.as_object_mut(), patch.as_object()) {
        for (key, value) in fields {
            base.insert(key.clone(), value.clone());
        }
    }
    let settings: ReactSettings = serde_json::from_value(merged)?;
    state.app_store.set("settings", serde_json::to_value(&settings)?);
    state.engine.set_settings(settings.clone());
    Ok(Json(settings))
}

pub async fn get_clients(State(state): State<Arc<AppState>>) -> Json<Vec<ClientEntry>> {
    Json(state.engine.roster())
}

#[derive(Deserialize)]
pub struct RosterUpdate {
    #[serde(default)]
    raw: String,
}

/// Replace the roster from raw `name|emoji` lines.
pub async fn update_clients(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RosterUpdate>,
) -> Json<Value> {
    let fallback = state.engine.settings().emoji;
    let roster = ClientEntry::parse_roster(&body.raw, &fallback);
    let count = roster.len();
    state.app_store.set("clients", json!(roster));
    state.engine.set_roster(roster);
    Json(json!({ "ok": true, "count": count }))
}

pub async fn list_groups(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    if !state.gateway.is_ready() {
        return Err(WamarkError::NotReady.into());
    }
    let groups = state.gateway.list_conversations().await?;
    state.engine.remember_names(&groups);
    Ok(Json(json!(groups)))
}

#[derive(Deserialize)]
pub struct GroupSelection {
    #[serde(default)]
    ids: Vec<String>,
}

pub async fn save_groups(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GroupSelection>,
) -> Json<Value> {
    let count = body.ids.len();
    state.app_store.set("selectedGroupIds", json!(body.ids));
    state.engine.set_selected(body.ids);
    Json(json!({ "ok": true, "count": count }))
}

pub async fn saved_groups(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.engine.selected())
}

/// Reload the persisted settings, roster, and selection into the engine,
/// then start the dispatch worker.
pub async fn start(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    if let Some(value) = state.app_store.get("settings")
        && let Ok(settings) = serde_json::from_value::<ReactSettings>(value)
    {
        state.engine.set_settings(settings);
    }
    if let Some(value) = state.app_store.get("clients")
        && let Ok(roster) = serde_json::from_value::<Vec<ClientEntry>>(value)
    {
        state.engine.set_roster(roster);
    }
    if let Some(value) = state.app_store.get("selectedGroupIds")
        && let Ok(ids) = serde_json::from_value::<Vec<String>>(value)
    {
        state.engine.set_selected(ids);
    }
    state.scheduler.start()?;
    Ok(Json(status_payload(&state)))
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.scheduler.stop();
    Json(status_payload(&state))
}

pub async fn last_checked(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.tracker.last_checked_map()))
}

pub async fn backlog_process(
    State(state): State<Arc<AppState>>,
    query: Option<Json<BacklogQuery>>,
) -> ApiResult<Json<Value>> {
    let query = query.map(|Json(q)| q).unwrap_or_default();
    let enqueued = state.reconciler.process(&query).await?;
    Ok(Json(json!({ "ok": true, "enqueued": enqueued })))
}

pub async fn backlog_check(
    State(state): State<Arc<AppState>>,
    query: Option<Json<BacklogQuery>>,
) -> ApiResult<Json<Value>> {
    let query = query.map(|Json(q)| q).unwrap_or_default();
    let count = state.reconciler.count(&query).await?;
    Ok(Json(json!(count)))
}

#[derive(Deserialize)]
pub struct BulkStartRequest {
    #[serde(default, rename = "groupId")]
    group_id: String,
    #[serde(default)]
    messages: Vec<String>,
    #[serde(rename = "delaySec")]
    delay_secs: Option<u64>,
    rpm: Option<u32>,
}

pub async fn bulk_start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkStartRequest>,
) -> ApiResult<Json<Value>> {
    let delay = req.delay_secs.unwrap_or(state.bulk_defaults.delay_secs);
    let rpm = req.rpm.unwrap_or(state.bulk_defaults.rate_per_minute);
    state.bulk.start(&req.group_id, req.messages, delay, rpm)?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn bulk_pause(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.bulk.pause();
    Json(json!({ "ok": true }))
}

pub async fn bulk_resume(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state.bulk.resume()?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn bulk_cancel(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.bulk.cancel();
    Json(json!({ "ok": true }))
}

pub async fn bulk_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(status_payload(&state))
}

/// Unvalidated passthrough: the composer UI round-trips its draft here.
pub async fn save_bulk_draft(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.bulk_store.set("draft", body);
    Json(json!({ "ok": true }))
}

pub async fn get_bulk_draft(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.bulk_store.get("draft").unwrap_or(Value::Null))
}

pub async fn save_bulk_settings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.bulk_store.set("settings", body);
    Json(json!({ "ok": true }))
}

pub async fn get_bulk_settings(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.bulk_store.get("settings").unwrap_or_else(|| {
        json!({
            "delaySec": state.bulk_defaults.delay_secs,
            "rpm": state.bulk_defaults.rate_per_minute,
        })
    }))
}
