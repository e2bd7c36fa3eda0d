//! `/api/v1` route definitions.

use super::error::ApiError;
use super::state::AppState;
use crate::storage;
use axum::extract::{Query, State};
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/analysis/latest", get(analysis_latest))
        .route("/analysis/history", get(analysis_history))
        .route("/stats", get(stats))
        .route("/events", get(events))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "attack_mode": state.control.mode(),
            "uptime_secs": uptime
        },
        "meta": meta()
    }))
}

async fn analysis_latest(State(state): State<AppState>) -> Json<Value> {
    match state.monitor.latest().await {
        Some(record) => Json(json!({ "data": record, "meta": meta() })),
        None => Json(json!({ "data": null, "meta": { "message": "no analysis yet" } })),
    }
}

async fn analysis_history(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Json<Value> {
    let records = state.monitor.recent(q.resolve()).await;
    let total = records.len();
    Json(json!({ "data": records, "meta": { "total": total } }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.monitor.stats().await;
    let window_packets = state.monitor.window_len().await;
    Json(json!({
        "data": {
            "attack_mode": state.control.mode(),
            "window_packets": window_packets,
            "traffic": stats
        },
        "meta": meta()
    }))
}

async fn events(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let events = storage::recent_events(&state.pool, q.resolve())?;
    let total = events.len();
    Ok(Json(json!({ "data": events, "meta": { "total": total } })))
}
