//! Top-level dashboard routes: client updates, attack simulation controls,
//! and the analytics views.

use super::error::ApiError;
use super::state::AppState;
use crate::detect::AttackCategory;
use crate::heartbeat::HeartbeatEntry;
use crate::storage::{self, EventKind};
use crate::traffic::AttackMode;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Detected attacks scoring above this also get a state snapshot.
pub const SNAPSHOT_SCORE: f64 = 0.8;

const DASHBOARD_EVENTS: usize = 10;

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/update", post(update))
        .route("/simulate/{mode}", get(simulate))
        .route("/simulate_dos", get(simulate_dos))
        .route("/simulate_flooding", get(simulate_flooding))
        .route("/simulate_congestion", get(simulate_congestion))
        .route("/stop_attack", get(stop_attack))
        .route("/start_client", get(start_client))
        .route("/stop_client", get(stop_client))
        .route("/force_save_state", get(force_save_state))
        .route("/packet_analytics", get(packet_analytics))
}

/// Point-in-time view of the monitor, as stored in `state_snapshots`.
pub(crate) async fn snapshot_value(state: &AppState) -> Value {
    let now = Utc::now();
    let stats = state.monitor.stats().await;
    let latest = state.monitor.latest().await;
    let recent = state.monitor.recent(DASHBOARD_EVENTS).await;
    json!({
        "timestamp": now.to_rfc3339(),
        "attack_mode": state.control.mode(),
        "client_connected": state.client.is_connected(now, state.client_timeout_secs),
        "client_last_seen": state.client.last_seen().map(|t| t.to_rfc3339()),
        "stats": stats,
        "latest_analysis": latest,
        "recent_analyses": recent,
    })
}

pub(crate) async fn save_state_snapshot(state: &AppState, reason: &str) -> anyhow::Result<i64> {
    let snapshot = snapshot_value(state).await;
    let id = storage::save_snapshot(&state.pool, reason, state.control.mode(), &snapshot)?;
    info!(id, %reason, "State snapshot saved");
    Ok(id)
}

async fn dashboard(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let events = storage::recent_events(&state.pool, DASHBOARD_EVENTS)?;
    let stats = state.monitor.stats().await;
    let latest = state.monitor.latest().await;
    let heartbeat_running = state.heartbeat.is_running().await;
    Ok(Json(json!({
        "attack_mode": state.control.mode(),
        "latest_analysis": latest,
        "stats": stats,
        "client": {
            "connected": state.client.is_connected(now, state.client_timeout_secs),
            "last_seen": state.client.last_seen().map(|t| t.to_rfc3339()),
            "seconds_since_update": state.client.seconds_since(now),
            "heartbeat_running": heartbeat_running,
        },
        "recent_events": events,
    })))
}

/// One heartbeat from the client: persist it and run one analysis cycle.
async fn update(
    State(state): State<AppState>,
    Json(entries): Json<Vec<HeartbeatEntry>>,
) -> Result<Json<Value>, ApiError> {
    if entries.is_empty() {
        return Err(ApiError::BadRequest("No data received".to_string()));
    }

    state.client.mark_seen();
    let mode = state.control.mode();
    storage::save_heartbeats(&state.pool, &entries)?;

    // Persisted before it becomes visible in the in-memory history.
    let record = state.monitor.classify_window().await;
    storage::save_analysis(&state.pool, &record, mode)?;
    state.monitor.remember(record.clone()).await;
    storage::log_event(
        &state.pool,
        EventKind::ClientUpdate,
        &format!("{} entries, verdict {}", entries.len(), record.label),
        mode,
    )?;

    if record.attack_detected {
        warn!(
            label = %record.label,
            severity = %record.severity,
            combined = record.combined_score,
            "Attack detected"
        );
        storage::log_event(
            &state.pool,
            EventKind::AttackDetected,
            &format!(
                "{} (combined {:.3}, confidence {:.3})",
                record.label, record.combined_score, record.confidence
            ),
            mode,
        )?;
        if record.combined_score > SNAPSHOT_SCORE {
            save_state_snapshot(&state, "attack_detected").await?;
        }
    }

    Ok(Json(json!({ "status": "success", "message": "Data updated" })))
}

/// Switch the generator to `mode`. Counters reset only on an actual change.
async fn apply_mode(state: &AppState, mode: AttackMode) -> Result<Json<Value>, ApiError> {
    let previous = state.control.mode();
    if state.control.set_mode(mode) {
        state.monitor.reset_counters().await;
        info!(from = %previous, to = %mode, "Attack mode changed");
        storage::log_event(
            &state.pool,
            EventKind::ModeChanged,
            &format!("{previous} -> {mode}"),
            mode,
        )?;
    }

    let message = if mode.is_attack() {
        format!("Simulating {mode}")
    } else {
        "Attack simulation stopped".to_string()
    };
    Ok(Json(json!({
        "status": "success",
        "message": message,
        "attack_mode": mode,
        "previous_mode": previous,
    })))
}

async fn simulate(
    State(state): State<AppState>,
    Path(mode): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mode: AttackMode = mode.parse()?;
    apply_mode(&state, mode).await
}

async fn simulate_dos(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    apply_mode(&state, AttackMode::DdosVolumetric).await
}

async fn simulate_flooding(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    apply_mode(&state, AttackMode::PortScan).await
}

async fn simulate_congestion(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    apply_mode(&state, AttackMode::DataExfiltration).await
}

async fn stop_attack(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    apply_mode(&state, AttackMode::Normal).await
}

async fn start_client(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let started = state.heartbeat.start().await?;
    let message = if started {
        storage::log_event(
            &state.pool,
            EventKind::ClientStarted,
            &format!("heartbeat client started against {}", state.heartbeat.server_url()),
            state.control.mode(),
        )?;
        "Client started"
    } else {
        "Client already running"
    };
    Ok(Json(json!({
        "status": "success",
        "message": message,
        "client_running": true,
    })))
}

async fn stop_client(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stopped = state.heartbeat.stop().await;
    let message = if stopped {
        storage::log_event(
            &state.pool,
            EventKind::ClientManuallyStopped,
            "heartbeat client stopped",
            state.control.mode(),
        )?;
        "Client stopped"
    } else {
        "Client was not running"
    };
    Ok(Json(json!({
        "status": "success",
        "message": message,
        "client_running": false,
    })))
}

async fn force_save_state(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mode = state.control.mode();
    let record = state.monitor.classify_window().await;
    storage::save_analysis(&state.pool, &record, mode)?;
    state.monitor.remember(record.clone()).await;
    let id = save_state_snapshot(&state, "manual").await?;
    storage::log_event(
        &state.pool,
        EventKind::ManualSnapshot,
        &format!("snapshot {id}"),
        mode,
    )?;

    Ok(Json(json!({
        "status": "success",
        "message": "State saved",
        "snapshot_id": id,
        "analysis": record,
    })))
}

async fn packet_analytics(State(state): State<AppState>) -> Json<Value> {
    let classifier = state.monitor.classifier();
    let config = classifier.config();
    let scorer = classifier.scorer();

    let categories: Vec<Value> = AttackCategory::ALL
        .into_iter()
        .map(|c| {
            json!({
                "name": c.as_str(),
                "severity": c.severity(),
                "description": c.description(),
                "mitigation": c.mitigation(),
            })
        })
        .collect();

    let model = json!({
        "version": scorer.version,
        "hidden_units": scorer.hidden_units,
        "n_hidden": scorer.n_hidden(),
        "feature_names": scorer.feature_names,
    });
    let thresholds = json!({
        "window_size": config.window_size,
        "min_packets": config.min_packets,
        "confidence_threshold": config.confidence_threshold,
        "attack_threshold": config.attack_threshold,
        "scorer_weight": config.scorer_weight,
        "rule_weight": config.rule_weight,
        "rules": config.rules,
    });

    let latest = state.monitor.latest().await;
    let stats = state.monitor.stats().await;

    Json(json!({
        "model": model,
        "thresholds": thresholds,
        "attack_mode": state.control.mode(),
        "current_prediction": latest,
        "supported_categories": categories,
        "real_time_stats": stats,
    }))
}
