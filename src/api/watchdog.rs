//! Client health watchdog: notices when the heartbeat client goes quiet.

use super::dashboard::save_state_snapshot;
use super::state::AppState;
use crate::storage::{self, EventKind};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, warn};

/// If the client has been silent for longer than the configured timeout,
/// record the disconnect and clear the last-seen marker. Returns `true` when
/// a disconnect was recorded.
pub async fn check_client(state: &AppState, now: DateTime<Utc>) -> Result<bool> {
    let Some(silent_for) = state.client.seconds_since(now) else {
        return Ok(false);
    };
    if silent_for <= state.client_timeout_secs as f64 {
        return Ok(false);
    }

    // Cleared first so a failed write below is not reported again next tick.
    state.client.clear();
    let mode = state.control.mode();
    warn!(silent_for, "Client disconnected");
    storage::log_event(
        &state.pool,
        EventKind::ClientDisconnected,
        &format!("no update for {silent_for:.1}s"),
        mode,
    )?;
    save_state_snapshot(state, "client_disconnected").await?;
    Ok(true)
}

/// Run [`check_client`] every `interval` until the task is aborted.
pub async fn run_client_watchdog(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = check_client(&state, Utc::now()).await {
            error!(error = %e, "Client watchdog check failed");
        }
    }
}
