use crate::heartbeat::{ClientSupervisor, HeartbeatConfig};
use crate::monitor::Monitor;
use crate::storage::Pool;
use crate::traffic::SimulationControl;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub monitor: Monitor,
    pub control: SimulationControl,
    pub client: ClientTracker,
    /// In-process heartbeat client, started and stopped from the dashboard.
    pub heartbeat: ClientSupervisor,
    /// Seconds without an `/update` before the client counts as disconnected.
    pub client_timeout_secs: u64,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(pool: Pool, monitor: Monitor, control: SimulationControl) -> Self {
        let heartbeat = ClientSupervisor::new(HeartbeatConfig::default(), control.subscribe());
        Self {
            pool,
            monitor,
            control,
            client: ClientTracker::default(),
            heartbeat,
            client_timeout_secs: 15,
            started_at: Utc::now(),
        }
    }

    pub fn with_client_timeout(mut self, secs: u64) -> Self {
        self.client_timeout_secs = secs;
        self
    }

    /// Replace the heartbeat client settings, typically to point it at the
    /// server's own listen address.
    pub fn with_heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.heartbeat = ClientSupervisor::new(config, self.control.subscribe());
        self
    }
}

/// Time of the last `/update`, as Unix milliseconds. Zero means "never" or
/// "cleared by the watchdog".
#[derive(Clone, Default)]
pub struct ClientTracker {
    last_seen_ms: Arc<AtomicI64>,
}

impl ClientTracker {
    pub fn mark_seen(&self) {
        self.mark_seen_at(Utc::now());
    }

    pub fn mark_seen_at(&self, at: DateTime<Utc>) {
        self.last_seen_ms.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.last_seen_ms.store(0, Ordering::SeqCst);
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        match self.last_seen_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub fn seconds_since(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_seen()
            .map(|seen| (now - seen).num_milliseconds() as f64 / 1000.0)
    }

    pub fn is_connected(&self, now: DateTime<Utc>, timeout_secs: u64) -> bool {
        self.seconds_since(now)
            .is_some_and(|s| s <= timeout_secs as f64)
    }
}
