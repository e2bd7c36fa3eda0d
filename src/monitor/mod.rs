//! Aggregator/store -- owns the packet window, running counters, and the
//! analysis history behind a single async mutex.

pub mod history;
pub mod stats;

pub use history::{AnalysisHistory, PacketWindow};
pub use stats::{RunningStats, StatsSnapshot};

use crate::detect::{AnalysisRecord, Classifier};
use crate::traffic::generator::unix_now;
use crate::traffic::Packet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// `[monitor]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub history_capacity: usize,
    pub packet_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: history::DEFAULT_HISTORY_CAPACITY,
            packet_capacity: history::DEFAULT_PACKET_CAPACITY,
        }
    }
}

struct MonitorState {
    window: PacketWindow,
    stats: RunningStats,
    history: AnalysisHistory,
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
    classifier: Arc<Classifier>,
}

impl Monitor {
    pub fn new(classifier: Arc<Classifier>, config: &MonitorConfig) -> Self {
        let state = MonitorState {
            window: PacketWindow::with_capacity(config.packet_capacity),
            stats: RunningStats::new(),
            history: AnalysisHistory::with_capacity(config.history_capacity),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            classifier,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub async fn ingest(&self, batch: Vec<Packet>) {
        let mut state = self.state.lock().await;
        for packet in &batch {
            state.stats.record(packet);
        }
        state.window.extend(batch);
    }

    /// Classify the trailing window and append the record to the history.
    pub async fn analyze(&self) -> AnalysisRecord {
        let record = self.classify_window().await;
        self.remember(record.clone()).await;
        record
    }

    /// Classify the trailing window without touching the history.
    pub async fn classify_window(&self) -> AnalysisRecord {
        let window = {
            let state = self.state.lock().await;
            state.window.tail(self.classifier.config().window_size)
        };
        let record = self.classifier.classify(&window);
        debug!(label = %record.label, combined = record.combined_score, "Analysis cycle");
        record
    }

    /// Append an already-computed record to the history.
    pub async fn remember(&self, record: AnalysisRecord) {
        self.state.lock().await.history.push(record);
    }

    /// Zero the running counters. The packet window and history are kept.
    pub async fn reset_counters(&self) {
        let mut state = self.state.lock().await;
        state.stats = RunningStats::new();
        info!("Traffic counters reset");
    }

    pub async fn latest(&self) -> Option<AnalysisRecord> {
        self.state.lock().await.history.latest().cloned()
    }

    pub async fn recent(&self, k: usize) -> Vec<AnalysisRecord> {
        self.state.lock().await.history.recent(k)
    }

    pub async fn stats(&self) -> StatsSnapshot {
        self.stats_at(unix_now()).await
    }

    pub async fn stats_at(&self, now: f64) -> StatsSnapshot {
        self.state.lock().await.stats.snapshot(now)
    }

    pub async fn window_len(&self) -> usize {
        self.state.lock().await.window.len()
    }
}

/// Drain generator batches into `monitor` until every sender is dropped.
pub async fn run_ingest_loop(monitor: Monitor, mut receiver: mpsc::Receiver<Vec<Packet>>) {
    info!("Ingest loop started");
    while let Some(batch) = receiver.recv().await {
        monitor.ingest(batch).await;
    }
    info!("Ingest loop stopped");
}
