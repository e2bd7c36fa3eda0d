//! Simulated monitoring client.
//!
//! Posts a small batch of random readings to `/update` on a timer. Each post
//! triggers one classification cycle on the server. The client gives up after
//! `max_failures` consecutive failed posts.

use crate::traffic::AttackMode;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Granularity at which a sleeping client notices a stop request.
const STOP_POLL: Duration = Duration::from_millis(500);

/// `[heartbeat]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub server_url: String,
    pub interval_secs: u64,
    pub max_failures: u32,
    pub entries_per_update: u32,
    pub request_timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            interval_secs: 5,
            max_failures: 3,
            entries_per_update: 5,
            request_timeout_secs: 10,
        }
    }
}

/// One reading in an `/update` body. `value` is also accepted as `random_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(rename = "random_value", alias = "value")]
    pub value: f64,
    pub client_timestamp: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSummary {
    pub sent: u64,
    pub failed: u64,
}

pub struct HeartbeatClient {
    client: Client,
    config: HeartbeatConfig,
    rng: StdRng,
    running: Arc<AtomicBool>,
    consecutive_failures: u32,
}

impl HeartbeatClient {
    pub fn new(config: HeartbeatConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: HeartbeatConfig, rng: StdRng) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            rng,
            running: Arc::new(AtomicBool::new(true)),
            consecutive_failures: 0,
        })
    }

    /// Clearing this flag stops [`HeartbeatClient::run`] within one poll period.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn generate_entries(&mut self) -> Vec<HeartbeatEntry> {
        let now = chrono::Utc::now().to_rfc3339();
        (1..=self.config.entries_per_update)
            .map(|id| HeartbeatEntry {
                id: Some(id),
                value: (self.rng.gen_range(0.0..100.0_f64) * 100.0).round() / 100.0,
                client_timestamp: now.clone(),
            })
            .collect()
    }

    /// POST one batch of entries. Any non-2xx status is an error.
    pub async fn send_update(&mut self) -> Result<()> {
        let url = format!("{}/update", self.config.server_url.trim_end_matches('/'));
        let entries = self.generate_entries();
        let response = self
            .client
            .post(&url)
            .json(&entries)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("server returned {status}");
        }
        Ok(())
    }

    /// Time to wait before the next post. Attack modes that the server
    /// associates with client-side flooding or congestion shorten or stretch it.
    pub fn next_interval(&mut self, mode: AttackMode) -> Duration {
        match mode {
            AttackMode::DdosVolumetric | AttackMode::SynFlood | AttackMode::DnsAmplification => {
                Duration::from_secs(1)
            }
            AttackMode::PortScan => Duration::from_secs_f64(self.rng.gen_range(0.5..2.0)),
            AttackMode::DataExfiltration => Duration::from_secs_f64(self.rng.gen_range(7.0..12.0)),
            AttackMode::Normal | AttackMode::BotnetC2 => {
                Duration::from_secs(self.config.interval_secs)
            }
        }
    }

    /// Post until stopped or until `max_failures` consecutive posts fail.
    /// Pacing follows whatever mode `mode_rx` currently holds.
    pub async fn run(mut self, mode_rx: watch::Receiver<AttackMode>) -> HeartbeatSummary {
        info!(server = %self.config.server_url, mode = %*mode_rx.borrow(), "Heartbeat client started");
        let mut summary = HeartbeatSummary::default();

        while self.running.load(Ordering::SeqCst) {
            if self.consecutive_failures >= self.config.max_failures {
                warn!(
                    failures = self.consecutive_failures,
                    "Too many failed updates, stopping heartbeat client"
                );
                break;
            }

            match self.send_update().await {
                Ok(()) => {
                    summary.sent += 1;
                    self.consecutive_failures = 0;
                    debug!(sent = summary.sent, "Heartbeat delivered");
                }
                Err(e) => {
                    summary.failed += 1;
                    self.consecutive_failures += 1;
                    warn!(error = %e, failures = self.consecutive_failures, "Heartbeat failed");
                }
            }

            let mode = *mode_rx.borrow();
            let interval = self.next_interval(mode);
            self.sleep_unless_stopped(interval).await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!(sent = summary.sent, failed = summary.failed, "Heartbeat client stopped");
        summary
    }

    async fn sleep_unless_stopped(&self, total: Duration) {
        let mut remaining = total;
        while !remaining.is_zero() && self.running.load(Ordering::SeqCst) {
            let step = remaining.min(STOP_POLL);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
    }
}

struct ActiveClient {
    running: Arc<AtomicBool>,
    task: JoinHandle<HeartbeatSummary>,
}

impl ActiveClient {
    fn is_alive(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

/// Starts and stops an in-process [`HeartbeatClient`] at runtime. At most
/// one client runs at a time. Cheap to clone.
#[derive(Clone)]
pub struct ClientSupervisor {
    config: HeartbeatConfig,
    mode_rx: watch::Receiver<AttackMode>,
    active: Arc<Mutex<Option<ActiveClient>>>,
}

impl ClientSupervisor {
    pub fn new(config: HeartbeatConfig, mode_rx: watch::Receiver<AttackMode>) -> Self {
        Self {
            config,
            mode_rx,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    /// Spawn a client unless one is already running. Returns `false` when
    /// a live client was left in place.
    pub async fn start(&self) -> Result<bool> {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(ActiveClient::is_alive) {
            return Ok(false);
        }

        let client = HeartbeatClient::new(self.config.clone())?;
        let running = client.running_flag();
        let task = tokio::spawn(client.run(self.mode_rx.clone()));
        *active = Some(ActiveClient { running, task });
        info!(server = %self.config.server_url, "Heartbeat client spawned");
        Ok(true)
    }

    /// Ask the running client to stop. Returns `false` when none was running.
    pub async fn stop(&self) -> bool {
        let Some(client) = self.active.lock().await.take() else {
            return false;
        };
        let was_alive = client.is_alive();
        client.running.store(false, Ordering::SeqCst);
        was_alive
    }

    pub async fn is_running(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(ActiveClient::is_alive)
    }

    /// Stop the client and wait for its task to finish.
    pub async fn shutdown(&self) -> Option<HeartbeatSummary> {
        let client = self.active.lock().await.take()?;
        client.running.store(false, Ordering::SeqCst);
        client.task.await.ok()
    }
}
