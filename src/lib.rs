//! packetsentry -- simulated network traffic classifier.
//!
//! Synthetic packets are generated according to a selectable attack mode,
//! reduced to a feature vector over a trailing window, and scored by a rule
//! engine and a small feed-forward scorer. Results are kept in memory,
//! persisted to SQLite, and served over HTTP.

pub mod api;
pub mod config;
pub mod detect;
pub mod heartbeat;
pub mod monitor;
pub mod storage;
pub mod traffic;

use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::SentryConfig;
use crate::detect::{AnalysisRecord, Classifier, ClassifierConfig};
use crate::monitor::{Monitor, PacketWindow};
use crate::traffic::generator::{spawn_generator, unix_now, PacketGenerator};
use crate::traffic::{AttackMode, SimulationControl};

/// Start the daemon: generator, ingest loop, client watchdog, and API server.
pub async fn serve(config: SentryConfig, with_heartbeat: bool) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve_on(listener, config, with_heartbeat).await
}

/// Like [`serve`], on an already-bound listener.
pub async fn serve_on(listener: TcpListener, config: SentryConfig, with_heartbeat: bool) -> Result<()> {
    // 1. Storage
    let db_path = config.server.db_path.display().to_string();
    tracing::info!(%db_path, "Initializing database");
    let pool = storage::open_pool(&config.server.db_path)?;

    // 2. Classifier + monitor
    let classifier = Arc::new(Classifier::new(config.detector.clone())?);
    let monitor = Monitor::new(classifier, &config.monitor);
    let control = SimulationControl::default();

    // 3. Generator -> ingest pipeline
    let (tx, rx) = mpsc::channel(config.generator.channel_capacity.max(1));
    let generator = match config.generator.seed {
        Some(seed) => PacketGenerator::seeded(seed),
        None => PacketGenerator::from_entropy(),
    };
    let generator_handle = spawn_generator(generator, control.subscribe(), tx);
    tokio::spawn(monitor::run_ingest_loop(monitor.clone(), rx));

    // 4. Client watchdog
    let local_addr = listener.local_addr()?;
    let mut hb_config = config.heartbeat.clone();
    hb_config.server_url = format!("http://{}", loopback(local_addr));
    let state = api::AppState::new(pool, monitor, control.clone())
        .with_client_timeout(config.server.client_timeout_secs)
        .with_heartbeat(hb_config);
    let watchdog = tokio::spawn(api::watchdog::run_client_watchdog(
        state.clone(),
        Duration::from_secs(config.server.watchdog_interval_secs.max(1)),
    ));

    // 5. Optional in-process heartbeat client, also controllable over HTTP
    let heartbeat = state.heartbeat.clone();
    if with_heartbeat {
        heartbeat.start().await?;
    }

    // 6. API server
    let app = api::router(state);
    tracing::info!(addr = %local_addr, "packetsentry listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    watchdog.abort();
    heartbeat.stop().await;
    generator_handle.shutdown().await;
    tracing::info!("packetsentry stopped");

    result.context("HTTP server failed")
}

/// Address a co-located client should dial for a listener bound to `addr`.
fn loopback(addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
    } else {
        addr
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Generate `ticks` batches of `mode` traffic with a seeded generator and
/// classify the trailing window once. No server or database involved.
pub fn classify_offline(
    detector: &ClassifierConfig,
    mode: AttackMode,
    ticks: usize,
    seed: u64,
) -> Result<AnalysisRecord> {
    let classifier = Classifier::new(detector.clone())?;
    let mut generator = PacketGenerator::seeded(seed);
    let step = mode.tick_interval().as_secs_f64();
    let start = unix_now();

    let mut window = PacketWindow::default();
    for tick in 0..ticks {
        window.extend(generator.next_batch(mode, start + tick as f64 * step));
    }
    Ok(classifier.classify(&window.tail(detector.window_size)))
}
