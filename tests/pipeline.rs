//! End-to-end: a real server on an ephemeral port, driven by the heartbeat client.

use packetsentry::config::SentryConfig;
use packetsentry::heartbeat::{HeartbeatClient, HeartbeatConfig};
use serde_json::Value;
use std::time::Duration;

async fn start_server(dir: &tempfile::TempDir) -> String {
    let mut config = SentryConfig::default();
    config.server.db_path = dir.path().join("pipeline.db");
    config.generator.seed = Some(5);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(packetsentry::serve_on(listener, config, false));
    base
}

async fn get_json(client: &reqwest::Client, url: &str) -> Value {
    client.get(url).send().await.unwrap().json().await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heartbeat_drives_classification() {
    let dir = tempfile::TempDir::new().unwrap();
    let base = start_server(&dir).await;
    let http = reqwest::Client::new();

    // Switch to a high-rate attack and let the generator fill the window.
    let resp = get_json(&http, &format!("{base}/simulate/syn_flood")).await;
    assert_eq!(resp["attack_mode"], "syn_flood");
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut client = HeartbeatClient::new(HeartbeatConfig {
        server_url: base.clone(),
        ..Default::default()
    })
    .unwrap();
    client.send_update().await.unwrap();

    let latest = get_json(&http, &format!("{base}/api/v1/analysis/latest")).await;
    assert_eq!(latest["data"]["label"], "syn_flood");
    assert_eq!(latest["data"]["attack_detected"], true);

    let events = get_json(&http, &format!("{base}/api/v1/events?limit=10")).await;
    let kinds: Vec<&str> = events["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["event_type"].as_str())
        .collect();
    assert!(kinds.contains(&"CLIENT_UPDATE"));
    assert!(kinds.contains(&"ATTACK_DETECTED"));
    assert!(kinds.contains(&"MODE_CHANGED"));

    let dashboard = get_json(&http, &format!("{base}/")).await;
    assert_eq!(dashboard["client"]["connected"], true);
    assert!(dashboard["stats"]["total_packets"].as_u64().unwrap() > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_attack_returns_to_normal() {
    let dir = tempfile::TempDir::new().unwrap();
    let base = start_server(&dir).await;
    let http = reqwest::Client::new();

    get_json(&http, &format!("{base}/simulate_dos")).await;
    let resp = get_json(&http, &format!("{base}/stop_attack")).await;
    assert_eq!(resp["attack_mode"], "normal");

    let health = get_json(&http, &format!("{base}/api/v1/health")).await;
    assert_eq!(health["data"]["attack_mode"], "normal");

    let status = http
        .post(format!("{base}/update"))
        .json(&Vec::<Value>::new())
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 400);
}
