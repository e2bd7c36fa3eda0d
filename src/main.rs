use anyhow::Result;
use clap::{Parser, Subcommand};
use packetsentry::config::{LoggingConfig, SentryConfig};
use packetsentry::heartbeat::HeartbeatClient;
use packetsentry::traffic::AttackMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "packetsentry",
    about = "Simulated network traffic classifier",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $PACKETSENTRY_CONFIG, then /etc/packetsentry/packetsentry.toml)
    #[arg(long, global = true, env = "PACKETSENTRY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (generator + classifier + API server)
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Also run the simulated heartbeat client in-process
        #[arg(long)]
        heartbeat: bool,
    },

    /// Run the simulated client against a running server
    Heartbeat {
        /// Server base URL
        #[arg(long)]
        server: Option<String>,

        /// Seconds between updates in normal mode
        #[arg(long)]
        interval: Option<u64>,

        /// Attack mode whose client pacing to imitate
        #[arg(long, default_value = "normal")]
        mode: String,
    },

    /// Generate traffic offline and classify it once
    Classify {
        /// Attack mode to generate
        #[arg(long, default_value = "normal")]
        mode: String,

        /// Number of generator ticks
        #[arg(long, default_value = "20")]
        ticks: usize,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show persisted analysis records
    History {
        /// SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Number of records
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// List attack modes
    Modes,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = SentryConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind, db, heartbeat } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(db) = db {
                config.server.db_path = db;
            }
            tracing::info!(bind = %config.server.bind, "Starting packetsentry daemon");
            packetsentry::serve(config, heartbeat).await?;
        }
        Commands::Heartbeat {
            server,
            interval,
            mode,
        } => {
            if let Some(server) = server {
                config.heartbeat.server_url = server;
            }
            if let Some(interval) = interval {
                config.heartbeat.interval_secs = interval;
            }
            let mode: AttackMode = mode.parse()?;
            let (_mode_tx, mode_rx) = tokio::sync::watch::channel(mode);
            let client = HeartbeatClient::new(config.heartbeat)?;

            let stop = client.running_flag();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop.store(false, std::sync::atomic::Ordering::SeqCst);
                }
            });

            let summary = client.run(mode_rx).await;
            println!("Sent {} updates, {} failed.", summary.sent, summary.failed);
        }
        Commands::Classify {
            mode,
            ticks,
            seed,
            json,
        } => {
            let mode: AttackMode = mode.parse()?;
            let record = packetsentry::classify_offline(&config.detector, mode, ticks, seed)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("\n=== packetsentry Analysis ===");
                println!("Mode:        {}", mode);
                println!("Packets:     {}", record.packet_count);
                println!("Verdict:     {}", record.label);
                println!("Severity:    {}", record.severity);
                println!("Confidence:  {:.3}", record.confidence);
                println!(
                    "Scores:      rule {:.3} | scorer {:.3} | combined {:.3}",
                    record.rule_score, record.scorer_score, record.combined_score
                );
                println!("Attack:      {}", if record.attack_detected { "DETECTED" } else { "no" });
                println!("\n{}", record.description);
                println!(" -> {}", record.recommendation);
                println!("=============================\n");
            }
        }
        Commands::History { db, limit } => {
            let db = db.unwrap_or(config.server.db_path);
            let pool = packetsentry::storage::open_pool(&db)?;
            let records = packetsentry::storage::recent_analyses(&pool, limit)?;
            if records.is_empty() {
                println!("No analyses recorded.");
            } else {
                println!(
                    "{:<25} | {:<18} | {:<8} | {:>8} | Attack",
                    "Timestamp", "Verdict", "Severity", "Combined"
                );
                println!("{:-<25}-|-{:-<18}-|-{:-<8}-|-{:-<8}-|-{:-<6}", "", "", "", "", "");
                for r in records {
                    println!(
                        "{:<25} | {:<18} | {:<8} | {:>8.3} | {}",
                        r.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        r.label.as_str(),
                        r.severity.to_string(),
                        r.combined_score,
                        r.attack_detected
                    );
                }
            }
        }
        Commands::Modes => {
            println!("{:<18} | {:>8} | Severity", "Mode", "Tick");
            println!("{:-<18}-|-{:-<8}-|-{:-<8}", "", "", "");
            for mode in AttackMode::ALL {
                let severity = mode
                    .category()
                    .map(|c| c.severity().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<18} | {:>6}ms | {}",
                    mode.as_str(),
                    mode.tick_interval().as_millis(),
                    severity
                );
            }
        }
    }

    Ok(())
}
