use anyhow::Result;
use clap::{Parser, Subcommand};

use txwatch::detect::engine::DetectionEngine;

#[derive(Parser)]
#[command(
    name = "txwatch",
    about = "Early-warning anomaly alerting for payment transaction pipelines",
    version,
    long_about = None
)]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "txwatch.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + detection engine)
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Rebuild baselines and the outlier model from a historical CSV
    Baseline {
        /// CSV file with time,status,count columns
        #[arg(long)]
        input: String,
    },

    /// One-shot detection: train on a historical CSV, classify a live CSV
    Detect {
        /// Historical CSV used to build the baseline
        #[arg(long)]
        history: String,

        /// CSV batch to classify
        #[arg(long)]
        input: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List recently stored anomaly records
    Anomalies {
        /// Maximum records to show
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = txwatch::config::load(&cli.config);

    match cli.command {
        Commands::Serve { bind } => {
            let mut cfg = cfg;
            if let Some(bind) = bind {
                cfg.bind = bind;
            }
            tracing::info!(bind = %cfg.bind, "Starting txwatch daemon");
            txwatch::serve(cfg).await?;
        }
        Commands::Baseline { input } => {
            let history = txwatch::ingest::load_csv(&input)?;
            let engine = DetectionEngine::new(cfg.forest.clone());
            engine.update_baseline(&history)?;

            let pool = txwatch::storage::open_pool(&cfg.db_path)?;
            let entries = engine.baseline_entries();
            txwatch::storage::replace_baselines(&pool, &entries)?;

            println!(
                "Baseline rebuilt: {} entries from {} observations (model trained: {})",
                entries.len(),
                history.len(),
                engine.is_trained()
            );
        }
        Commands::Detect {
            history,
            input,
            json,
        } => {
            let historical = txwatch::ingest::load_csv(&history)?;
            let batch = txwatch::ingest::load_csv(&input)?;

            let engine = DetectionEngine::new(cfg.forest.clone());
            engine.update_baseline(&historical)?;
            let records = engine.detect_anomalies(&batch)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No anomalies detected ({} observations).", batch.len());
            } else {
                println!("{:<8} | {:<16} | {:>7} | {:<8} | Reason", "Time", "Status", "Count", "Level");
                println!("{:-<8}-|-{:-<16}-|-{:-<7}-|-{:-<8}-|-{:-<40}", "", "", "", "", "");
                for rec in &records {
                    println!(
                        "{:<8} | {:<16} | {:>7} | {:<8} | {}",
                        rec.time,
                        rec.status.as_str(),
                        rec.count,
                        rec.level.as_str(),
                        rec.message
                    );
                }
                println!("\n{} anomalies detected.", records.len());
            }
        }
        Commands::Anomalies { limit } => {
            let pool = txwatch::storage::open_pool(&cfg.db_path)?;
            let records = txwatch::storage::list_recent_anomalies(&pool, limit)?;
            if records.is_empty() {
                println!("No anomalies recorded.");
            } else {
                for rec in &records {
                    println!(
                        "{} {} {} count={} score={:.2} :: {}",
                        rec.level.as_str(),
                        rec.time,
                        rec.status.as_str(),
                        rec.count,
                        rec.score,
                        rec.message
                    );
                }
            }
        }
    }

    Ok(())
}
