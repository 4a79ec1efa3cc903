//! coinflow ingestion service entry point.

use anyhow::Result;
use clap::Parser;
use coinflow_ingest::config::DEFAULT_CONFIG_PATH;
use tracing::info;

/// Stream exchange ticker updates into PostgreSQL.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via COINFLOW_CONFIG env var)
    #[arg(short, long, env = "COINFLOW_CONFIG")]
    config: Option<String>,

    /// Keep records in memory instead of writing to PostgreSQL
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any wss:// connection
    coinflow_ws::init_crypto();

    let args = Args::parse();

    coinflow_telemetry::init_logging()?;

    info!("Starting coinflow-ingest v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = coinflow_ingest::AppConfig::load(&config_path)?;
    info!(
        feed_url = %config.feed.url,
        db_host = %config.database.host,
        db_name = %config.database.name,
        "Configuration loaded"
    );

    coinflow_ingest::Application::new(config)
        .with_dry_run(args.dry_run)
        .run()
        .await?;

    Ok(())
}
