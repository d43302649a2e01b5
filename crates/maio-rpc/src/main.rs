//! MAIO RPC Server - JSON-RPC backend for the model-version lifecycle.
//!
//! Serves the lifecycle over HTTP and runs the scheduler ticker alongside it.
//! External services are reached over HTTP when their URLs are configured;
//! otherwise the in-process providers are used.

use anyhow::Result;
use clap::Parser;
use maio_core::config::SchedulerConfig;
use maio_core::external::http::{HttpDatasources, HttpDeployer, HttpPredictor, HttpTrainer};
use maio_core::{CancellationToken, MlService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "maio-rpc")]
#[command(about = "JSON-RPC server for the MAIO model lifecycle")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0", env = "MAIO_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1", env = "MAIO_HOST")]
    host: String,

    /// SQLite database file (in-memory when omitted)
    #[arg(long, env = "MAIO_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Base URL of the training service
    #[arg(long, env = "MAIO_TRAINER_URL")]
    trainer_url: Option<String>,

    /// Base URL of the inference service
    #[arg(long, env = "MAIO_PREDICTOR_URL")]
    predictor_url: Option<String>,

    /// Base URL of the deployment service
    #[arg(long, env = "MAIO_DEPLOYER_URL")]
    deployer_url: Option<String>,

    /// Base URL of the datasource service
    #[arg(long, env = "MAIO_DATASOURCE_URL")]
    datasource_url: Option<String>,

    /// Seconds between scheduler ticks
    #[arg(long, env = "MAIO_TICK_SECS")]
    tick_secs: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "MAIO_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --debug when set
    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    info!("Starting MAIO RPC Server");

    let mut builder = MlService::builder();
    if let Some(path) = &args.db_path {
        builder = builder.db_path(path);
    }
    if let Some(url) = &args.datasource_url {
        builder = builder.datasources(Arc::new(HttpDatasources::new(url)?));
    }
    if let Some(url) = &args.trainer_url {
        builder = builder.trainer(Arc::new(HttpTrainer::new(url)?));
    }
    if let Some(url) = &args.predictor_url {
        builder = builder.predictor(Arc::new(HttpPredictor::new(url)?));
    }
    if let Some(url) = &args.deployer_url {
        builder = builder.deployer(Arc::new(HttpDeployer::new(url)?));
    }
    let service = builder.build()?;

    let period = args
        .tick_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(SchedulerConfig::TICK_INTERVAL);
    let cancel = CancellationToken::new();
    let ticker = {
        let schedulers = service.schedulers().clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { schedulers.run_ticker(period, cancel).await })
    };

    let addr = maio_rpc::start_server(service, &args.host, args.port).await?;

    // Port line for process supervisors that bind to port 0
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping scheduler");
    cancel.cancel();
    ticker.await?;

    Ok(())
}
