//! pulsebridge binary entry point.
//!
//! Loads the configuration, builds the pipeline with the TCP stream
//! transport, and runs it alongside the management server until ctrl-c or a
//! fatal connection failure.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulsebridge::server::{AppState, create_router};
use pulsebridge::transport::TcpConnector;
use pulsebridge::{AppConfig, Pipeline, PipelineMetrics};

/// pulsebridge - scrape-to-stream relay
#[derive(Parser, Debug)]
#[command(name = "pulsebridge", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/pulsebridge.yaml",
        env = "PULSEBRIDGE_CONFIG"
    )]
    config: String,

    /// Management listen address (overrides config file)
    #[arg(long, env = "PULSEBRIDGE_LISTEN")]
    listen: Option<String>,

    /// Publisher identity stamped into records (overrides config file)
    #[arg(long, env = "PULSEBRIDGE_PUBLISHER")]
    publisher: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pulsebridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!(config = %cli.config, "Loading configuration");
    let mut config = AppConfig::load(&cli.config)?;

    // Apply overrides (CLI > ENV > config file), then re-validate.
    if let Some(listen) = cli.listen {
        config.management.listen = listen;
    }
    if let Some(publisher) = cli.publisher {
        config.publisher = publisher;
    }
    config.validate()?;

    let metrics = Arc::new(PipelineMetrics::new()?);
    let connector = TcpConnector::new(config.stream.url.clone(), config.stream.connect_timeout);
    let pipeline = Pipeline::new(config.clone(), connector, metrics);
    let handle = pipeline.handle();

    let token = CancellationToken::new();

    // Management server with graceful shutdown tied to the same token.
    let listener = tokio::net::TcpListener::bind(&config.management.listen).await?;
    tracing::info!(listen = %config.management.listen, "Management server listening");
    let router = create_router(AppState { pipeline: handle });
    let server_token = token.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let result = pipeline.run(token.clone()).await;

    // A fatal pipeline error also takes the management server down; the
    // process supervisor owns recovery.
    token.cancel();
    let _ = server.await;

    result.map_err(Into::into)
}
