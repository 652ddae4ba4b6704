use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sandboxed_file_manager::SandboxedManager;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3u_proxy::config::Config;
use m3u_proxy::gateway::StreamGateway;
use m3u_proxy::ingest::Ingestor;
use m3u_proxy::pipeline::PipelineContext;
use m3u_proxy::progress::ProgressBus;
use m3u_proxy::publish::Publisher;
use m3u_proxy::repositories::memory::InMemoryRepositories;
use m3u_proxy::scheduler::Scheduler;
use m3u_proxy::services::GenerationService;
use m3u_proxy::utils::http_client_factory::HttpClientFactory;
use m3u_proxy::web::{self, AppState};

#[derive(Parser)]
#[command(name = "m3u-proxy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "IPTV aggregation and proxy service")]
struct Cli {
    /// Configuration file path; absence falls back to built-in defaults
    /// plus any `M3U_PROXY__`-prefixed environment overrides.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Listening address, overriding `base_url`'s host:port.
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "starting m3u-proxy");

    let storage = Arc::new(
        SandboxedManager::builder()
            .base_directory(config.storage_base_dir.clone())
            .build()
            .await
            .context("failed to initialize sandboxed storage")?,
    );

    let config = Arc::new(config);
    let repos = InMemoryRepositories::new();
    let http = Arc::new(HttpClientFactory::new(config.clone()));

    let ingestor = Arc::new(Ingestor::new(http.clone(), repos.clone(), repos.clone(), repos.clone(), repos.clone()));

    let pipeline_ctx = PipelineContext {
        channels: repos.clone(),
        programs: repos.clone(),
        stream_sources: repos.clone(),
        epg_sources: repos.clone(),
        data_mapping_rules: repos.clone(),
        filters: repos.clone(),
        logos: repos.clone(),
        http: http.clone(),
        logo_storage: storage.clone(),
    };
    let publisher = Publisher::new(storage.clone(), config.base_url.clone());
    let generation = Arc::new(GenerationService::new(pipeline_ctx, publisher, repos.clone()));

    let gateway = Arc::new(StreamGateway::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        http.clone(),
        config.transcoder_binary.clone(),
    ));

    let progress = ProgressBus::new();

    let scheduler = Arc::new(Scheduler::new(
        config.scheduler.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        ingestor.clone(),
        generation.clone(),
        progress.clone(),
    ));
    scheduler.spawn();
    info!("scheduler started");

    let state = AppState { config: config.clone(), repos, ingestor, generation, gateway, progress, storage };
    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(&cli.listen).await.context("failed to bind listener")?;
    info!(addr = %cli.listen, "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.context("server error")?;

    Ok(())
}

fn init_tracing(logging: &m3u_proxy::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.filter.clone().into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    info!("shutdown signal received");
}
