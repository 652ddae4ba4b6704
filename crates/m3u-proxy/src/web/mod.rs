//! Web layer (spec §6.1, §6.2): a thin Axum surface over the core.
//!
//! Handlers are intentionally minimal glue — validation and business logic
//! live in the rule engine, pipeline, and service layer; a handler's job is
//! to parse the request, call one core operation, and map the result (or
//! `AppError`) to a response.

pub mod handlers;
pub mod responses;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::gateway::StreamGateway;
use crate::ingest::Ingestor;
use crate::progress::ProgressBus;
use crate::repositories::memory::InMemoryRepositories;
use crate::services::GenerationService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Arc<InMemoryRepositories>,
    pub ingestor: Arc<Ingestor>,
    pub generation: Arc<GenerationService>,
    pub gateway: Arc<StreamGateway>,
    pub progress: Arc<ProgressBus>,
    pub storage: Arc<sandboxed_file_manager::SandboxedManager>,
}

/// Builds the full router (spec §6.1's table, in order).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/v1", api_v1_routes())
        // `:id` here captures the extension too (`<ulid>.m3u` / `<ulid>.xmltv`);
        // axum's router can't split a literal suffix onto its own segment, so
        // `serve_output` does that split itself.
        .route("/proxy/:id", get(handlers::proxies::serve_output))
        .route("/proxy/:proxy_id/:channel_id", get(handlers::proxies::stream_channel))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/sources/stream", post(handlers::sources::create_stream_source))
        .route("/sources/stream/:id/ingest", post(handlers::sources::ingest_stream_source))
        .route("/sources/epg", post(handlers::sources::create_epg_source))
        .route("/sources/epg/:id/ingest", post(handlers::sources::ingest_epg_source))
        .route("/channels", get(handlers::channels::list_channels))
        .route("/data-mapping", post(handlers::rules::create_data_mapping_rule))
        .route("/filters", post(handlers::rules::create_filter))
        .route("/proxies", post(handlers::proxies::create_proxy))
        .route("/proxies/:id", get(handlers::proxies::get_proxy))
        .route("/proxies/:id/regenerate", post(handlers::proxies::regenerate_proxy))
        .route("/logos/upload", post(handlers::logos::upload_logo))
        .route("/logos/:id", get(handlers::logos::fetch_logo))
        .route("/encoding-profiles", get(handlers::encoding::list_encoding_profiles))
        .route("/client-detection-rules", get(handlers::rules::list_client_detection_rules))
        .route("/client-detection-rules/test", post(handlers::rules::test_client_detection_rule))
        .route("/progress/events", get(handlers::progress::progress_events))
}
