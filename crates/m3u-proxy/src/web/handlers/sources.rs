//! Stream/EPG source handlers (spec §6.1 rows 2-5).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::{AppError, AppResult};
use crate::models::{EpgSource, EpgSourceKind, Id, OwnerKind, StreamSource, StreamSourceKind};
use crate::progress::OperationProgress;
use crate::repositories::Repository;
use crate::web::responses::{Accepted, Created};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateStreamSourceRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StreamSourceKind,
    pub url: String,
}

pub async fn create_stream_source(
    State(state): State<AppState>,
    Json(req): Json<CreateStreamSourceRequest>,
) -> AppResult<Created<StreamSource>> {
    let source = StreamSource::new(req.name, req.kind, req.url);
    let saved = state.repos.put(source).await?;
    Ok(Created(saved))
}

pub async fn ingest_stream_source(State(state): State<AppState>, Path(id): Path<Id>) -> AppResult<Accepted> {
    let source: StreamSource = state.repos.get(id).await?;
    let operation_id = state.progress.start_operation(id, OwnerKind::StreamSource, source.name.clone(), "ingest".to_string());

    let ingestor = state.ingestor.clone();
    let progress_bus = state.progress.clone();
    tokio::spawn(async move {
        let progress = OperationProgress::new(progress_bus.clone(), operation_id);
        match ingestor.ingest_stream_source(id, &progress).await {
            Ok(_) => progress_bus.complete(operation_id),
            Err(err) => progress_bus.fail(operation_id, err.to_string()),
        }
    });

    Ok(Accepted { operation_id })
}

#[derive(Debug, Deserialize)]
pub struct CreateEpgSourceRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EpgSourceKind,
    pub url: String,
}

pub async fn create_epg_source(
    State(state): State<AppState>,
    Json(req): Json<CreateEpgSourceRequest>,
) -> AppResult<Created<EpgSource>> {
    let source = EpgSource::new(req.name, req.kind, req.url);
    let saved = state.repos.put(source).await?;
    Ok(Created(saved))
}

pub async fn ingest_epg_source(State(state): State<AppState>, Path(id): Path<Id>) -> AppResult<Accepted> {
    let source: EpgSource = state.repos.get(id).await?;
    if source.kind == EpgSourceKind::Xtream {
        return Err(AppError::input("xtream EPG sources are ingested per-channel during proxy generation, not directly"));
    }

    let operation_id = state.progress.start_operation(id, OwnerKind::EpgSource, source.name.clone(), "ingest".to_string());

    let ingestor = state.ingestor.clone();
    let progress_bus = state.progress.clone();
    tokio::spawn(async move {
        let progress = OperationProgress::new(progress_bus.clone(), operation_id);
        match ingestor.ingest_epg_source(id, &progress).await {
            Ok(_) => progress_bus.complete(operation_id),
            Err(err) => progress_bus.fail(operation_id, err.to_string()),
        }
    });

    Ok(Accepted { operation_id })
}
