//! Proxy CRUD, generation, published-output download, and the live stream
//! gateway (spec §6.1 rows 9-11 and 14).

use std::collections::{BTreeSet, HashMap};

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::errors::{AppError, AppResult};
use crate::gateway::GatewayResponse;
use crate::models::{Id, OwnerKind, ProxyMode, StreamProxy};
use crate::progress::OperationProgress;
use crate::repositories::Repository;
use crate::web::responses::{Accepted, Created};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProxyRequest {
    pub name: String,
    #[serde(default)]
    pub source_ids: BTreeSet<Id>,
    #[serde(default)]
    pub epg_source_ids: BTreeSet<Id>,
    #[serde(default = "default_true")]
    pub cache_channel_logos: bool,
    #[serde(default)]
    pub cache_program_logos: bool,
    pub proxy_mode: Option<String>,
    pub encoding_profile_id: Option<Id>,
}

fn default_true() -> bool {
    true
}

pub async fn create_proxy(State(state): State<AppState>, Json(req): Json<CreateProxyRequest>) -> AppResult<Created<StreamProxy>> {
    let mode = match req.proxy_mode {
        Some(raw) => ProxyMode::parse(&raw).map_err(AppError::input)?,
        None => ProxyMode::Direct,
    };

    if let Some(profile_id) = req.encoding_profile_id {
        let _: crate::models::EncodingProfile = state.repos.get(profile_id).await?;
        if state.config.transcoder_binary.is_none() {
            return Err(AppError::input("encoding_profile_id set but no transcoder_binary is configured"));
        }
    }

    let mut proxy = StreamProxy::new(req.name, mode);
    proxy.source_ids = req.source_ids;
    proxy.epg_source_ids = req.epg_source_ids;
    proxy.cache_channel_logos = req.cache_channel_logos;
    proxy.cache_program_logos = req.cache_program_logos;
    proxy.encoding_profile_id = req.encoding_profile_id;

    let saved = state.repos.put(proxy).await?;
    Ok(Created(saved))
}

pub async fn get_proxy(State(state): State<AppState>, Path(id): Path<Id>) -> AppResult<Json<StreamProxy>> {
    Ok(Json(state.repos.get(id).await?))
}

pub async fn regenerate_proxy(State(state): State<AppState>, Path(id): Path<Id>) -> AppResult<Accepted> {
    let proxy: StreamProxy = state.repos.get(id).await?;
    let operation_id = state.progress.start_operation(id, OwnerKind::Proxy, proxy.name.clone(), "generate".to_string());

    let generation = state.generation.clone();
    let progress_bus = state.progress.clone();
    tokio::spawn(async move {
        let progress = OperationProgress::new(progress_bus.clone(), operation_id);
        match generation.generate_proxy(id, &progress).await {
            Ok(()) => progress_bus.complete(operation_id),
            Err(err) => progress_bus.fail(operation_id, err.to_string()),
        }
    });

    Ok(Accepted { operation_id })
}

/// `GET /proxy/{id}.m3u` and `GET /proxy/{id}.xmltv` (spec §6.1/§6.3): the
/// path captures the extension along with the id since axum can't split a
/// literal suffix onto its own route segment.
pub async fn serve_output(State(state): State<AppState>, Path(id_with_ext): Path<String>) -> AppResult<Response> {
    let (id_str, filename, content_type) = if let Some(id_str) = id_with_ext.strip_suffix(".m3u") {
        (id_str, "playlist.m3u", "application/vnd.apple.mpegurl")
    } else if let Some(id_str) = id_with_ext.strip_suffix(".xmltv") {
        (id_str, "epg.xml", "application/xml")
    } else {
        return Err(AppError::input("expected a '.m3u' or '.xmltv' suffix"));
    };

    let id: Id = id_str.parse().map_err(|_| AppError::input("invalid proxy id"))?;
    // A 404 here distinguishes "proxy never generated" from the id simply
    // being wrong, same as any other not-found path in this API.
    let _: StreamProxy = state.repos.get(id).await?;

    let bytes = state.storage.read(format!("{id}/{filename}")).await?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// `GET /proxy/{proxy_id}/{channel_id}` (spec §4.6).
pub async fn stream_channel(
    State(state): State<AppState>,
    Path((proxy_id, channel_id)): Path<(Id, Id)>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string())))
        .collect();

    match state.gateway.handle(proxy_id, channel_id, &header_map).await? {
        GatewayResponse::Redirect(url) => Ok(Redirect::temporary(&url).into_response()),
        GatewayResponse::Body { bytes, content_type } => Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response()),
        GatewayResponse::Transcode(stream) => {
            let content_type = stream.content_type.clone();
            let body = axum::body::Body::from_stream(ReaderStream::new(stream));
            let mut response = Response::new(body);
            response.headers_mut().insert(header::CONTENT_TYPE, content_type.parse().unwrap());
            Ok(response)
        }
    }
}
