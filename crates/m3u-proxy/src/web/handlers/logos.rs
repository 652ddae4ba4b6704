//! Logo asset handlers (spec §6.1 "multipart; returns `{id,url}`" /
//! "content-type per stored mime").

use axum::body::Bytes as AxumBytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};

use crate::errors::{AppError, AppResult};
use crate::models::{sniff_mime, Id, LogoAsset};
use crate::repositories::{LogoAssetRepository, Repository};
use crate::web::AppState;

pub async fn upload_logo(State(state): State<AppState>, mut multipart: Multipart) -> AppResult<Json<serde_json::Value>> {
    let mut file_bytes: Option<AxumBytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::input(e.to_string()))? {
        if field.name() == Some("file") {
            file_bytes = Some(field.bytes().await.map_err(|e| AppError::input(e.to_string()))?);
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::input("multipart upload must include a 'file' field"))?;
    let content_hash = format!("{:x}", Sha256::digest(&bytes));

    if let Some(existing) = state.repos.find_by_content_hash(&content_hash).await? {
        return Ok(Json(serde_json::json!({ "id": existing.id, "url": existing.public_path() })));
    }

    let mime = sniff_mime(&bytes);
    let stored_path = format!("logos/{content_hash}");
    state.storage.write_atomic(&stored_path, bytes.as_ref()).await?;

    let asset = LogoAsset::new(None, content_hash, mime, bytes.len() as u64, stored_path);
    let saved = state.repos.put(asset).await?;
    Ok(Json(serde_json::json!({ "id": saved.id, "url": saved.public_path() })))
}

pub async fn fetch_logo(State(state): State<AppState>, Path(id): Path<Id>) -> AppResult<Response> {
    let asset: LogoAsset = state.repos.get(id).await?;
    let bytes = state.storage.read(&asset.stored_path).await?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, asset.mime)], bytes).into_response())
}
