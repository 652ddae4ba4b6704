//! `GET /api/v1/encoding-profiles` (spec §6.1).

use axum::extract::State;
use axum::Json;

use crate::errors::AppResult;
use crate::models::EncodingProfile;
use crate::repositories::Repository;
use crate::web::AppState;

pub async fn list_encoding_profiles(State(state): State<AppState>) -> AppResult<Json<Vec<EncodingProfile>>> {
    let profiles: Vec<EncodingProfile> = state.repos.list().await?;
    Ok(Json(profiles))
}
