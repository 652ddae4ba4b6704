//! `GET /api/v1/channels` (spec §6.1: "`?source_id=…&limit=…` returns `{items,total}`").

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;
use crate::models::{Channel, Id};
use crate::repositories::ChannelRepository;
use crate::web::AppState;

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListChannelsQuery {
    pub source_id: Option<Id>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListChannelsResponse {
    pub items: Vec<Channel>,
    pub total: usize,
}

pub async fn list_channels(State(state): State<AppState>, Query(query): Query<ListChannelsQuery>) -> AppResult<Json<ListChannelsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let (items, total) = state.repos.list(query.source_id, limit, offset).await?;
    Ok(Json(ListChannelsResponse { items, total }))
}
