//! `Channel` (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Id,
    pub source_id: Id,
    pub tvg_id: Option<String>,
    pub display_name: String,
    pub group: Option<String>,
    pub logo_url: Option<String>,
    pub stream_url: String,
    /// Channel number as carried by the upstream (`tvg-chno`), distinct from
    /// the number a proxy's numbering stage later assigns.
    pub chno: Option<String>,
    /// Attributes preserved verbatim from the upstream record (e.g.
    /// `tvg-shift`) that have no first-class field here but must round-trip
    /// into the published M3U.
    pub extra_attrs: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(source_id: Id, display_name: String, stream_url: String) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            source_id,
            tvg_id: None,
            display_name,
            group: None,
            logo_url: None,
            stream_url,
            chno: None,
            extra_attrs: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Upsert key per spec §3: `(source_id, tvg_id)` when `tvg_id` is
    /// non-empty, else `(source_id, stream_url)`.
    pub fn upsert_key(&self) -> ChannelKey {
        match &self.tvg_id {
            Some(tvg_id) if !tvg_id.is_empty() => {
                ChannelKey::TvgId(self.source_id, tvg_id.clone())
            }
            _ => ChannelKey::StreamUrl(self.source_id, self.stream_url.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    TvgId(Id, String),
    StreamUrl(Id, String),
}
