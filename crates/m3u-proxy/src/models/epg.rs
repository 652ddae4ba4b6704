//! `EpgProgram` (spec §3).
//!
//! Invariant (enforced at construction, not just documented): `start_utc`
//! and `stop_utc` are always stored in UTC, and always satisfy
//! `start_utc <= stop_utc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramFlags {
    pub is_new: bool,
    pub is_premiere: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgProgram {
    pub id: Id,
    pub source_id: Id,
    pub channel_tvg_id: String,
    pub start_utc: DateTime<Utc>,
    pub stop_utc: DateTime<Utc>,
    pub title: String,
    pub sub_title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub icon_url: Option<String>,
    pub episode_num: Option<String>,
    pub rating: Option<String>,
    pub language: Option<String>,
    pub flags: ProgramFlags,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("programme start_utc ({start}) is after stop_utc ({stop})")]
pub struct InvertedTimeRange {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

impl EpgProgram {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: Id,
        channel_tvg_id: String,
        start_utc: DateTime<Utc>,
        stop_utc: DateTime<Utc>,
        title: String,
    ) -> Result<Self, InvertedTimeRange> {
        if start_utc > stop_utc {
            return Err(InvertedTimeRange { start: start_utc, stop: stop_utc });
        }
        Ok(Self {
            id: super::new_id(),
            source_id,
            channel_tvg_id,
            start_utc,
            stop_utc,
            title,
            sub_title: None,
            description: None,
            category: None,
            icon_url: None,
            episode_num: None,
            rating: None,
            language: None,
            flags: ProgramFlags::default(),
        })
    }
}
