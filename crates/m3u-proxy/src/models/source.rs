//! `StreamSource` and `EpgSource` (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Id, SourceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSourceKind {
    M3u,
    Xtream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpgSourceKind {
    Xmltv,
    Xtream,
}

/// Opaque credential bundle. Stored as-is by the repository; never logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSource {
    pub id: Id,
    pub name: String,
    pub kind: StreamSourceKind,
    pub url: String,
    pub credentials: Credentials,
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub status: SourceStatus,
    /// Signed hours, clamped to [-12, 12] at validation time (spec §3).
    pub timeshift_hours: i32,
    pub last_error: Option<String>,
    /// Cron expression the scheduler (C8) evaluates; `None` means this
    /// source is only ingested on demand (spec §4.8).
    pub schedule: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamSource {
    pub fn new(name: String, kind: StreamSourceKind, url: String) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            name,
            kind,
            url,
            credentials: Credentials::default(),
            last_ingested_at: None,
            status: SourceStatus::Pending,
            timeshift_hours: 0,
            last_error: None,
            schedule: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgSource {
    pub id: Id,
    pub name: String,
    pub kind: EpgSourceKind,
    pub url: String,
    pub credentials: Credentials,
    /// Offset literal detected from the source's own timestamps at ingest
    /// time, e.g. `"+0100"`. Empty until the first successful ingest.
    pub detected_timezone_offset: String,
    pub timeshift_hours: i32,
    pub status: SourceStatus,
    pub last_error: Option<String>,
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub schedule: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EpgSource {
    pub fn new(name: String, kind: EpgSourceKind, url: String) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            name,
            kind,
            url,
            credentials: Credentials::default(),
            detected_timezone_offset: String::new(),
            timeshift_hours: 0,
            status: SourceStatus::Pending,
            last_error: None,
            last_ingested_at: None,
            schedule: None,
            created_at: now,
            updated_at: now,
        }
    }
}
