//! `LogoAsset` (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoAsset {
    pub id: Id,
    pub origin_url: Option<String>,
    pub content_hash: String,
    pub mime: String,
    pub bytes: u64,
    pub stored_path: String,
    pub last_seen_at: DateTime<Utc>,
}

impl LogoAsset {
    pub fn new(origin_url: Option<String>, content_hash: String, mime: String, bytes: u64, stored_path: String) -> Self {
        Self {
            id: super::new_id(),
            origin_url,
            content_hash,
            mime,
            bytes,
            stored_path,
            last_seen_at: Utc::now(),
        }
    }

    /// Stable local URL under which this logo is served, per spec §4.4 step 5.
    pub fn public_path(&self) -> String {
        format!("/api/v1/logos/{}", self.id)
    }
}

/// Sniffs a stored/uploaded logo's mime type from its magic bytes, since
/// neither upstream playlists nor multipart uploads reliably set one.
pub fn sniff_mime(bytes: &[u8]) -> String {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', ..] => "image/gif",
        _ if bytes.starts_with(b"<svg") || bytes.starts_with(b"<?xml") => "image/svg+xml",
        _ => "application/octet-stream",
    }
    .to_string()
}
