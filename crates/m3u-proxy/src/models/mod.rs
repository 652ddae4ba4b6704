//! Entity types shared across the ingestor, rule engine, pipeline, publisher,
//! stream gateway, progress bus, and web layer (spec §3).
//!
//! All identifiers are 128-bit lexicographically sortable ULIDs rather than
//! random UUIDv4s, so that e.g. listing channels by id also lists them in
//! creation order — a property the numbering stage and several repository
//! queries rely on.

mod channel;
mod client_detection;
mod encoding;
mod epg;
mod logo;
mod progress;
mod proxy;
mod rules;
mod source;

pub use channel::*;
pub use client_detection::*;
pub use encoding::*;
pub use epg::*;
pub use logo::*;
pub use progress::*;
pub use proxy::*;
pub use rules::*;
pub use source::*;

use serde::{Deserialize, Serialize};

/// Opaque, sortable 128-bit identifier used for every entity in §3.
pub type Id = ulid::Ulid;

/// Generate a fresh identifier. Centralized so call sites never construct
/// ids by hand and so a future switch to a different generator is one line.
pub fn new_id() -> Id {
    Id::new()
}

/// Shared lifecycle status for sources (`StreamSource`, `EpgSource`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Ingesting,
    Success,
    Error,
}
