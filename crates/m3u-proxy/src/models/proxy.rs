//! `StreamProxy` (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    Direct,
    Smart,
}

impl ProxyMode {
    /// Reject unknown mode strings at creation time, per the Open Question
    /// in spec §9 ("make the mode set explicit and reject unknown values").
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "direct" => Ok(Self::Direct),
            "smart" => Ok(Self::Smart),
            other => Err(format!("unknown proxy mode '{other}' (expected 'direct' or 'smart')")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStatus {
    Pending,
    Generating,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberingConfig {
    pub starting_number: i32,
    pub group_aware: bool,
    /// Respect a channel's existing `chno` instead of overwriting it.
    pub respect_existing: bool,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self { starting_number: 1, group_aware: false, respect_existing: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamProxy {
    pub id: Id,
    pub name: String,
    pub mode: ProxyMode,
    pub source_ids: BTreeSet<Id>,
    pub epg_source_ids: BTreeSet<Id>,
    /// Rule ids in evaluation order, most significant first. Both
    /// `DataMappingRule` and `Filter` ids may appear; each stage filters the
    /// ones relevant to it.
    pub rule_ids: Vec<Id>,
    pub numbering: NumberingConfig,
    pub cache_channel_logos: bool,
    pub cache_program_logos: bool,
    pub encoding_profile_id: Option<Id>,
    pub status: ProxyStatus,
    pub channel_count: u32,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Cron expression the scheduler (C8) evaluates; `None` means this
    /// proxy is only regenerated on demand (spec §4.8).
    pub schedule: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamProxy {
    pub fn new(name: String, mode: ProxyMode) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            name,
            mode,
            source_ids: BTreeSet::new(),
            epg_source_ids: BTreeSet::new(),
            rule_ids: Vec::new(),
            numbering: NumberingConfig::default(),
            cache_channel_logos: true,
            cache_program_logos: false,
            encoding_profile_id: None,
            status: ProxyStatus::Pending,
            channel_count: 0,
            last_generated_at: None,
            last_error: None,
            schedule: None,
            created_at: now,
            updated_at: now,
        }
    }
}
