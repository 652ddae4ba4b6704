//! `DataMappingRule` and `Filter` (spec §3, §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDomain {
    Stream,
    Epg,
    /// `ClientDetectionRule` expressions. No canonical fields are registered
    /// for this domain, so every predicate must reference `@dynamic(...)`
    /// request data (spec §4.6).
    ClientDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataMappingRule {
    pub id: Id,
    pub name: String,
    pub domain: RuleDomain,
    pub expression: String,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl DataMappingRule {
    pub fn new(name: String, domain: RuleDomain, expression: String, priority: i32) -> Self {
        Self {
            id: super::new_id(),
            name,
            domain,
            expression,
            priority,
            enabled: true,
            created_at: Utc::now(),
        }
    }
}

/// Whether a `Filter` keeps or drops matching records (spec §3: "drop
/// unless matches" vs "drop when matches").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Inclusion filter: a record that fails to match is dropped.
    #[default]
    Include,
    /// Exclusion filter: a record that matches is dropped.
    Exclude,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub id: Id,
    pub name: String,
    pub domain: RuleDomain,
    pub mode: FilterMode,
    pub expression: String,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Filter {
    pub fn new(name: String, domain: RuleDomain, mode: FilterMode, expression: String, priority: i32) -> Self {
        Self {
            id: super::new_id(),
            name,
            domain,
            mode,
            expression,
            priority,
            enabled: true,
            created_at: Utc::now(),
        }
    }
}
