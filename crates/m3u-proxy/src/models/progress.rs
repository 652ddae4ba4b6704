//! `ProgressOperation` (spec §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    StreamSource,
    EpgSource,
    Proxy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Queued,
    Running,
    Completed,
    Error,
    Canceled,
}

impl OperationState {
    /// Terminal states must never be dropped by the progress bus's
    /// back-pressure policy (spec §4.7/§5/§8).
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Error | OperationState::Canceled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressOperation {
    pub operation_id: Id,
    pub owner_id: Id,
    pub owner_kind: OwnerKind,
    pub owner_name: String,
    pub operation_type: String,
    pub state: OperationState,
    pub current_stage: String,
    pub overall_pct: u8,
    pub stage_pct: u8,
    pub error_msg: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressOperation {
    pub fn new(owner_id: Id, owner_kind: OwnerKind, owner_name: String, operation_type: String) -> Self {
        let now = Utc::now();
        Self {
            operation_id: super::new_id(),
            owner_id,
            owner_kind,
            owner_name,
            operation_type,
            state: OperationState::Queued,
            current_stage: String::new(),
            overall_pct: 0,
            stage_pct: 0,
            error_msg: None,
            started_at: now,
            updated_at: now,
        }
    }
}
