//! `ClientDetectionRule` (spec §3, §4.6).

use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    pub accepted_video_codecs: Vec<String>,
    pub accepted_audio_codecs: Vec<String>,
    pub accepted_containers: Vec<String>,
    pub preferred_video_codec: Option<String>,
    pub preferred_audio_codec: Option<String>,
    pub preferred_container: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDetectionRule {
    pub id: Id,
    pub name: String,
    /// Rule-engine expression evaluated against `@dynamic(request.headers):*`
    /// fields (spec §4.3).
    pub expression: String,
    /// Ascending priority order; lower values are evaluated first (spec §4.6
    /// step 1: "evaluate... in ascending priority").
    pub priority: i32,
    pub enabled: bool,
    pub capabilities: ClientCapabilities,
}

impl ClientDetectionRule {
    /// A rule that matches every request, used as the mandatory fallback at
    /// the lowest priority (spec §3: "A fallback rule at the lowest priority
    /// must match every request").
    pub fn fallback(capabilities: ClientCapabilities) -> Self {
        Self {
            id: super::new_id(),
            name: "fallback".to_string(),
            expression: "@dynamic(request.headers):user-agent matches \".*\"".to_string(),
            priority: i32::MAX,
            enabled: true,
            capabilities,
        }
    }
}
