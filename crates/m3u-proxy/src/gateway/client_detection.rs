//! Client detection (spec §4.6 step 1): pick a `ClientCapabilities` for the
//! requesting client by evaluating `ClientDetectionRule`s in ascending
//! priority order.

use std::collections::HashMap;

use tracing::warn;

use crate::models::{ClientCapabilities, ClientDetectionRule, RuleDomain};
use crate::rules::{self, evaluate_predicate_only, DynamicContext, EmptyRecord};

/// Request data a `ClientDetectionRule` expression can read via
/// `@dynamic(request.headers):<name>` (spec §4.6: "notably `User-Agent` and
/// any explicit `X-Container`, `X-Video-Codec`, `X-Audio-Codec`").
pub struct HeaderDynamicContext<'a> {
    headers: &'a HashMap<String, String>,
}

impl<'a> HeaderDynamicContext<'a> {
    pub fn new(headers: &'a HashMap<String, String>) -> Self {
        Self { headers }
    }
}

impl DynamicContext for HeaderDynamicContext<'_> {
    fn get_dynamic(&self, source: &str, identifier: &str) -> Option<String> {
        if source != "request.headers" {
            return None;
        }
        self.headers.get(&identifier.to_ascii_lowercase()).cloned()
    }
}

/// Evaluates `rules` (enabled ones, ascending priority; the caller must
/// include the mandatory fallback) against `headers` and returns the
/// winning capabilities with any explicit `X-*` overrides applied.
pub fn detect_capabilities(rules: &[ClientDetectionRule], headers: &HashMap<String, String>) -> ClientCapabilities {
    let ctx = HeaderDynamicContext::new(headers);

    let mut ordered: Vec<&ClientDetectionRule> = rules.iter().filter(|r| r.enabled).collect();
    ordered.sort_by_key(|r| r.priority);

    for rule in ordered {
        let expr = match rules::validate(RuleDomain::ClientDetection, &rule.expression) {
            Ok(expr) => expr,
            Err(err) => {
                warn!(rule = %rule.name, error = %err, "client detection rule failed to parse, skipping");
                continue;
            }
        };
        if evaluate_predicate_only(&expr, &EmptyRecord, &ctx) {
            let mut caps = rule.capabilities.clone();
            apply_explicit_overrides(&mut caps, headers);
            return caps;
        }
    }

    let mut caps = ClientCapabilities::default();
    apply_explicit_overrides(&mut caps, headers);
    caps
}

fn apply_explicit_overrides(caps: &mut ClientCapabilities, headers: &HashMap<String, String>) {
    if let Some(container) = headers.get("x-container") {
        caps.preferred_container = Some(container.clone());
        if !caps.accepted_containers.iter().any(|c| c.eq_ignore_ascii_case(container)) {
            caps.accepted_containers.push(container.clone());
        }
    }
    if let Some(codec) = headers.get("x-video-codec") {
        caps.preferred_video_codec = Some(codec.clone());
        if !caps.accepted_video_codecs.iter().any(|c| c.eq_ignore_ascii_case(codec)) {
            caps.accepted_video_codecs.push(codec.clone());
        }
    }
    if let Some(codec) = headers.get("x-audio-codec") {
        caps.preferred_audio_codec = Some(codec.clone());
        if !caps.accepted_audio_codecs.iter().any(|c| c.eq_ignore_ascii_case(codec)) {
            caps.accepted_audio_codecs.push(codec.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::new_id;

    fn rule(name: &str, priority: i32, expression: &str, containers: &[&str]) -> ClientDetectionRule {
        ClientDetectionRule {
            id: new_id(),
            name: name.to_string(),
            expression: expression.to_string(),
            priority,
            enabled: true,
            capabilities: ClientCapabilities { accepted_containers: containers.iter().map(|s| s.to_string()).collect(), ..Default::default() },
        }
    }

    #[test]
    fn first_matching_rule_by_priority_wins() {
        let vlc = rule("vlc", 1, r#"@dynamic(request.headers):user-agent contains "VLC""#, &["mpegts"]);
        let fallback = ClientDetectionRule::fallback(ClientCapabilities { accepted_containers: vec!["hls".to_string()], ..Default::default() });

        let mut headers = HashMap::new();
        headers.insert("user-agent".to_string(), "VLC/3.0".to_string());

        let caps = detect_capabilities(&[fallback, vlc], &headers);
        assert_eq!(caps.accepted_containers, vec!["mpegts".to_string()]);
    }

    #[test]
    fn falls_back_when_nothing_else_matches() {
        let vlc = rule("vlc", 1, r#"@dynamic(request.headers):user-agent contains "VLC""#, &["mpegts"]);
        let fallback = ClientDetectionRule::fallback(ClientCapabilities { accepted_containers: vec!["hls".to_string()], ..Default::default() });

        let mut headers = HashMap::new();
        headers.insert("user-agent".to_string(), "Mozilla/5.0".to_string());

        let caps = detect_capabilities(&[fallback, vlc], &headers);
        assert_eq!(caps.accepted_containers, vec!["hls".to_string()]);
    }

    #[test]
    fn explicit_header_overrides_rule_derived_container() {
        let fallback = ClientDetectionRule::fallback(ClientCapabilities { accepted_containers: vec!["hls".to_string()], ..Default::default() });

        let mut headers = HashMap::new();
        headers.insert("x-container".to_string(), "mpegts".to_string());

        let caps = detect_capabilities(&[fallback], &headers);
        assert_eq!(caps.preferred_container.as_deref(), Some("mpegts"));
        assert!(caps.accepted_containers.iter().any(|c| c == "mpegts"));
    }
}
