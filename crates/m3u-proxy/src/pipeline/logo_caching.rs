//! LogoCaching stage (spec §4.4 step 5).
//!
//! Runs once for channel logos and once for program icons. The `@logo:<id>`
//! helper is resolved here — and only here (spec REDESIGN "Logo helper
//! deferral") — because this is the single place a local URL can be minted.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::errors::AppResult;
use crate::ingest::ProgressSink;
use crate::models::{Id, LogoAsset, StreamProxy};

use super::{PipelineContext, PipelineState, Stage};

const LOGO_HELPER_PREFIX: &str = "@logo:";

pub struct LogoCachingStage;

#[async_trait]
impl Stage for LogoCachingStage {
    fn name(&self) -> &'static str {
        "logo_caching"
    }

    /// This stage always runs: the `@logo:<id>` helper must resolve
    /// regardless of the caching toggles below, since it is the only place
    /// a local URL is minted (spec REDESIGN "Logo helper deferral"). Whether
    /// a *remote* URL gets fetched and cached is decided per-field inside
    /// `run`, not by skipping the stage.
    fn applies_when(&self, _proxy: &StreamProxy) -> bool {
        true
    }

    async fn run(
        &self,
        proxy: &StreamProxy,
        ctx: &PipelineContext,
        mut state: PipelineState,
        _progress: &dyn ProgressSink,
    ) -> AppResult<PipelineState> {
        let mut failures = 0u32;

        for channel in &mut state.channels {
            if let Some(url) = channel.logo_url.clone() {
                if let Some(resolved) = resolve_logo(ctx, &url, proxy.cache_channel_logos).await {
                    channel.logo_url = Some(resolved);
                } else if is_logo_helper(&url) {
                    failures += 1;
                }
            }
        }

        for program in &mut state.programs {
            if let Some(url) = program.icon_url.clone() {
                if let Some(resolved) = resolve_logo(ctx, &url, proxy.cache_program_logos).await {
                    program.icon_url = Some(resolved);
                } else if is_logo_helper(&url) {
                    failures += 1;
                }
            }
        }

        state.logo_fetch_failures += failures;
        Ok(state)
    }
}

fn is_logo_helper(url: &str) -> bool {
    url.starts_with(LOGO_HELPER_PREFIX)
}

/// Resolves one logo field to a stable local URL. The `@logo:<id>` helper
/// resolves unconditionally; a remote URL only resolves (fetch-and-cache)
/// when `cache_enabled` is set for that field's kind, otherwise it is left
/// untouched. Returns `None` (leaving the original value untouched by the
/// caller) both when caching is disabled for a remote URL and on a
/// non-fatal fetch failure (spec §4.4 step 5: "counted, not fatal") —
/// callers distinguish the two via [`is_logo_helper`].
async fn resolve_logo(ctx: &PipelineContext, url: &str, cache_enabled: bool) -> Option<String> {
    if let Some(id_str) = url.strip_prefix(LOGO_HELPER_PREFIX) {
        let id: Id = id_str.parse().ok()?;
        return match ctx.logos.get(id).await {
            Ok(asset) => Some(asset.public_path()),
            Err(err) => {
                warn!(logo_id = id_str, error = %err, "@logo: helper referenced an unknown asset");
                None
            }
        };
    }

    if !cache_enabled {
        return None;
    }

    if let Ok(Some(existing)) = ctx.logos.find_by_origin_url(url).await {
        return Some(existing.public_path());
    }

    let client = ctx.http.create_for_service("logo_fetch").await;
    let bytes = match client.get(url).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(url, error = %err, "logo fetch failed");
            return None;
        }
    };

    let content_hash = format!("{:x}", Sha256::digest(&bytes));
    if let Ok(Some(existing)) = ctx.logos.find_by_content_hash(&content_hash).await {
        return Some(existing.public_path());
    }

    let mime = crate::models::sniff_mime(&bytes);
    let stored_path = format!("logos/{content_hash}");
    if let Err(err) = ctx.logo_storage.write_atomic(&stored_path, &bytes).await {
        warn!(url, error = %err, "failed to persist fetched logo");
        return None;
    }

    let asset = LogoAsset::new(Some(url.to_string()), content_hash, mime, bytes.len() as u64, stored_path);
    let public_path = asset.public_path();
    if let Err(err) = ctx.logos.put(asset).await {
        warn!(url, error = %err, "failed to record logo asset");
        return None;
    }

    Some(public_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyMode;

    #[test]
    fn stage_always_applies_regardless_of_caching_flags() {
        let stage = LogoCachingStage;
        let mut proxy = StreamProxy::new("P".to_string(), ProxyMode::Smart);
        proxy.cache_channel_logos = false;
        proxy.cache_program_logos = false;
        assert!(stage.applies_when(&proxy), "the @logo: helper must still resolve with caching off");
    }

    #[test]
    fn is_logo_helper_recognises_only_the_helper_prefix() {
        assert!(is_logo_helper("@logo:01H000000000000000000000"));
        assert!(!is_logo_helper("http://example.com/logo.png"));
    }
}

