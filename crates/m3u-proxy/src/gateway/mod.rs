//! Stream Gateway (spec §4.6, component C6): decides, per request, whether
//! to redirect straight to the upstream, proxy the bytes through, or
//! transcode.

pub(crate) mod client_detection;
mod coalescing;

pub use client_detection::{detect_capabilities, HeaderDynamicContext};

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use bytes::Bytes;
use tokio::process::{Child, ChildStdout};
use tracing::warn;

use crate::errors::{AppError, AppResult};
use crate::models::{EncodingProfile, Id, ProxyMode};
use crate::repositories::{
    ChannelRepository, ClientDetectionRuleRepository, EncodingProfileRepository, Repository,
    StreamProxyRepository,
};
use crate::utils::http_client_factory::HttpClientFactory;

use self::coalescing::CollapsingBroadcaster;

/// First byte of an MPEG-TS sync word; non-redirect responses whose
/// container is MPEG-TS must start here (spec §4.6 step 3).
const TS_SYNC_BYTE: u8 = 0x47;

pub enum GatewayResponse {
    /// `direct` mode: `302 Found` straight to the upstream URL.
    Redirect(String),
    /// `smart` passthrough: the full upstream body, already positioned at
    /// the container's natural start.
    Body { bytes: Bytes, content_type: String },
    /// `smart` transcode: connect the client to the transcoder's stdout.
    /// Dropping this kills the child (spec §5 "Terminate the child on
    /// client disconnect").
    Transcode(TranscodeStream),
}

/// Wraps a spawned transcoder so the child is always reaped, even if the
/// caller drops the stream without reading it to EOF.
pub struct TranscodeStream {
    child: Child,
    pub stdout: ChildStdout,
    pub content_type: String,
}

impl Drop for TranscodeStream {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

impl tokio::io::AsyncRead for TranscodeStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

pub struct StreamGateway {
    channels: Arc<dyn ChannelRepository>,
    proxies: Arc<dyn StreamProxyRepository>,
    client_rules: Arc<dyn ClientDetectionRuleRepository>,
    encoding_profiles: Arc<dyn EncodingProfileRepository>,
    http: Arc<HttpClientFactory>,
    transcoder_binary: Option<PathBuf>,
    broadcaster: CollapsingBroadcaster,
}

impl StreamGateway {
    pub fn new(
        channels: Arc<dyn ChannelRepository>,
        proxies: Arc<dyn StreamProxyRepository>,
        client_rules: Arc<dyn ClientDetectionRuleRepository>,
        encoding_profiles: Arc<dyn EncodingProfileRepository>,
        http: Arc<HttpClientFactory>,
        transcoder_binary: Option<PathBuf>,
    ) -> Self {
        Self { channels, proxies, client_rules, encoding_profiles, http, transcoder_binary, broadcaster: CollapsingBroadcaster::new() }
    }

    /// Handles `GET /proxy/{proxy_id}/{channel_id}` (spec §4.6).
    pub async fn handle(&self, proxy_id: Id, channel_id: Id, headers: &HashMap<String, String>) -> AppResult<GatewayResponse> {
        let proxy = self.proxies.get(proxy_id).await?;
        let channel = self.channels.get(channel_id).await?;

        if proxy.mode == ProxyMode::Direct {
            return Ok(GatewayResponse::Redirect(channel.stream_url));
        }

        let rules = self.client_rules.list_enabled_by_priority().await?;
        let capabilities = detect_capabilities(&rules, headers);

        let encoding_profile = match proxy.encoding_profile_id {
            Some(id) => Some(self.encoding_profiles.get(id).await?),
            None => None,
        };

        let container = guess_container(&channel.stream_url);
        let accepted = capabilities.accepted_containers.is_empty()
            || capabilities.accepted_containers.iter().any(|c| c.eq_ignore_ascii_case(&container));

        if accepted && encoding_profile.is_none() {
            return self.passthrough(proxy_id, channel_id, &channel.stream_url, &container).await;
        }

        if let Some(profile) = encoding_profile {
            return self.transcode(&profile, &channel.stream_url);
        }

        Err(AppError::fatal_upstream(
            "stream_gateway",
            format!("client cannot accept container '{container}' and no encoding profile is configured"),
        ))
    }

    async fn passthrough(&self, proxy_id: Id, channel_id: Id, stream_url: &str, container: &str) -> AppResult<GatewayResponse> {
        let client = self.http.create_for_service(&format!("stream:{proxy_id}:{channel_id}")).await;
        let url = stream_url.to_string();
        let bytes = self.broadcaster.fetch_once((proxy_id, channel_id), || async move { client.get(&url).await }).await?;

        let bytes = if container.eq_ignore_ascii_case("mpegts") { skip_to_ts_sync(bytes) } else { bytes };

        Ok(GatewayResponse::Body { bytes, content_type: container_content_type(container).to_string() })
    }

    fn transcode(&self, profile: &EncodingProfile, stream_url: &str) -> AppResult<GatewayResponse> {
        let binary = self
            .transcoder_binary
            .as_ref()
            .ok_or_else(|| AppError::fatal_upstream("stream_gateway", "encoding profile configured but no transcoder_binary is set"))?;

        let argv = profile.render_argv(stream_url);
        let mut child = tokio::process::Command::new(binary)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(AppError::Io)?;

        let stdout = child.stdout.take().ok_or_else(|| AppError::internal("transcoder child has no stdout pipe"))?;

        Ok(GatewayResponse::Transcode(TranscodeStream { child, stdout, content_type: "video/mp2t".to_string() }))
    }
}

/// Naive container guess from the upstream URL's extension. A real probe
/// (reading the first bytes / inspecting the playlist) would be more
/// reliable but needs a network round trip before routing even begins.
fn guess_container(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "m3u8" => "hls".to_string(),
        Some(ext) if ext == "ts" => "mpegts".to_string(),
        Some(ext) if ext == "mp4" => "mp4".to_string(),
        Some(other) => other,
        None => "unknown".to_string(),
    }
}

fn container_content_type(container: &str) -> &'static str {
    match container {
        "hls" => "application/vnd.apple.mpegurl",
        "mpegts" => "video/mp2t",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

fn skip_to_ts_sync(bytes: Bytes) -> Bytes {
    match bytes.iter().position(|&b| b == TS_SYNC_BYTE) {
        Some(0) => bytes,
        Some(offset) => bytes.slice(offset..),
        None => {
            warn!("mpegts passthrough body never contains a sync byte");
            bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_container_from_extension_ignoring_query_string() {
        assert_eq!(guess_container("http://up/stream.m3u8?token=abc"), "hls");
        assert_eq!(guess_container("http://up/stream.ts"), "mpegts");
        assert_eq!(guess_container("http://up/stream"), "unknown");
    }

    #[test]
    fn skip_to_ts_sync_trims_leading_garbage() {
        let bytes = Bytes::from_static(&[0x00, 0x00, TS_SYNC_BYTE, 0x01, 0x02]);
        let trimmed = skip_to_ts_sync(bytes);
        assert_eq!(trimmed.as_ref(), &[TS_SYNC_BYTE, 0x01, 0x02]);
    }

    #[test]
    fn skip_to_ts_sync_is_noop_without_a_sync_byte() {
        let bytes = Bytes::from_static(&[0x00, 0x01]);
        let trimmed = skip_to_ts_sync(bytes.clone());
        assert_eq!(trimmed, bytes);
    }
}
