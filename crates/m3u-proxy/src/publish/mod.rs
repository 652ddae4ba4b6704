//! Publisher (spec §4.5, component C5): serialize a generation's output to
//! `playlist.m3u` / `epg.xml` and atomically swap them into place.
//!
//! `SandboxedManager::write_atomic` already does the write-to-`.tmp`/fsync/
//! rename dance (spec §6.3), so publishing one proxy is two calls.

use quick_xml::escape::escape;
use std::sync::Arc;

use crate::errors::AppResult;
use crate::models::{Channel, EpgProgram, ProxyMode, StreamProxy};

const M3U_FILENAME: &str = "playlist.m3u";
const XMLTV_FILENAME: &str = "epg.xml";

pub struct Publisher {
    storage: Arc<sandboxed_file_manager::SandboxedManager>,
    base_url: String,
}

impl Publisher {
    pub fn new(storage: Arc<sandboxed_file_manager::SandboxedManager>, base_url: String) -> Self {
        Self { storage, base_url }
    }

    /// Renders and atomically publishes both outputs for `proxy`. Called
    /// after the generator pipeline has produced its final channel/program
    /// lists (spec §4.4 step 7, handed off from the Generate stage).
    pub async fn publish(
        &self,
        proxy: &StreamProxy,
        channels: &[Channel],
        programs: &[EpgProgram],
    ) -> AppResult<()> {
        let m3u = self.render_m3u(proxy, channels);
        let xmltv = render_xmltv(channels, programs);

        self.storage.write_atomic(format!("{}/{M3U_FILENAME}", proxy.id), m3u).await?;
        self.storage.write_atomic(format!("{}/{XMLTV_FILENAME}", proxy.id), xmltv).await?;
        Ok(())
    }

    fn render_m3u(&self, proxy: &StreamProxy, channels: &[Channel]) -> String {
        let mut out = String::from("#EXTM3U\n");

        for channel in channels {
            out.push_str("#EXTINF:-1");
            if let Some(tvg_id) = channel.tvg_id.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&format!(" tvg-id=\"{}\"", escape(tvg_id)));
            }
            if let Some(chno) = channel.chno.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&format!(" tvg-chno=\"{}\"", escape(chno)));
            }
            if let Some(logo) = channel.logo_url.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&format!(" tvg-logo=\"{}\"", escape(logo)));
            }
            if let Some(group) = channel.group.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&format!(" group-title=\"{}\"", escape(group)));
            }
            for (key, value) in &channel.extra_attrs {
                out.push_str(&format!(" {key}=\"{}\"", escape(value)));
            }
            out.push_str(&format!(",{}\n", channel.display_name));
            let url = match proxy.mode {
                ProxyMode::Direct => channel.stream_url.clone(),
                ProxyMode::Smart => self.gateway_url(proxy, channel),
            };
            out.push_str(&format!("{url}\n"));
        }

        out
    }

    /// Smart-mode playlists route every channel through the Stream Gateway
    /// (spec §4.6), which decides redirect vs. passthrough vs. transcode per
    /// request, not at generation time. Direct mode skips the gateway
    /// entirely, so its M3U carries the raw upstream URL instead.
    fn gateway_url(&self, proxy: &StreamProxy, channel: &Channel) -> String {
        format!("{}/proxy/{}/{}", self.base_url.trim_end_matches('/'), proxy.id, channel.id)
    }
}

fn render_xmltv(channels: &[Channel], programs: &[EpgProgram]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<tv>\n");

    for channel in channels {
        let Some(tvg_id) = channel.tvg_id.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };
        out.push_str(&format!("  <channel id=\"{}\">\n", escape(tvg_id)));
        out.push_str(&format!("    <display-name>{}</display-name>\n", escape(&channel.display_name)));
        if let Some(logo) = channel.logo_url.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!("    <icon src=\"{}\"/>\n", escape(logo)));
        }
        out.push_str("  </channel>\n");
    }

    for program in programs {
        let start = program.start_utc.format("%Y%m%d%H%M%S %z");
        let stop = program.stop_utc.format("%Y%m%d%H%M%S %z");
        out.push_str(&format!(
            "  <programme start=\"{start}\" stop=\"{stop}\" channel=\"{}\">\n",
            escape(&program.channel_tvg_id)
        ));
        out.push_str(&format!("    <title>{}</title>\n", escape(&program.title)));
        if let Some(sub_title) = program.sub_title.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!("    <sub-title>{}</sub-title>\n", escape(sub_title)));
        }
        if let Some(desc) = program.description.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!("    <desc>{}</desc>\n", escape(desc)));
        }
        if let Some(category) = program.category.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!("    <category>{}</category>\n", escape(category)));
        }
        if let Some(icon) = program.icon_url.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!("    <icon src=\"{}\"/>\n", escape(icon)));
        }
        out.push_str("  </programme>\n");
    }

    out.push_str("</tv>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_id, ProxyMode};

    fn test_proxy() -> StreamProxy {
        StreamProxy::new("P1".to_string(), ProxyMode::Direct)
    }

    #[tokio::test]
    async fn direct_mode_m3u_carries_the_raw_upstream_url() {
        let proxy = test_proxy();
        let storage = sandboxed_file_manager::SandboxedManager::builder()
            .base_directory(std::env::temp_dir())
            .build()
            .await
            .unwrap();
        let publisher = Publisher::new(Arc::new(storage), "http://localhost:8080".to_string());

        let mut channel = Channel::new(new_id(), "Channel One".to_string(), "http://upstream/ch1".to_string());
        channel.tvg_id = Some("ch1".to_string());
        channel.chno = Some("1".to_string());

        let m3u = publisher.render_m3u(&proxy, &[channel.clone()]);
        assert_eq!(m3u.matches("#EXTINF:").count(), 1);
        assert!(m3u.contains("http://upstream/ch1"));
        assert!(!m3u.contains(&format!("/proxy/{}/{}", proxy.id, channel.id)));
    }

    #[tokio::test]
    async fn smart_mode_m3u_carries_the_gateway_url() {
        let proxy = StreamProxy::new("P1".to_string(), ProxyMode::Smart);
        let storage = sandboxed_file_manager::SandboxedManager::builder()
            .base_directory(std::env::temp_dir())
            .build()
            .await
            .unwrap();
        let publisher = Publisher::new(Arc::new(storage), "http://localhost:8080".to_string());

        let channel = Channel::new(new_id(), "Channel One".to_string(), "http://upstream/ch1".to_string());

        let m3u = publisher.render_m3u(&proxy, &[channel.clone()]);
        assert!(m3u.contains(&format!("/proxy/{}/{}", proxy.id, channel.id)));
        assert!(!m3u.contains("http://upstream/ch1"));
    }

    #[test]
    fn xmltv_escapes_text_and_skips_channels_without_tvg_id() {
        let mut with_id = Channel::new(new_id(), "A & B".to_string(), "http://u".to_string());
        with_id.tvg_id = Some("ch1".to_string());
        let without_id = Channel::new(new_id(), "No Id".to_string(), "http://u2".to_string());

        let xmltv = render_xmltv(&[with_id, without_id], &[]);
        assert!(xmltv.contains("A &amp; B"));
        assert_eq!(xmltv.matches("<channel ").count(), 1);
    }

    #[test]
    fn xmltv_programme_timestamps_use_xmltv_format() {
        let program = EpgProgram::new(
            new_id(),
            "ch1".to_string(),
            "2025-12-14T13:00:00Z".parse().unwrap(),
            "2025-12-14T14:00:00Z".parse().unwrap(),
            "Show".to_string(),
        )
        .unwrap();

        let xmltv = render_xmltv(&[], &[program]);
        assert!(xmltv.contains("start=\"20251214130000 +0000\""));
        assert!(xmltv.contains("stop=\"20251214140000 +0000\""));
    }
}
