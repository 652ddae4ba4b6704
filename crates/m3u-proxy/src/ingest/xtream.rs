//! Xtream JSON API parsing (spec §4.2 "Xtream" parsing contract).
//!
//! Panel implementations disagree on whether numeric fields are JSON
//! numbers or numeric strings; every field that varies in practice goes
//! through [`flexible_string`] / [`flexible_string_opt`] rather than a
//! typed `i64`/`f64`, since the value is only ever used as text downstream
//! (`chno`, `episode_num`, ...).

use chrono::{TimeZone, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

use crate::models::{Channel, EpgProgram, Id};

#[derive(Debug, Deserialize)]
struct XtreamLiveStream {
    #[serde(default, deserialize_with = "flexible_string_opt")]
    num: Option<String>,
    name: String,
    #[serde(deserialize_with = "flexible_string")]
    stream_id: String,
    #[serde(default)]
    stream_icon: Option<String>,
    #[serde(default)]
    epg_channel_id: Option<String>,
    #[serde(default)]
    category_name: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct XtreamShortEpgResponse {
    #[serde(default)]
    epg_listings: Vec<XtreamEpgListing>,
}

#[derive(Debug, Deserialize)]
struct XtreamEpgListing {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    /// Unix epoch seconds as a string, per the Xtream convention.
    #[serde(deserialize_with = "flexible_string")]
    start_timestamp: String,
    #[serde(deserialize_with = "flexible_string")]
    stop_timestamp: String,
}

/// Parses a `get_live_streams` response body into `Channel`s (no upstream
/// base URL is known here; `stream_url` is filled in by the caller once the
/// per-channel play URL has been built from the source's credentials).
pub fn parse_live_streams(source_id: Id, body: &str) -> Vec<Channel> {
    let raw: Vec<XtreamLiveStream> = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "xtream live_streams response was not a JSON array of channels");
            return Vec::new();
        }
    };

    raw.into_iter()
        .map(|s| {
            let mut channel = Channel::new(source_id, s.name, s.stream_id.clone());
            channel.tvg_id = s.epg_channel_id.filter(|v| !v.is_empty());
            channel.group = s.category_name;
            channel.logo_url = s.stream_icon;
            channel.chno = s.num;
            channel.extra_attrs = s
                .extra
                .into_iter()
                .filter_map(|(k, v)| Some((k, json_scalar_to_string(&v)?)))
                .collect();
            channel
        })
        .collect()
}

/// Parses a `get_short_epg` response for a single channel's `tvg_id`.
/// Malformed individual listings are skipped (spec §4.2 "a parse error on a
/// single record is logged and skipped").
pub fn parse_short_epg(source_id: Id, channel_tvg_id: &str, body: &str) -> Vec<EpgProgram> {
    let parsed: XtreamShortEpgResponse = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "xtream short_epg response was not the expected shape");
            return Vec::new();
        }
    };

    parsed
        .epg_listings
        .into_iter()
        .filter_map(|listing| {
            let start = parse_unix_timestamp(&listing.start_timestamp)?;
            let stop = parse_unix_timestamp(&listing.stop_timestamp)?;
            let title = listing.title.unwrap_or_else(|| "Untitled".to_string());
            match EpgProgram::new(source_id, channel_tvg_id.to_string(), start, stop, title) {
                Ok(mut program) => {
                    program.description = listing.description;
                    Some(program)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping xtream epg listing with inverted time range");
                    None
                }
            }
        })
        .collect()
}

fn parse_unix_timestamp(raw: &str) -> Option<chrono::DateTime<Utc>> {
    raw.trim().parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn json_scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accepts a JSON string or number and renders it as a string.
pub fn flexible_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de>,
{
    struct FlexibleVisitor;
    impl<'de> Visitor<'de> for FlexibleVisitor {
        type Value = String;
        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or a number")
        }
        fn visit_str<E>(self, v: &str) -> Result<String, E> where E: de::Error { Ok(v.to_string()) }
        fn visit_string<E>(self, v: String) -> Result<String, E> where E: de::Error { Ok(v) }
        fn visit_i64<E>(self, v: i64) -> Result<String, E> where E: de::Error { Ok(v.to_string()) }
        fn visit_u64<E>(self, v: u64) -> Result<String, E> where E: de::Error { Ok(v.to_string()) }
        fn visit_f64<E>(self, v: f64) -> Result<String, E> where E: de::Error { Ok(v.to_string()) }
    }
    deserializer.deserialize_any(FlexibleVisitor)
}

/// `Option<String>` sibling of [`flexible_string`] for fields panels
/// sometimes omit entirely.
pub fn flexible_string_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where D: Deserializer<'de>,
{
    struct OptVisitor;
    impl<'de> Visitor<'de> for OptVisitor {
        type Value = Option<String>;
        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string, a number, or null")
        }
        fn visit_none<E>(self) -> Result<Self::Value, E> where E: de::Error { Ok(None) }
        fn visit_unit<E>(self) -> Result<Self::Value, E> where E: de::Error { Ok(None) }
        fn visit_some<D2>(self, d: D2) -> Result<Self::Value, D2::Error> where D2: Deserializer<'de> {
            flexible_string(d).map(Some)
        }
    }
    deserializer.deserialize_option(OptVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::new_id;

    #[test]
    fn parses_live_streams_with_mixed_numeric_and_string_fields() {
        let source_id = new_id();
        let body = r#"[
            {"num": 1, "name": "BBC One", "stream_id": "101", "stream_icon": "http://x/bbc1.png", "epg_channel_id": "bbc1", "category_name": "UK"},
            {"num": "2", "name": "BBC Two", "stream_id": 102, "category_name": "UK"}
        ]"#;
        let channels = parse_live_streams(source_id, body);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].chno.as_deref(), Some("1"));
        assert_eq!(channels[0].stream_url, "101");
        assert_eq!(channels[1].chno.as_deref(), Some("2"));
        assert_eq!(channels[1].stream_url, "102");
    }

    #[test]
    fn parses_short_epg_listings() {
        let source_id = new_id();
        let body = r#"{"epg_listings": [
            {"title": "News", "description": "Headlines", "start_timestamp": "1765717200", "stop_timestamp": "1765720800"}
        ]}"#;
        let programs = parse_short_epg(source_id, "bbc1", body);
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "News");
        assert_eq!(programs[0].channel_tvg_id, "bbc1");
    }

    #[test]
    fn skips_unparseable_epg_listing_timestamp() {
        let source_id = new_id();
        let body = r#"{"epg_listings": [{"title": "Bad", "start_timestamp": "not-a-number", "stop_timestamp": "123"}]}"#;
        let programs = parse_short_epg(source_id, "bbc1", body);
        assert_eq!(programs.len(), 0);
    }
}
