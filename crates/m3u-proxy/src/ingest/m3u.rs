//! Streaming M3U playlist parser (spec §4.2 "M3U" parsing contract).

use tracing::{debug, warn};

use crate::models::{Channel, Id};

/// Parses an M3U playlist already decoded to UTF-8 text (decompression and
/// charset handling happen in C1/the caller) into a lazily-evaluated stream
/// of channels, so a caller can pull and persist fixed-size batches without
/// ever holding the whole parsed playlist in memory at once. Malformed
/// individual records are logged and skipped rather than aborting the whole
/// parse (spec §4.2 "a parse error on a single record is logged and
/// skipped").
pub fn parse_m3u(source_id: Id, content: &str) -> impl Iterator<Item = Channel> + '_ {
    M3uParser { source_id, lines: content.lines().enumerate(), pending: None }
}

struct M3uParser<'a> {
    source_id: Id,
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    pending: Option<PartialChannel>,
}

impl<'a> Iterator for M3uParser<'a> {
    type Item = Channel;

    fn next(&mut self) -> Option<Channel> {
        for (line_no, raw_line) in self.lines.by_ref() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix("#EXTINF:") {
                match parse_extinf(rest) {
                    Ok(partial) => self.pending = Some(partial),
                    Err(msg) => {
                        warn!(line = line_no + 1, error = %msg, "skipping malformed #EXTINF line");
                        self.pending = None;
                    }
                }
            } else if line.starts_with('#') {
                continue; // other directives (#EXTM3U, #EXTGRP, ...) are not modeled
            } else if let Some(partial) = self.pending.take() {
                return Some(partial.into_channel(self.source_id, line.to_string()));
            } else {
                debug!(line = line_no + 1, url = line, "stream URL with no preceding #EXTINF, creating bare channel");
                return Some(Channel::new(self.source_id, line.to_string(), line.to_string()));
            }
        }
        None
    }
}

struct PartialChannel {
    display_name: String,
    tvg_id: Option<String>,
    group: Option<String>,
    logo_url: Option<String>,
    chno: Option<String>,
    extra_attrs: std::collections::HashMap<String, String>,
}

impl PartialChannel {
    fn into_channel(self, source_id: Id, stream_url: String) -> Channel {
        let mut channel = Channel::new(source_id, self.display_name, stream_url);
        channel.tvg_id = self.tvg_id;
        channel.group = self.group;
        channel.logo_url = self.logo_url;
        channel.chno = self.chno;
        channel.extra_attrs = self.extra_attrs;
        channel
    }
}

/// Parses `duration [attr="value" ...],title` (the content after `#EXTINF:`).
fn parse_extinf(rest: &str) -> Result<PartialChannel, String> {
    let comma = rest.rfind(',').ok_or("missing ',' separating attributes from title")?;
    let (attrs_part, title_part) = rest.split_at(comma);
    let title = title_part[1..].trim().to_string();

    let mut attrs = std::collections::HashMap::new();
    for (key, value) in parse_attributes(attrs_part) {
        attrs.insert(key.to_ascii_lowercase(), value);
    }

    let mut extra_attrs = std::collections::HashMap::new();
    let mut tvg_id = None;
    let mut group = None;
    let mut logo_url = None;
    let mut chno = None;
    for (key, value) in attrs {
        match key.as_str() {
            "tvg-id" => tvg_id = Some(value),
            "group-title" => group = Some(value),
            "tvg-logo" => logo_url = Some(value),
            "tvg-chno" => chno = Some(value),
            _ => {
                extra_attrs.insert(key, value);
            }
        }
    }

    Ok(PartialChannel {
        display_name: if title.is_empty() { "Unnamed Channel".to_string() } else { title },
        tvg_id,
        group,
        logo_url,
        chno,
        extra_attrs,
    })
}

/// Scans `key=value` pairs tolerating single- and double-quoted values,
/// case-insensitive attribute names, and arbitrary whitespace (spec §4.2).
fn parse_attributes(s: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let bytes: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_whitespace() || bytes[i] == ',') {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len() && (bytes[i].is_alphanumeric() || bytes[i] == '-' || bytes[i] == '_') {
            i += 1;
        }
        if i == key_start {
            i += 1;
            continue;
        }
        let key: String = bytes[key_start..i].iter().collect();

        while i < bytes.len() && bytes[i].is_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != '=' {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let quote = bytes[i];
        if quote != '"' && quote != '\'' {
            continue;
        }
        i += 1;
        let value_start = i;
        while i < bytes.len() && bytes[i] != quote {
            i += 1;
        }
        let value: String = bytes[value_start..i.min(bytes.len())].iter().collect();
        if i < bytes.len() {
            i += 1;
        }
        out.push((key, value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::new_id;

    #[test]
    fn parses_basic_extinf() {
        let source_id = new_id();
        let m3u = r#"#EXTM3U
#EXTINF:-1 tvg-id="bbc1" tvg-logo="http://x/logo.png" group-title="UK",BBC One
http://upstream/bbc1.ts
"#;
        let channels: Vec<_> = parse_m3u(source_id, m3u).collect();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].display_name, "BBC One");
        assert_eq!(channels[0].tvg_id.as_deref(), Some("bbc1"));
        assert_eq!(channels[0].group.as_deref(), Some("UK"));
        assert_eq!(channels[0].stream_url, "http://upstream/bbc1.ts");
    }

    #[test]
    fn tolerates_single_quotes_and_mixed_case_attrs() {
        let source_id = new_id();
        let m3u = "#EXTINF:-1 TVG-ID='bbc2' Group-Title='News',BBC News\nhttp://upstream/bbc2.ts\n";
        let channels: Vec<_> = parse_m3u(source_id, m3u).collect();
        assert_eq!(channels[0].tvg_id.as_deref(), Some("bbc2"));
        assert_eq!(channels[0].group.as_deref(), Some("News"));
    }

    #[test]
    fn skips_malformed_extinf_without_aborting_rest() {
        let source_id = new_id();
        let m3u = "#EXTINF:malformed-no-comma\nhttp://ignored\n#EXTINF:-1,Good Channel\nhttp://upstream/good.ts\n";
        let channels: Vec<_> = parse_m3u(source_id, m3u).collect();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].display_name, "Good Channel");
    }

    #[test]
    fn bare_url_without_extinf_becomes_basic_channel() {
        let source_id = new_id();
        let channels: Vec<_> = parse_m3u(source_id, "http://upstream/bare.ts\n").collect();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].stream_url, "http://upstream/bare.ts");
    }
}
