//! Streaming, tolerant XMLTV parser (spec §4.2 "XMLTV" parsing contract).
//!
//! Magic-byte decompression (gzip/bzip2/xz) happens before this is called;
//! this module only ever sees XML text. Programs are handed to the caller
//! one at a time through a callback rather than collected into a `Vec`, so
//! the caller (`Ingestor::fetch_and_persist_epg`) can persist fixed-size
//! batches as they're produced instead of holding an entire guide's worth
//! of programs in memory at once.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::warn;

use crate::models::{EpgProgram, Id, ProgramFlags};

use super::time::parse_xmltv_timestamp;

#[derive(Debug, Clone)]
pub struct XmltvChannelMeta {
    pub tvg_id: String,
    pub display_name: Option<String>,
    pub icon_url: Option<String>,
}

#[derive(Debug, Default)]
pub struct XmltvParseResult {
    pub channels: Vec<XmltvChannelMeta>,
    pub program_count: usize,
    /// Set from the first successfully-parsed timestamp's offset literal,
    /// recorded on `EpgSource::detected_timezone_offset`.
    pub detected_offset: Option<String>,
    pub skipped_records: u32,
}

/// Parses XMLTV content token-by-token so memory stays bounded regardless
/// of document size. Unknown child elements are skipped; a malformed
/// `<programme>` is logged and dropped, not fatal (spec §4.2). Each
/// successfully-parsed program is handed to `on_program` as soon as its
/// closing tag is read, rather than accumulated here.
pub fn parse_xmltv(source_id: Id, content: &str, timeshift_hours: i32, on_program: &mut dyn FnMut(EpgProgram)) -> XmltvParseResult {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut result = XmltvParseResult::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"channel" => {
                if let Some(meta) = read_channel(&mut reader, &e) {
                    result.channels.push(meta);
                }
            }
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"programme" => match read_programme(&mut reader, &e, source_id, timeshift_hours) {
                Ok(Some((program, offset))) => {
                    if result.detected_offset.is_none() && !offset.is_empty() {
                        result.detected_offset = Some(offset);
                    }
                    result.program_count += 1;
                    on_program(program);
                }
                Ok(None) => {}
                Err(msg) => {
                    warn!(error = %msg, "skipping malformed <programme>");
                    result.skipped_records += 1;
                }
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "XML token error, skipping to next event");
            }
        }
        buf.clear();
    }

    result
}

fn attr_value(e: &quick_xml::events::BytesStart, name: &str) -> Option<String> {
    e.attributes().flatten().find(|a| a.key.as_ref() == name.as_bytes()).and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn read_channel(reader: &mut Reader<&[u8]>, start: &quick_xml::events::BytesStart) -> Option<XmltvChannelMeta> {
    let tvg_id = attr_value(start, "id")?;
    let mut display_name = None;
    let mut icon_url = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::End(e)) if e.local_name().as_ref() == b"channel" => break,
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"icon" => {
                icon_url = attr_value(&e, "src");
            }
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"display-name" => {
                if let Ok(Event::Text(t)) = reader.read_event_into(&mut buf) {
                    display_name = t.unescape().ok().map(|s| s.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        buf.clear();
    }

    Some(XmltvChannelMeta { tvg_id, display_name, icon_url })
}

fn read_programme(
    reader: &mut Reader<&[u8]>,
    start: &quick_xml::events::BytesStart,
    source_id: Id,
    timeshift_hours: i32,
) -> Result<Option<(EpgProgram, String)>, String> {
    let channel_tvg_id = attr_value(start, "channel").ok_or("missing 'channel' attribute")?;
    let start_raw = attr_value(start, "start").ok_or("missing 'start' attribute")?;
    let stop_raw = attr_value(start, "stop").unwrap_or_else(|| start_raw.clone());

    let parsed_start = parse_xmltv_timestamp(&start_raw, timeshift_hours)?;
    let parsed_stop = parse_xmltv_timestamp(&stop_raw, timeshift_hours)?;

    let mut title = String::new();
    let mut sub_title = None;
    let mut description = None;
    let mut category = None;
    let mut icon_url = None;
    let mut episode_num = None;
    let mut rating = None;
    let mut language = None;
    let mut flags = ProgramFlags::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::End(e)) if e.local_name().as_ref() == b"programme" => break,
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"title" => title = read_text(reader, &mut buf),
                    b"sub-title" => sub_title = Some(read_text(reader, &mut buf)),
                    b"desc" => description = Some(read_text(reader, &mut buf)),
                    b"category" => category = Some(read_text(reader, &mut buf)),
                    b"icon" => icon_url = attr_value(&e, "src"),
                    b"episode-num" => episode_num = Some(read_text(reader, &mut buf)),
                    b"rating" => rating = Some(read_text(reader, &mut buf)),
                    b"language" => language = Some(read_text(reader, &mut buf)),
                    b"new" => flags.is_new = true,
                    b"premiere" => flags.is_premiere = true,
                    _ => {}
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
        buf.clear();
    }

    if title.is_empty() {
        title = "Untitled".to_string();
    }

    let mut program = EpgProgram::new(source_id, channel_tvg_id, parsed_start.utc, parsed_stop.utc, title)
        .map_err(|e| e.to_string())?;
    program.sub_title = sub_title;
    program.description = description;
    program.category = category;
    program.icon_url = icon_url;
    program.episode_num = episode_num;
    program.rating = rating;
    program.language = language;
    program.flags = flags;

    Ok(Some((program, parsed_start.detected_offset)))
}

/// Reads the text content of the element just opened, tolerating a
/// premature end tag (spec §4.2 "tolerant of non-strict XML").
fn read_text(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> String {
    match reader.read_event_into(buf) {
        Ok(Event::Text(t)) => t.unescape().map(|s| s.into_owned()).unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::new_id;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<tv>
  <channel id="bbc1">
    <display-name>BBC One</display-name>
    <icon src="http://x/bbc1.png"/>
  </channel>
  <programme channel="bbc1" start="20251214140000 +0100" stop="20251214150000 +0100">
    <title>News at Two</title>
    <desc>The latest headlines.</desc>
    <category>News</category>
  </programme>
</tv>"#;

    #[test]
    fn parses_channels_and_programmes() {
        let source_id = new_id();
        let mut programs = Vec::new();
        let result = parse_xmltv(source_id, SAMPLE, 0, &mut |p| programs.push(p));
        assert_eq!(result.channels.len(), 1);
        assert_eq!(result.channels[0].tvg_id, "bbc1");
        assert_eq!(result.program_count, 1);
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "News at Two");
        assert_eq!(programs[0].channel_tvg_id, "bbc1");
        assert_eq!(result.detected_offset.as_deref(), Some("+0100"));
    }

    #[test]
    fn skips_programme_missing_required_attrs() {
        let source_id = new_id();
        let xml = r#"<tv><programme channel="x"><title>No start attr</title></programme></tv>"#;
        let mut programs = Vec::new();
        let result = parse_xmltv(source_id, xml, 0, &mut |p| programs.push(p));
        assert_eq!(programs.len(), 0);
        assert_eq!(result.skipped_records, 1);
    }
}
