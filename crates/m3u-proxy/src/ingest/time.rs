//! XMLTV time normalization (spec §4.2 "Time normalization (EPG only)").
//!
//! XMLTV timestamps are local wall-clock plus an explicit offset, e.g.
//! `20251214140000 +0100`. Storage always wants UTC: subtract the detected
//! offset, then apply the source's configured `timeshift_hours`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEpgTime {
    pub utc: DateTime<Utc>,
    /// The raw offset literal as it appeared on the record (`"+0100"`,
    /// `"Z"`, or `""` for none), preserved on `EpgSource::detected_timezone_offset`.
    pub detected_offset: String,
}

/// Parses an XMLTV `start`/`stop` attribute value. Accepts `YYYYMMDDHHmmss`
/// optionally followed by whitespace and an offset (`+HHMM`, `-HHMM`, or
/// `Z`); an absent offset is treated as UTC (spec: "Empty offset or Z is
/// treated as UTC").
pub fn parse_xmltv_timestamp(raw: &str, timeshift_hours: i32) -> Result<ParsedEpgTime, String> {
    let raw = raw.trim();
    let (datetime_part, offset_part) = match raw.split_once(char::is_whitespace) {
        Some((dt, off)) => (dt, off.trim()),
        None => (raw, ""),
    };

    let naive = NaiveDateTime::parse_from_str(datetime_part, "%Y%m%d%H%M%S")
        .map_err(|e| format!("invalid XMLTV timestamp '{datetime_part}': {e}"))?;

    let offset = if offset_part.is_empty() || offset_part.eq_ignore_ascii_case("z") {
        FixedOffset::east_opt(0).unwrap()
    } else {
        parse_offset(offset_part)?
    };

    let local = offset.from_local_datetime(&naive).single().ok_or_else(|| format!("ambiguous local time '{raw}'"))?;
    let utc = local.with_timezone(&Utc) + chrono::Duration::hours(timeshift_hours as i64);

    Ok(ParsedEpgTime { utc, detected_offset: if offset_part.is_empty() { String::new() } else { offset_part.to_string() } })
}

fn parse_offset(s: &str) -> Result<FixedOffset, String> {
    if s.len() != 5 || !(s.starts_with('+') || s.starts_with('-')) {
        return Err(format!("invalid timezone offset '{s}', expected '+HHMM' or '-HHMM'"));
    }
    let sign = if s.starts_with('-') { -1 } else { 1 };
    let hours: i32 = s[1..3].parse().map_err(|_| format!("invalid offset hours in '{s}'"))?;
    let minutes: i32 = s[3..5].parse().map_err(|_| format!("invalid offset minutes in '{s}'"))?;
    let total_seconds = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(total_seconds).ok_or_else(|| format!("offset '{s}' out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offset_and_converts_to_utc() {
        let parsed = parse_xmltv_timestamp("20251214140000 +0100", 0).unwrap();
        assert_eq!(parsed.utc.to_rfc3339(), "2025-12-14T13:00:00+00:00");
        assert_eq!(parsed.detected_offset, "+0100");
    }

    #[test]
    fn applies_timeshift_after_offset_conversion() {
        let parsed = parse_xmltv_timestamp("20251214140000 +0100", 2).unwrap();
        assert_eq!(parsed.utc.to_rfc3339(), "2025-12-14T15:00:00+00:00");
    }

    #[test]
    fn empty_offset_treated_as_utc() {
        let parsed = parse_xmltv_timestamp("20251214140000", 0).unwrap();
        assert_eq!(parsed.utc.to_rfc3339(), "2025-12-14T14:00:00+00:00");
        assert_eq!(parsed.detected_offset, "");
    }

    #[test]
    fn z_suffix_treated_as_utc() {
        let parsed = parse_xmltv_timestamp("20251214140000 Z", 0).unwrap();
        assert_eq!(parsed.utc.to_rfc3339(), "2025-12-14T14:00:00+00:00");
    }

    #[test]
    fn negative_offset() {
        let parsed = parse_xmltv_timestamp("20251214140000 -0500", 0).unwrap();
        assert_eq!(parsed.utc.to_rfc3339(), "2025-12-14T19:00:00+00:00");
    }
}
