//! Metadata resolution: exiftool tags → [`ImageRecord`].
//!
//! exiftool is run with `-j -n`, so every file comes back as a flat JSON object
//! keyed by tag name with numeric values left unformatted. Each record field is
//! resolved independently from that object, first usable source wins:
//!
//! - **Capture time**: `DateTimeOriginal` → `CreateDate` → `ModifyDate` →
//!   filesystem creation time. A date that is present but unparsable
//!   (`0000:00:00 00:00:00`, garbage, truncated) counts as absent.
//! - **Milliseconds**: `SubSecTimeOriginal` → `SubSecTime` →
//!   `SubSecTimeDigitized` → fraction embedded in the date string → `000`.
//! - **GPS**: `GPSLatitude` + `GPSLongitude`, both required, validated by
//!   [`GpsCoordinates::validate`].
//! - **Device**: `Make` + `Model`.
//!
//! ## Filesystem fallback
//!
//! "Creation time" is platform dependent. `Metadata::created` is used when the
//! platform reports a birth time (macOS, BSD, Linux with statx). Otherwise Unix
//! falls back to the inode change time (`st_ctime`) and other platforms to the
//! modification time. Timestamps are converted to local time, matching the
//! wall-clock time EXIF stores.

use crate::record::{CaptureTime, GpsCoordinates, ImageRecord};
use chrono::{DateTime, Local, NaiveDateTime};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// One file's worth of exiftool output.
pub type Tags = serde_json::Map<String, Value>;

const DATE_TAGS: &[&str] = &["DateTimeOriginal", "CreateDate", "ModifyDate"];
const SUBSEC_TAGS: &[&str] = &["SubSecTimeOriginal", "SubSecTime", "SubSecTimeDigitized"];

/// Resolve a metadata field from multiple sources.
///
/// Takes a list of optional values in priority order and returns the first
/// non-None, non-empty value, trimmed.
pub fn resolve(sources: &[Option<&str>]) -> Option<String> {
    sources
        .iter()
        .filter_map(|opt| {
            opt.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .next()
}

/// Read a tag as text. Numbers are rendered with their JSON representation.
pub fn tag_str(tags: &Tags, key: &str) -> Option<String> {
    match tags.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a tag as a float, accepting numeric strings.
pub fn tag_f64(tags: &Tags, key: &str) -> Option<f64> {
    match tags.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Capture time
// ============================================================================

/// Parse an EXIF-style date value.
///
/// Accepts `YYYY:MM:DD HH:MM:SS` (also with `-` date separators or a `T`),
/// optionally followed by a fraction (`.123`) and/or a timezone suffix
/// (`+02:00`, `Z`), which is ignored: EXIF times are local wall-clock times.
/// Numeric values are treated as Unix epoch seconds.
///
/// Returns the datetime and, when present, the embedded milliseconds.
pub fn parse_exif_datetime(value: &Value) -> Option<(NaiveDateTime, Option<u16>)> {
    match value {
        Value::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            let dt = DateTime::from_timestamp(secs, 0)?;
            Some((dt.with_timezone(&Local).naive_local(), None))
        }
        Value::String(s) => parse_exif_datetime_str(s),
        _ => None,
    }
}

fn parse_exif_datetime_str(s: &str) -> Option<(NaiveDateTime, Option<u16>)> {
    let s = s.trim();
    if s.len() < 19 || !s.is_char_boundary(19) {
        return None;
    }
    let (main, rest) = s.split_at(19);
    let formats = ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y:%m:%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    let datetime = formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(main, fmt).ok())?;
    let millis = rest
        .strip_prefix('.')
        .and_then(|frac| {
            let digits: String = frac.chars().take_while(char::is_ascii_digit).collect();
            fraction_to_millis(&digits)
        });
    Some((datetime, millis))
}

/// Interpret the digits after a date string's `.` as a decimal fraction:
/// `"5"` → 500, `"045"` → 45, `"123456"` → 123.
fn fraction_to_millis(digits: &str) -> Option<u16> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut padded: String = digits.chars().take(3).collect();
    while padded.len() < 3 {
        padded.push('0');
    }
    padded.parse().ok()
}

/// Left-pad to three digits and keep the first three: `"5"` → 5,
/// `"27"` → 27, `"123456"` → 123. Names produced by earlier renames of the
/// same library depend on this exact mapping.
fn subsec_to_millis(digits: &str) -> Option<u16> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{digits:0>3}");
    padded[..3].parse().ok()
}

/// Parse a `SubSecTime*` value into milliseconds.
///
/// exiftool emits these as JSON strings when they have leading zeros and as
/// numbers otherwise, so both shapes are accepted.
pub fn parse_subsec(value: &Value) -> Option<u16> {
    match value {
        Value::String(s) => subsec_to_millis(s.trim()),
        Value::Number(n) => n.as_u64().and_then(|v| subsec_to_millis(&v.to_string())),
        _ => None,
    }
}

/// Best EXIF capture time, or `None` when no date tag parses.
pub fn extract_capture(tags: &Tags) -> Option<CaptureTime> {
    let (datetime, embedded_millis) = DATE_TAGS.iter().find_map(|key| {
        let value = tags.get(*key)?;
        let parsed = parse_exif_datetime(value);
        if parsed.is_none() {
            debug!(tag = key, value = %value, "unparsable date tag");
        }
        parsed
    })?;
    let millis = SUBSEC_TAGS
        .iter()
        .find_map(|key| tags.get(*key).and_then(parse_subsec))
        .or(embedded_millis)
        .unwrap_or(0);
    Some(CaptureTime::exif(datetime, millis))
}

// ============================================================================
// GPS and device
// ============================================================================

/// Signed coordinate from a value/reference pair. A positive value with a
/// southern or western reference is negated.
fn signed_coordinate(tags: &Tags, key: &str, ref_key: &str, negative_ref: char) -> Option<f64> {
    let value = tag_f64(tags, key)?;
    let negative = tag_str(tags, ref_key)
        .and_then(|r| r.trim().chars().next())
        .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref));
    Some(if negative && value > 0.0 { -value } else { value })
}

pub fn extract_gps(tags: &Tags) -> Option<GpsCoordinates> {
    let lat = signed_coordinate(tags, "GPSLatitude", "GPSLatitudeRef", 'S')?;
    let lon = signed_coordinate(tags, "GPSLongitude", "GPSLongitudeRef", 'W')?;
    GpsCoordinates::validate(lat, lon)
}

/// `Make` + `Model`, dropping a make that the model already repeats
/// (`Canon` + `Canon EOS R5` → `Canon EOS R5`).
pub fn extract_device(tags: &Tags) -> Option<String> {
    let make = resolve(&[tag_str(tags, "Make").as_deref()]);
    let model = resolve(&[tag_str(tags, "Model").as_deref()]);
    match (make, model) {
        (Some(make), Some(model)) => {
            if model.to_lowercase().starts_with(&make.to_lowercase()) {
                Some(model)
            } else {
                Some(format!("{make} {model}"))
            }
        }
        (make, model) => make.or(model),
    }
}

// ============================================================================
// Filesystem fallback
// ============================================================================

/// Creation time of `path` in local time; the current time (with a warning)
/// if the file cannot be stat'ed at all.
pub fn filesystem_time(path: &Path) -> NaiveDateTime {
    match fs::metadata(path) {
        Ok(meta) => {
            if let Some(t) = creation_time(&meta) {
                return t.naive_local();
            }
            warn!(path = %path.display(), "no usable filesystem timestamp, using current time");
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to stat file, using current time");
        }
    }
    Local::now().naive_local()
}

fn creation_time(meta: &fs::Metadata) -> Option<DateTime<Local>> {
    if let Ok(created) = meta.created() {
        return Some(created.into());
    }
    inode_change_time(meta)
}

#[cfg(unix)]
fn inode_change_time(meta: &fs::Metadata) -> Option<DateTime<Local>> {
    use std::os::unix::fs::MetadataExt;
    let nanos = u32::try_from(meta.ctime_nsec()).unwrap_or(0);
    DateTime::from_timestamp(meta.ctime(), nanos).map(|t| t.with_timezone(&Local))
}

#[cfg(not(unix))]
fn inode_change_time(meta: &fs::Metadata) -> Option<DateTime<Local>> {
    meta.modified().ok().map(Into::into)
}

// ============================================================================
// Record assembly
// ============================================================================

/// Build the record for one file.
///
/// `fallback` is only invoked when no EXIF date is usable, so callers can
/// pass [`filesystem_time`] without paying for a stat on every file.
pub fn build_record(
    path: &Path,
    tags: Option<&Tags>,
    fallback: impl FnOnce(&Path) -> NaiveDateTime,
) -> ImageRecord {
    let capture = tags.and_then(extract_capture);
    let capture = match capture {
        Some(c) => c,
        None => {
            debug!(path = %path.display(), "no EXIF date, using filesystem timestamp");
            CaptureTime::filesystem(fallback(path))
        }
    };
    let mut record = ImageRecord::new(path, capture);
    if let Some(tags) = tags {
        record.has_exif = true;
        record.gps = extract_gps(tags);
        record.device = extract_device(tags);
    }
    record
}
