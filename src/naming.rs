//! Filename construction from an [`ImageRecord`].
//!
//! A [`FilenameTemplate`] is compiled once per run and rendered once per file.
//! Rendering is pure: no filesystem access, same record in, same name out.
//!
//! ## Templates
//!
//! The stock layout is:
//!
//! ```text
//! {date}_{time}_{ms}{gps}_{original}      20240301_100000_000_lat42.3442N_lon71.1443W_IMG_001
//! {date}_{time}_{ms}{gps}                 with --no-original
//! ```
//!
//! Custom templates use the same single-brace placeholders:
//!
//! | Placeholder  | Renders                                                |
//! |--------------|--------------------------------------------------------|
//! | `{date}`     | `YYYYMMDD`                                             |
//! | `{time}`     | `HHMMSS`                                               |
//! | `{ms}`       | milliseconds, 3 digits                                 |
//! | `{gps}`      | `_lat42.3442N_lon71.1443W`, or nothing                 |
//! | `{original}` | source file stem                                       |
//! | `{year}` `{month}` `{day}` `{hour}` `{minute}` `{second}` | zero-padded |
//! | `{camera}`   | make/model when camera inclusion is on, else nothing   |
//! | `{device}`   | make/model, or `Unknown`                               |
//!
//! `{{` and `}}` produce literal braces. Unknown placeholders and stray braces
//! are rejected when the template is parsed, before any file is touched.
//!
//! ## Sanitization
//!
//! The rendered stem is cleaned by [`sanitize_stem`]: path separators,
//! characters Windows forbids, control characters and invisible Unicode
//! formatting characters become `_`, whitespace becomes `_`, `_` runs
//! collapse, and the result is trimmed and capped at [`MAX_STEM_BYTES`].

use crate::record::{ImageRecord, UNKNOWN_DEVICE};
use chrono::{Datelike, Timelike};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest stem we produce, in bytes. Leaves room for a collision suffix and
/// an extension under the usual 255-byte filename limit.
pub const MAX_STEM_BYTES: usize = 200;

/// Stem used when sanitization leaves nothing.
pub const EMPTY_STEM: &str = "unnamed";

/// The stock template, for documentation and config output.
pub const DEFAULT_TEMPLATE: &str = "{date}_{time}_{ms}{gps}_{original}";

#[derive(Error, Debug, PartialEq)]
pub enum NamingError {
    #[error("filename template is empty")]
    Empty,
    #[error("unknown placeholder {{{name}}} in template {template:?}")]
    UnknownPlaceholder { name: String, template: String },
    #[error("unbalanced brace at byte {position} in template {template:?} (use {{{{ or }}}} for a literal brace)")]
    UnbalancedBrace { position: usize, template: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Date,
    Time,
    Ms,
    Gps,
    Original,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Camera,
    Device,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "date" => Field::Date,
            "time" => Field::Time,
            "ms" => Field::Ms,
            "gps" => Field::Gps,
            "original" => Field::Original,
            "year" => Field::Year,
            "month" => Field::Month,
            "day" => Field::Day,
            "hour" => Field::Hour,
            "minute" => Field::Minute,
            "second" => Field::Second,
            "camera" => Field::Camera,
            "device" => Field::Device,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A compiled filename template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl FilenameTemplate {
    /// The stock layout, with or without the trailing `_{original}`.
    pub fn fixed(keep_original: bool) -> Self {
        let mut segments = vec![
            Segment::Field(Field::Date),
            Segment::Literal("_".into()),
            Segment::Field(Field::Time),
            Segment::Literal("_".into()),
            Segment::Field(Field::Ms),
            Segment::Field(Field::Gps),
        ];
        let mut source = String::from("{date}_{time}_{ms}{gps}");
        if keep_original {
            segments.push(Segment::Literal("_".into()));
            segments.push(Segment::Field(Field::Original));
            source.push_str("_{original}");
        }
        Self { source, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render the unsanitized stem.
    fn render(&self, record: &ImageRecord, include_camera: bool) -> String {
        let capture = &record.capture;
        let dt = &capture.datetime;
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(field) => match field {
                    Field::Date => out.push_str(&capture.date_segment()),
                    Field::Time => out.push_str(&capture.time_segment()),
                    Field::Ms => out.push_str(&capture.millis_segment()),
                    Field::Gps => {
                        if let Some(gps) = &record.gps {
                            out.push('_');
                            out.push_str(&gps.filename_segment());
                        }
                    }
                    Field::Original => out.push_str(&record.original_stem),
                    Field::Year => out.push_str(&format!("{:04}", dt.year())),
                    Field::Month => out.push_str(&format!("{:02}", dt.month())),
                    Field::Day => out.push_str(&format!("{:02}", dt.day())),
                    Field::Hour => out.push_str(&format!("{:02}", dt.hour())),
                    Field::Minute => out.push_str(&format!("{:02}", dt.minute())),
                    Field::Second => out.push_str(&format!("{:02}", dt.second())),
                    Field::Camera => {
                        if include_camera && let Some(device) = &record.device {
                            out.push_str(device);
                        }
                    }
                    Field::Device => out.push_str(record.device.as_deref().unwrap_or(UNKNOWN_DEVICE)),
                },
            }
        }
        out
    }
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        Self::fixed(true)
    }
}

impl fmt::Display for FilenameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for FilenameTemplate {
    type Err = NamingError;

    fn from_str(template: &str) -> Result<Self, Self::Err> {
        if template.trim().is_empty() {
            return Err(NamingError::Empty);
        }
        let unbalanced = |position| NamingError::UnbalancedBrace {
            position,
            template: template.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().is_some_and(|&(_, n)| n == '{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().is_some_and(|&(_, n)| n == '}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(unbalanced(pos)),
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((p, '{')) => return Err(unbalanced(p)),
                            Some((_, ch)) => name.push(ch),
                            None => return Err(unbalanced(pos)),
                        }
                    }
                    let field = Field::from_name(name.trim()).ok_or_else(|| {
                        NamingError::UnknownPlaceholder {
                            name: name.clone(),
                            template: template.to_string(),
                        }
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }
}

// ============================================================================
// Building and sanitizing
// ============================================================================

/// Sanitized stem for `record`, without extension.
pub fn build_stem(record: &ImageRecord, template: &FilenameTemplate, include_camera: bool) -> String {
    sanitize_stem(&template.render(record, include_camera))
}

/// Full filename: sanitized stem plus the lowercased extension.
pub fn build_filename(record: &ImageRecord, template: &FilenameTemplate, include_camera: bool) -> String {
    join_extension(&build_stem(record, template, include_camera), &record.extension)
}

/// `stem.ext`, or just `stem` when there is no extension.
pub fn join_extension(stem: &str, extension: &str) -> String {
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

fn is_invisible_format_char(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
    )
}

fn is_unsafe_char(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
        || c.is_control()
        || c.is_whitespace()
        || is_invisible_format_char(c)
}

fn trim_stem(s: &str) -> &str {
    s.trim_matches(|c: char| c == '_' || c == '.' || c == ' ')
}

/// Make a string safe to use as a filename stem on every common filesystem.
///
/// Never returns an empty string and never exceeds [`MAX_STEM_BYTES`].
pub fn sanitize_stem(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if is_unsafe_char(c) { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let mut stem = trim_stem(&out);
    if stem.len() > MAX_STEM_BYTES {
        let mut end = MAX_STEM_BYTES;
        while !stem.is_char_boundary(end) {
            end -= 1;
        }
        stem = trim_stem(&stem[..end]);
    }

    if stem.is_empty() {
        EMPTY_STEM.to_string()
    } else {
        stem.to_string()
    }
}
