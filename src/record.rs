//! The per-file metadata record used by the rename pipeline.
//!
//! An [`ImageRecord`] is built once per source file per run, handed to the
//! filename builder, and dropped once the file action completes. Nothing here
//! touches the filesystem; see [`metadata`](crate::metadata) for how records
//! are resolved from exiftool tags and filesystem timestamps.

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::path::{Path, PathBuf};

/// Label rendered for `{device}` when the camera make/model is unknown.
pub const UNKNOWN_DEVICE: &str = "Unknown";

/// Where a [`CaptureTime`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// EXIF `DateTimeOriginal` / `CreateDate` / `ModifyDate`.
    Exif,
    /// Filesystem creation time (or the closest thing the platform offers).
    Filesystem,
}

/// Best-known capture timestamp with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTime {
    pub datetime: NaiveDateTime,
    /// 0–999. Always 0 for filesystem timestamps.
    pub millis: u16,
    pub source: TimeSource,
}

impl CaptureTime {
    pub fn exif(datetime: NaiveDateTime, millis: u16) -> Self {
        Self {
            datetime,
            millis: millis.min(999),
            source: TimeSource::Exif,
        }
    }

    pub fn filesystem(datetime: NaiveDateTime) -> Self {
        Self {
            datetime,
            millis: 0,
            source: TimeSource::Filesystem,
        }
    }

    /// `YYYYMMDD`
    pub fn date_segment(&self) -> String {
        let d = self.datetime.date();
        format!("{:04}{:02}{:02}", d.year(), d.month(), d.day())
    }

    /// `HHMMSS`
    pub fn time_segment(&self) -> String {
        let t = self.datetime.time();
        format!("{:02}{:02}{:02}", t.hour(), t.minute(), t.second())
    }

    /// Three-digit millisecond field, `000` when unknown.
    pub fn millis_segment(&self) -> String {
        format!("{:03}", self.millis)
    }
}

/// A validated latitude/longitude pair.
///
/// Only constructed through [`GpsCoordinates::validate`], so every instance is
/// finite, in range, and away from null island.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsCoordinates {
    latitude: f64,
    longitude: f64,
}

/// Both coordinates within this many degrees of zero is treated as a
/// placeholder written by a device without a fix.
const NULL_ISLAND_EPSILON: f64 = 0.01;

/// Decimal places used when rendering coordinates into filenames.
pub const GPS_PRECISION: usize = 4;

impl GpsCoordinates {
    /// Returns `None` unless both values are finite, within ±90/±180, and not
    /// both near (0, 0).
    pub fn validate(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) {
            tracing::debug!(latitude, "latitude out of range");
            return None;
        }
        if !(-180.0..=180.0).contains(&longitude) {
            tracing::debug!(longitude, "longitude out of range");
            return None;
        }
        if latitude.abs() < NULL_ISLAND_EPSILON && longitude.abs() < NULL_ISLAND_EPSILON {
            tracing::debug!("GPS coordinates near (0,0), ignoring");
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// `lat42.3442N_lon71.1443W`
    pub fn filename_segment(&self) -> String {
        let ns = if self.latitude < 0.0 { 'S' } else { 'N' };
        let ew = if self.longitude < 0.0 { 'W' } else { 'E' };
        format!(
            "lat{:.prec$}{ns}_lon{:.prec$}{ew}",
            self.latitude.abs(),
            self.longitude.abs(),
            prec = GPS_PRECISION
        )
    }
}

/// Everything the filename builder needs to know about one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub source_path: PathBuf,
    pub capture: CaptureTime,
    pub gps: Option<GpsCoordinates>,
    /// Camera make/model, `None` when the file carries neither.
    pub device: Option<String>,
    /// File stem of the source, unsanitized.
    pub original_stem: String,
    /// Lowercased extension without the dot; empty if the file has none.
    pub extension: String,
    /// Whether the metadata tool returned any tags for this file.
    pub has_exif: bool,
}

impl ImageRecord {
    /// A record with nothing but a timestamp, derived from the path.
    pub fn new(source_path: impl Into<PathBuf>, capture: CaptureTime) -> Self {
        let source_path = source_path.into();
        let original_stem = file_stem(&source_path);
        let extension = normalized_extension(&source_path);
        Self {
            source_path,
            capture,
            gps: None,
            device: None,
            original_stem,
            extension,
            has_exif: false,
        }
    }

    pub fn device_label(&self) -> &str {
        self.device.as_deref().unwrap_or(UNKNOWN_DEVICE)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lowercased extension without the leading dot.
pub fn normalized_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
