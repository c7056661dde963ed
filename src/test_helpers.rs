//! Shared test utilities for the photo-tidy test suite.
//!
//! Provides fixture writers (plain files, synthetic JPEGs with an EXIF
//! Orientation tag, PNGs) and a [`MockReader`] that stands in for exiftool.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let a = write_file(tmp.path(), "IMG_001.JPG", b"x");
//! let reader = MockReader::default().with(&a, json!({ "DateTimeOriginal": "2024:03:01 10:00:00" }));
//! ```

use crate::exiftool::{ExifToolError, MetadataReader};
use crate::metadata::Tags;
use image::{ImageFormat, RgbImage};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// =========================================================================
// Fixture files
// =========================================================================

/// Write `contents` to `dir/rel`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn write_png(path: &Path, img: &RgbImage) {
    img.save_with_format(path, ImageFormat::Png).unwrap();
}

/// A gradient JPEG, optionally carrying an EXIF Orientation tag.
pub fn jpeg_with_orientation(width: u32, height: u32, orientation: Option<u16>) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut jpeg = Vec::new();
    img.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .unwrap();

    let Some(orientation) = orientation else {
        return jpeg;
    };

    // APP1 "Exif" segment: big-endian TIFF header, one IFD0 entry.
    let mut payload = Vec::new();
    payload.extend_from_slice(b"Exif\0\0");
    payload.extend_from_slice(b"MM\0\x2A\0\0\0\x08");
    payload.extend_from_slice(&1u16.to_be_bytes()); // entry count
    payload.extend_from_slice(&0x0112u16.to_be_bytes()); // Orientation
    payload.extend_from_slice(&3u16.to_be_bytes()); // SHORT
    payload.extend_from_slice(&1u32.to_be_bytes()); // count
    payload.extend_from_slice(&orientation.to_be_bytes());
    payload.extend_from_slice(&[0, 0]); // value padding
    payload.extend_from_slice(&0u32.to_be_bytes()); // no next IFD

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

// =========================================================================
// Metadata reader
// =========================================================================

/// Canned exiftool output keyed by path. Records the size of every batch.
#[derive(Default)]
pub struct MockReader {
    tags: HashMap<PathBuf, Tags>,
    batches: Mutex<Vec<usize>>,
}

impl MockReader {
    /// Register tags (a JSON object) for `path`.
    pub fn with(mut self, path: &Path, tags: Value) -> Self {
        match tags {
            Value::Object(map) => {
                self.tags.insert(path.to_path_buf(), map);
            }
            other => panic!("mock tags must be a JSON object, got {other}"),
        }
        self
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

impl MetadataReader for MockReader {
    fn read_batch(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, Tags>, ExifToolError> {
        self.batches.lock().unwrap().push(paths.len());
        Ok(paths
            .iter()
            .filter_map(|p| self.tags.get(p).map(|t| (p.clone(), t.clone())))
            .collect())
    }
}
