//! End-to-end rename runs through the public API, with canned exiftool
//! output standing in for the real tool.

use chrono::NaiveDate;
use photo_tidy::actions::{Operation, Outcome};
use photo_tidy::exiftool::{ExifToolError, MetadataReader};
use photo_tidy::metadata::{self, Tags};
use photo_tidy::naming::{self, FilenameTemplate};
use photo_tidy::rename::{self, RenameEvent, RenameOptions};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tempfile::TempDir;

#[derive(Default)]
struct CannedReader {
    tags: HashMap<PathBuf, Tags>,
}

impl CannedReader {
    fn with(mut self, path: &Path, tags: Value) -> Self {
        if let Value::Object(map) = tags {
            self.tags.insert(path.to_path_buf(), map);
        }
        self
    }
}

impl MetadataReader for CannedReader {
    fn read_batch(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, Tags>, ExifToolError> {
        Ok(paths
            .iter()
            .filter_map(|p| self.tags.get(p).map(|t| (p.clone(), t.clone())))
            .collect())
    }
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, name.as_bytes()).unwrap();
    path
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn dry_run_changes_nothing_and_plans_every_file() {
    let tmp = TempDir::new().unwrap();
    let mut reader = CannedReader::default();
    for (i, name) in ["IMG_001.JPG", "IMG_002.JPG", "IMG_003.JPG"].iter().enumerate() {
        let path = touch(tmp.path(), name);
        reader = reader.with(
            &path,
            json!({ "DateTimeOriginal": format!("2024:03:01 10:00:0{i}") }),
        );
    }
    let before = listing(tmp.path());

    let (tx, rx) = mpsc::channel();
    let stats = rename::rename_source(
        &reader,
        tmp.path(),
        false,
        &RenameOptions::default(),
        Some(tx),
    )
    .unwrap();

    assert_eq!(listing(tmp.path()), before);
    assert_eq!(stats.processed, 3);
    let planned = rx
        .iter()
        .filter(|e| matches!(e, RenameEvent::File(r) if r.outcome == Outcome::Planned))
        .count();
    assert_eq!(planned, 3);
}

#[test]
fn identical_metadata_yields_distinct_names() {
    let tmp = TempDir::new().unwrap();
    let tags = json!({ "DateTimeOriginal": "2024:03:01 10:00:00" });
    let mut reader = CannedReader::default();
    for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
        let path = touch(tmp.path(), name);
        reader = reader.with(&path, tags.clone());
    }
    let opts = RenameOptions {
        dry_run: false,
        keep_original: false,
        ..Default::default()
    };

    let stats = rename::rename_source(&reader, tmp.path(), false, &opts, None).unwrap();

    assert_eq!(stats.errors, 0);
    assert_eq!(
        listing(tmp.path()),
        vec![
            "20240301_100000_000-1.jpg",
            "20240301_100000_000-2.jpg",
            "20240301_100000_000-3.jpg",
            "20240301_100000_000.jpg",
        ]
    );
}

#[test]
fn uppercase_extension_is_lowercased() {
    let tmp = TempDir::new().unwrap();
    let path = touch(tmp.path(), "IMG_001.JPG");
    let reader = CannedReader::default().with(
        &path,
        json!({ "DateTimeOriginal": "2023:07:04 18:30:15", "SubSecTimeOriginal": "25" }),
    );
    let opts = RenameOptions {
        dry_run: false,
        ..Default::default()
    };

    rename::rename_source(&reader, tmp.path(), false, &opts, None).unwrap();

    assert_eq!(listing(tmp.path()), vec!["20230704_183015_025_IMG_001.jpg"]);
}

#[test]
fn gps_segment_needs_both_coordinates() {
    let tmp = TempDir::new().unwrap();
    let both = touch(tmp.path(), "both.jpg");
    let lat_only = touch(tmp.path(), "lat.jpg");
    let reader = CannedReader::default()
        .with(
            &both,
            json!({
                "DateTimeOriginal": "2024:03:01 10:00:00",
                "GPSLatitude": 42.3442,
                "GPSLongitude": -71.1443,
            }),
        )
        .with(
            &lat_only,
            json!({ "DateTimeOriginal": "2024:03:01 11:00:00", "GPSLatitude": 42.3442 }),
        );
    let opts = RenameOptions {
        dry_run: false,
        ..Default::default()
    };

    let stats = rename::rename_source(&reader, tmp.path(), false, &opts, None).unwrap();

    assert_eq!(stats.with_gps, 1);
    assert_eq!(
        listing(tmp.path()),
        vec![
            "20240301_100000_000_lat42.3442N_lon71.1443W_both.jpg",
            "20240301_110000_000_lat.jpg",
        ]
    );
}

#[test]
fn filesystem_fallback_time_formats_with_zero_millis() {
    let fallback = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let record = metadata::build_record(Path::new("/x/IMG_9.png"), None, |_| fallback);
    let stem = naming::build_stem(&record, &FilenameTemplate::fixed(false), false);
    assert_eq!(stem, "20240301_100000_000");
}

#[test]
fn copy_into_destination_keeps_sources() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("in");
    let dest = tmp.path().join("out");
    fs::create_dir_all(&src).unwrap();
    let a = touch(&src, "IMG_001.JPG");
    let reader = CannedReader::default().with(
        &a,
        json!({ "CreateDate": "2022:12:31 23:59:59", "Make": "Apple", "Model": "iPhone 13" }),
    );
    let opts = RenameOptions {
        dry_run: false,
        operation: Operation::Copy,
        destination: Some(dest.clone()),
        template: Some("{date}_{device}".parse().unwrap()),
        ..Default::default()
    };

    let stats = rename::rename_source(&reader, &src, false, &opts, None).unwrap();

    assert_eq!(stats.processed, 1);
    assert!(a.exists());
    assert_eq!(listing(&dest), vec!["20221231_Apple_iPhone_13.jpg"]);
}
