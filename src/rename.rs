//! The rename pipeline.
//!
//! ```text
//! files ─► batches of N ─► exiftool ─► ImageRecord ─► filename ─► NameRegistry ─► action
//! ```
//!
//! Files are handled strictly in the order given (the scanner sorts them), so
//! when two files want the same name the first one in path order gets it and
//! later ones get `-1`, `-2`, … suffixes.
//!
//! Progress is reported as [`RenameEvent`]s over an optional channel; the
//! binary drains it on a printer thread while this module keeps working.
//! A failing file is reported and counted, never fatal. The only fatal errors
//! are configuration problems and exiftool itself becoming unusable.

use crate::actions::{self, Operation, Outcome};
use crate::collision::NameRegistry;
use crate::exiftool::{ExifToolError, MetadataReader};
use crate::metadata::{self, Tags};
use crate::naming::{self, FilenameTemplate};
use crate::record::{CaptureTime, GpsCoordinates};
use crate::scan::{self, ScanError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info};

/// Files per exiftool invocation.
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Error, Debug)]
pub enum RenameError {
    #[error("--preserve-structure requires a destination directory")]
    PreserveWithoutDestination,
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    ExifTool(#[from] ExifToolError),
}

#[derive(Debug, Clone)]
pub struct RenameOptions {
    /// Target directory; `None` renames in place.
    pub destination: Option<PathBuf>,
    pub operation: Operation,
    pub dry_run: bool,
    /// Mirror source subdirectories under `destination`.
    pub preserve_structure: bool,
    /// Append `_{original}` to the stock layout. Ignored by custom templates.
    pub keep_original: bool,
    pub include_camera: bool,
    /// Custom template; `None` uses the stock layout.
    pub template: Option<FilenameTemplate>,
    pub batch_size: usize,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            destination: None,
            operation: Operation::Rename,
            dry_run: true,
            preserve_structure: false,
            keep_original: true,
            include_camera: false,
            template: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl RenameOptions {
    pub fn effective_template(&self) -> FilenameTemplate {
        self.template
            .clone()
            .unwrap_or_else(|| FilenameTemplate::fixed(self.keep_original))
    }

    fn validate(&self) -> Result<(), RenameError> {
        if self.preserve_structure && self.destination.is_none() {
            return Err(RenameError::PreserveWithoutDestination);
        }
        if self.batch_size == 0 {
            return Err(RenameError::ZeroBatchSize);
        }
        Ok(())
    }

    /// Directory the renamed `file` should land in.
    fn target_dir(&self, file: &Path, base_dir: &Path) -> PathBuf {
        let parent = file.parent().unwrap_or(Path::new("")).to_path_buf();
        match &self.destination {
            None => parent,
            Some(dest) if self.preserve_structure => match parent.strip_prefix(base_dir) {
                Ok(rel) => dest.join(rel),
                Err(_) => dest.clone(),
            },
            Some(dest) => dest.clone(),
        }
    }
}

/// Result for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub operation: Operation,
    pub outcome: Outcome,
    pub capture: CaptureTime,
    pub gps: Option<GpsCoordinates>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenameEvent {
    Started { total: usize, dry_run: bool },
    File(FileReport),
    Finished(RenameStats),
}

/// Totals for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameStats {
    pub total: usize,
    /// Applied, or planned in dry-run.
    pub processed: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub error_details: Vec<String>,
    pub exif_dated: usize,
    pub filesystem_dated: usize,
    pub with_gps: usize,
    pub dry_run: bool,
}

impl RenameStats {
    fn record(&mut self, report: &FileReport) {
        match &report.outcome {
            Outcome::Planned | Outcome::Applied => self.processed += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Failed(reason) => {
                self.errors += 1;
                self.error_details
                    .push(format!("{}: {reason}", report.source.display()));
            }
        }
        match report.capture.source {
            crate::record::TimeSource::Exif => self.exif_dated += 1,
            crate::record::TimeSource::Filesystem => self.filesystem_dated += 1,
        }
        if report.gps.is_some() {
            self.with_gps += 1;
        }
    }
}

fn emit(events: Option<&Sender<RenameEvent>>, event: RenameEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// Scan `source` and rename everything found.
pub fn rename_source(
    reader: &dyn MetadataReader,
    source: &Path,
    recursive: bool,
    opts: &RenameOptions,
    events: Option<Sender<RenameEvent>>,
) -> Result<RenameStats, RenameError> {
    opts.validate()?;
    let files = scan::collect_images(source, recursive)?;
    let base_dir = if source.is_dir() {
        source.to_path_buf()
    } else {
        source.parent().unwrap_or(Path::new("")).to_path_buf()
    };
    rename_files(reader, &files, &base_dir, opts, events)
}

/// Rename `files`, in order. `base_dir` anchors relative paths for
/// `preserve_structure`.
pub fn rename_files(
    reader: &dyn MetadataReader,
    files: &[PathBuf],
    base_dir: &Path,
    opts: &RenameOptions,
    events: Option<Sender<RenameEvent>>,
) -> Result<RenameStats, RenameError> {
    opts.validate()?;
    let template = opts.effective_template();
    let events = events.as_ref();

    info!(files = files.len(), dry_run = opts.dry_run, template = %template, "renaming");
    emit(
        events,
        RenameEvent::Started {
            total: files.len(),
            dry_run: opts.dry_run,
        },
    );

    let mut stats = RenameStats {
        total: files.len(),
        dry_run: opts.dry_run,
        ..Default::default()
    };
    let mut registry = NameRegistry::new();

    for batch in files.chunks(opts.batch_size) {
        let tags: HashMap<PathBuf, Tags> = reader.read_batch(batch)?;
        debug!(batch = batch.len(), with_tags = tags.len(), "metadata batch read");

        for file in batch {
            let record = metadata::build_record(file, tags.get(file), metadata::filesystem_time);
            let stem = naming::build_stem(&record, &template, opts.include_camera);
            let dir = opts.target_dir(file, base_dir);
            let destination = registry.claim(&dir, &stem, &record.extension, file);
            let outcome = actions::execute(file, &destination, opts.operation, opts.dry_run);
            if opts.operation == Operation::Rename
                && matches!(outcome, Outcome::Planned | Outcome::Applied)
            {
                registry.release(file);
            }

            if outcome == Outcome::Applied {
                info!(
                    from = %file.display(),
                    to = %destination.display(),
                    "{}",
                    opts.operation.verb()
                );
            }

            let report = FileReport {
                source: file.clone(),
                destination,
                operation: opts.operation,
                outcome,
                capture: record.capture,
                gps: record.gps,
            };
            stats.record(&report);
            emit(events, RenameEvent::File(report));
        }
    }

    emit(events, RenameEvent::Finished(stats.clone()));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockReader, write_file};
    use serde_json::json;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn dated(date: &str) -> serde_json::Value {
        json!({ "DateTimeOriginal": date })
    }

    #[test]
    fn preserve_structure_needs_destination() {
        let opts = RenameOptions {
            preserve_structure: true,
            ..Default::default()
        };
        let err = rename_files(&MockReader::default(), &[], Path::new("."), &opts, None).unwrap_err();
        assert!(matches!(err, RenameError::PreserveWithoutDestination));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let opts = RenameOptions {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            rename_files(&MockReader::default(), &[], Path::new("."), &opts, None),
            Err(RenameError::ZeroBatchSize)
        ));
    }

    #[test]
    fn renames_in_place() {
        let tmp = TempDir::new().unwrap();
        let a = write_file(tmp.path(), "IMG_001.JPG", b"a");
        let reader = MockReader::default().with(&a, dated("2024:03:01 10:00:00"));
        let opts = RenameOptions {
            dry_run: false,
            ..Default::default()
        };
        let stats = rename_files(&reader, &[a], tmp.path(), &opts, None).unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.exif_dated, 1);
        assert_eq!(listing(tmp.path()), vec!["20240301_100000_000_IMG_001.jpg"]);
    }

    #[test]
    fn second_run_reports_unchanged() {
        let tmp = TempDir::new().unwrap();
        let a = write_file(tmp.path(), "20240301_100000_000_IMG_001.jpg", b"a");
        let reader = MockReader::default().with(&a, dated("2024:03:01 10:00:00"));
        let opts = RenameOptions {
            dry_run: false,
            keep_original: false,
            template: Some("{date}_{time}_{ms}{gps}_IMG_001".parse().unwrap()),
            ..Default::default()
        };
        let stats = rename_files(&reader, &[a.clone()], tmp.path(), &opts, None).unwrap();
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.processed, 0);
        assert!(a.exists());
    }

    #[test]
    fn dry_run_plans_the_names_the_real_run_uses() {
        let run = |dry_run: bool| {
            let tmp = TempDir::new().unwrap();
            // Sorts first and moves away, freeing its name for b.jpg.
            let first = write_file(tmp.path(), "20240101.jpg", b"a");
            let second = write_file(tmp.path(), "b.jpg", b"b");
            let reader = MockReader::default()
                .with(&first, dated("2024:01:02 10:00:00"))
                .with(&second, dated("2024:01:01 10:00:00"));
            let opts = RenameOptions {
                dry_run,
                template: Some("{date}".parse().unwrap()),
                ..Default::default()
            };
            let (tx, rx) = mpsc::channel();
            rename_files(&reader, &[first, second], tmp.path(), &opts, Some(tx)).unwrap();
            rx.iter()
                .filter_map(|e| match e {
                    RenameEvent::File(r) => Some(file_name_of(&r.destination)),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };
        let planned = run(true);
        assert_eq!(planned, vec!["20240102.jpg", "20240101.jpg"]);
        assert_eq!(planned, run(false));
    }

    fn file_name_of(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn identical_timestamps_get_suffixes() {
        let tmp = TempDir::new().unwrap();
        let mut reader = MockReader::default();
        let files: Vec<PathBuf> = (1..=3)
            .map(|i| {
                let p = write_file(tmp.path(), &format!("burst{i}.jpg"), b"x");
                reader = std::mem::take(&mut reader).with(&p, dated("2024:03:01 10:00:00"));
                p
            })
            .collect();
        let opts = RenameOptions {
            dry_run: false,
            keep_original: false,
            ..Default::default()
        };
        rename_files(&reader, &files, tmp.path(), &opts, None).unwrap();
        assert_eq!(
            listing(tmp.path()),
            vec![
                "20240301_100000_000-1.jpg",
                "20240301_100000_000-2.jpg",
                "20240301_100000_000.jpg",
            ]
        );
    }

    #[test]
    fn copy_with_preserved_structure() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let a = write_file(src.path(), "2023/trip/a.jpg", b"a");
        let reader = MockReader::default().with(&a, dated("2023:07:04 12:00:00"));
        let opts = RenameOptions {
            destination: Some(dest.path().to_path_buf()),
            operation: Operation::Copy,
            preserve_structure: true,
            dry_run: false,
            keep_original: false,
            ..Default::default()
        };
        rename_files(&reader, &[a.clone()], src.path(), &opts, None).unwrap();
        assert!(a.exists());
        assert!(dest.path().join("2023/trip/20230704_120000_000.jpg").exists());
    }

    #[test]
    fn batches_are_sized() {
        let tmp = TempDir::new().unwrap();
        let files: Vec<PathBuf> = (0..5)
            .map(|i| write_file(tmp.path(), &format!("{i}.jpg"), b"x"))
            .collect();
        let reader = MockReader::default();
        let opts = RenameOptions {
            batch_size: 2,
            ..Default::default()
        };
        rename_files(&reader, &files, tmp.path(), &opts, None).unwrap();
        assert_eq!(reader.batch_sizes(), vec![2, 2, 1]);
    }

    #[test]
    fn events_bracket_the_run() {
        let tmp = TempDir::new().unwrap();
        let a = write_file(tmp.path(), "a.jpg", b"x");
        let (tx, rx) = mpsc::channel();
        rename_files(&MockReader::default(), &[a], tmp.path(), &RenameOptions::default(), Some(tx)).unwrap();
        let events: Vec<RenameEvent> = rx.iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], RenameEvent::Started { total: 1, dry_run: true }));
        assert!(matches!(&events[1], RenameEvent::File(r) if r.outcome == Outcome::Planned));
        assert!(matches!(&events[2], RenameEvent::Finished(s) if s.processed == 1));
    }

    #[test]
    fn failures_are_counted_and_run_continues() {
        let tmp = TempDir::new().unwrap();
        let a = write_file(tmp.path(), "a.jpg", b"x");
        let b = write_file(tmp.path(), "b.jpg", b"y");
        let reader = MockReader::default()
            .with(&a, dated("2024:01:01 00:00:00"))
            .with(&b, dated("2024:01:02 00:00:00"));
        // a is deleted between scan and action.
        fs::remove_file(&a).unwrap();
        let opts = RenameOptions {
            dry_run: false,
            keep_original: false,
            ..Default::default()
        };
        let stats = rename_files(&reader, &[a, b], tmp.path(), &opts, None).unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.error_details.len(), 1);
        assert!(tmp.path().join("20240102_000000_000.jpg").exists());
    }

    #[test]
    fn rename_source_scans_first() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a.jpg", b"x");
        write_file(tmp.path(), "notes.txt", b"x");
        let stats =
            rename_source(&MockReader::default(), tmp.path(), false, &RenameOptions::default(), None).unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.filesystem_dated, 1);
    }
}
