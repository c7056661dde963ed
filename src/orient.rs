//! Orientation correction (`orient`) and diagnostics (`check`).
//!
//! ## Modes
//!
//! - **exif**: bake the EXIF `Orientation` tag into the pixels. After the
//!   rewrite the image is stored upright; when exiftool is available the
//!   original metadata is copied over with Orientation reset to 1.
//! - **target**: force every image to landscape or portrait by a quarter
//!   turn, regardless of EXIF. Squares count as landscape.
//!
//! ## Output
//!
//! In place, or mirrored into an output directory (default
//! `<input>_oriented` next to the input). Files that need no change are not
//! copied. Each result is written to a temporary file in the destination
//! directory and renamed over the target, so an interrupted run never leaves
//! a half-written image behind.
//!
//! ## Skips
//!
//! HEIC/HEIF and camera RAW files cannot be decoded by the pure-Rust
//! backend and are skipped with a reason, as are files small enough to be
//! iCloud placeholders (HEIC under 50 KB, anything else under 10 KB).

use crate::exiftool::ExifTool;
use crate::imaging::{
    BackendError, Dimensions, ImageBackend, Quality, Shape, Transform, TransformParams,
    can_decode, transform_for_exif, transform_for_target, transformed_dimensions,
};
use crate::scan::{self, ScanError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

const HEIC_PLACEHOLDER_BYTES: u64 = 50_000;
const PLACEHOLDER_BYTES: u64 = 10_000;

/// Files listed individually in the check report.
pub const CHECK_ROTATION_LIMIT: usize = 20;
pub const CHECK_ERROR_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum OrientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("output directory {0} is inside the source tree")]
    OutputInsideSource(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientMode {
    Exif,
    Target(Shape),
}

impl std::fmt::Display for OrientMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrientMode::Exif => f.write_str("applying EXIF orientation"),
            OrientMode::Target(Shape::Landscape) => f.write_str("forcing landscape"),
            OrientMode::Target(Shape::Portrait) => f.write_str("forcing portrait"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    InPlace,
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct OrientOptions {
    pub mode: OrientMode,
    pub output: OutputMode,
    pub dry_run: bool,
    pub quality: Quality,
    /// Skip files small enough to be cloud placeholders.
    pub skip_placeholders: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrientOutcome {
    Planned,
    Applied,
    Unchanged,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrientReport {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub outcome: OrientOutcome,
    pub transform: Option<Transform>,
    pub before: Option<Dimensions>,
    pub after: Option<Dimensions>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrientStats {
    pub total: usize,
    pub processed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
    pub error_details: Vec<String>,
    pub dry_run: bool,
}

impl OrientStats {
    fn record(&mut self, report: &OrientReport) {
        match &report.outcome {
            OrientOutcome::Planned | OrientOutcome::Applied => self.processed += 1,
            OrientOutcome::Unchanged => self.unchanged += 1,
            OrientOutcome::Skipped(_) => self.skipped += 1,
            OrientOutcome::Failed(reason) => {
                self.errors += 1;
                self.error_details
                    .push(format!("{}: {reason}", report.source.display()));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrientEvent {
    Started {
        total: usize,
        dry_run: bool,
        mode: OrientMode,
    },
    File(OrientReport),
    Finished(OrientStats),
}

/// `<parent>/<name>_oriented` for a source directory or file. Relative
/// sources such as `.` are resolved first so the result is a true sibling.
pub fn default_output_dir(source: &Path) -> PathBuf {
    let source = resolve_path(source);
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "images".to_string());
    source
        .parent()
        .unwrap_or(Path::new(""))
        .join(format!("{name}_oriented"))
}

/// Absolute form of `path` with symlinks resolved as far as the path exists.
/// The missing tail, if any, is appended unchanged.
fn resolve_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    for ancestor in absolute.ancestors() {
        if let Ok(real) = fs::canonicalize(ancestor) {
            return match absolute.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => real.join(rest),
                _ => real,
            };
        }
    }
    absolute
}

/// Size heuristic for iCloud "optimize storage" stubs.
pub fn is_icloud_placeholder(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    let ext = crate::record::normalized_extension(path);
    let limit = if ext == "heic" || ext == "heif" {
        HEIC_PLACEHOLDER_BYTES
    } else {
        PLACEHOLDER_BYTES
    };
    meta.len() < limit
}

fn emit(events: Option<&Sender<OrientEvent>>, event: OrientEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

fn base_dir_of(source: &Path) -> PathBuf {
    if source.is_dir() {
        source.to_path_buf()
    } else {
        source.parent().unwrap_or(Path::new("")).to_path_buf()
    }
}

/// Scan `source` and orient everything found.
pub fn orient_source(
    backend: &dyn ImageBackend,
    exiftool: Option<&ExifTool>,
    source: &Path,
    recursive: bool,
    opts: &OrientOptions,
    events: Option<Sender<OrientEvent>>,
) -> Result<OrientStats, OrientError> {
    let base_dir = base_dir_of(source);
    if let OutputMode::Directory(out) = &opts.output
        && recursive
        && source.is_dir()
        && resolve_path(out).starts_with(resolve_path(&base_dir))
    {
        return Err(OrientError::OutputInsideSource(out.clone()));
    }
    let files = scan::collect_images(source, recursive)?;
    Ok(orient_files(backend, exiftool, &files, &base_dir, opts, events))
}

/// Orient `files` in order. Per-file problems are reported, never fatal.
pub fn orient_files(
    backend: &dyn ImageBackend,
    exiftool: Option<&ExifTool>,
    files: &[PathBuf],
    base_dir: &Path,
    opts: &OrientOptions,
    events: Option<Sender<OrientEvent>>,
) -> OrientStats {
    let events = events.as_ref();
    info!(files = files.len(), mode = %opts.mode, dry_run = opts.dry_run, "orienting");
    emit(
        events,
        OrientEvent::Started {
            total: files.len(),
            dry_run: opts.dry_run,
            mode: opts.mode,
        },
    );

    let mut stats = OrientStats {
        total: files.len(),
        dry_run: opts.dry_run,
        ..Default::default()
    };
    for file in files {
        let report = orient_one(backend, exiftool, file, base_dir, opts);
        stats.record(&report);
        emit(events, OrientEvent::File(report));
    }
    emit(events, OrientEvent::Finished(stats.clone()));
    stats
}

fn orient_one(
    backend: &dyn ImageBackend,
    exiftool: Option<&ExifTool>,
    file: &Path,
    base_dir: &Path,
    opts: &OrientOptions,
) -> OrientReport {
    let mut report = OrientReport {
        source: file.to_path_buf(),
        destination: None,
        outcome: OrientOutcome::Unchanged,
        transform: None,
        before: None,
        after: None,
    };

    if !can_decode(file) {
        report.outcome = OrientOutcome::Skipped("no pure-Rust decoder for this format".into());
        return report;
    }
    if opts.skip_placeholders && is_icloud_placeholder(file) {
        report.outcome = OrientOutcome::Skipped("likely an iCloud placeholder (not downloaded)".into());
        return report;
    }

    let plan = || -> Result<(Dimensions, Option<Transform>), BackendError> {
        let dims = backend.identify(file)?;
        let transform = match opts.mode {
            OrientMode::Exif => transform_for_exif(backend.read_orientation(file)?.unwrap_or(1)),
            OrientMode::Target(shape) => transform_for_target(dims, shape),
        };
        Ok((dims, transform))
    };
    let (dims, transform) = match plan() {
        Ok(p) => p,
        Err(e) => {
            warn!(path = %file.display(), error = %e, "cannot inspect image");
            report.outcome = OrientOutcome::Failed(e.to_string());
            return report;
        }
    };
    report.before = Some(dims);

    let Some(transform) = transform else {
        debug!(path = %file.display(), "already upright");
        return report;
    };
    report.transform = Some(transform);
    report.after = Some(transformed_dimensions(dims, &transform));

    let destination = match &opts.output {
        OutputMode::InPlace => file.to_path_buf(),
        OutputMode::Directory(dir) => match file.strip_prefix(base_dir) {
            Ok(rel) => dir.join(rel),
            Err(_) => dir.join(file.file_name().unwrap_or_default()),
        },
    };
    report.destination = Some(destination.clone());

    if opts.dry_run {
        report.outcome = OrientOutcome::Planned;
        return report;
    }

    report.outcome = match write_oriented(backend, exiftool, file, &destination, transform, opts.quality) {
        Ok(()) => {
            info!(from = %file.display(), to = %destination.display(), transform = %transform.describe(), "oriented");
            OrientOutcome::Applied
        }
        Err(e) => {
            warn!(path = %file.display(), error = %e, "orientation failed");
            OrientOutcome::Failed(e.to_string())
        }
    };
    report
}

/// Transform into a temp file next to `destination`, carry metadata over,
/// then rename into place.
fn write_oriented(
    backend: &dyn ImageBackend,
    exiftool: Option<&ExifTool>,
    source: &Path,
    destination: &Path,
    transform: Transform,
    quality: Quality,
) -> Result<(), OrientError> {
    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;

    let suffix = match destination.extension() {
        Some(ext) => format!(".{}", ext.to_string_lossy()),
        None => String::new(),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".photo-tidy-")
        .suffix(&suffix)
        .tempfile_in(dir)?
        .into_temp_path();

    backend.transform(&TransformParams {
        source: source.to_path_buf(),
        output: tmp.to_path_buf(),
        transform,
        quality,
    })?;

    if let Some(tool) = exiftool
        && let Err(e) = tool.copy_metadata(source, &tmp)
    {
        warn!(path = %source.display(), error = %e, "metadata not preserved");
    }

    fs::set_permissions(&tmp, fs::metadata(source)?.permissions())?;
    tmp.persist(destination).map_err(|e| OrientError::Io(e.error))?;
    Ok(())
}

// ============================================================================
// check
// ============================================================================

/// A file whose EXIF orientation is not 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationEntry {
    pub path: PathBuf,
    pub orientation: u16,
    /// Stored dimensions, when the format can be decoded.
    pub dimensions: Option<Dimensions>,
}

impl RotationEntry {
    pub fn shape(&self) -> Option<Shape> {
        self.dimensions.map(Shape::of)
    }
}

/// Orientation survey of a set of files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
    pub total: usize,
    /// Lowercased extension → count.
    pub by_extension: BTreeMap<String, usize>,
    /// Orientation tag → count. Files without a tag count as 1.
    pub by_orientation: BTreeMap<u16, usize>,
    pub needs_rotation: Vec<RotationEntry>,
    pub errors: Vec<(PathBuf, String)>,
}

impl CheckReport {
    pub fn already_correct(&self) -> usize {
        self.by_orientation.get(&1).copied().unwrap_or(0)
    }
}

/// Scan `source` recursively and survey orientation tags.
pub fn check_source(backend: &dyn ImageBackend, source: &Path) -> Result<CheckReport, OrientError> {
    let files = scan::collect_images(source, true)?;
    Ok(check_files(backend, &files))
}

pub fn check_files(backend: &dyn ImageBackend, files: &[PathBuf]) -> CheckReport {
    let mut report = CheckReport {
        total: files.len(),
        ..Default::default()
    };
    for file in files {
        let ext = crate::record::normalized_extension(file);
        *report.by_extension.entry(ext).or_default() += 1;

        let orientation = match backend.read_orientation(file) {
            Ok(o) => o.unwrap_or(1),
            Err(e) => {
                report.errors.push((file.clone(), e.to_string()));
                continue;
            }
        };
        *report.by_orientation.entry(orientation).or_default() += 1;

        if orientation != 1 {
            report.needs_rotation.push(RotationEntry {
                path: file.clone(),
                orientation,
                dimensions: backend.identify(file).ok(),
            });
        }
    }
    report
}
