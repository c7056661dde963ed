//! CLI output formatting for every command.
//!
//! # Output Format
//!
//! ## rename
//!
//! ```text
//! Renaming 3 files (dry run)
//! [DRY RUN] renamed: IMG_001.JPG → 20240301_100000_000_IMG_001.jpg
//! [DRY RUN] renamed: IMG_002.JPG → 20240301_100000_000_IMG_002.jpg
//! unchanged: 20240301_100000_000_IMG_003.jpg
//!
//! Summary (dry run)
//!     Files: 3
//!     Would process: 2
//!     Unchanged: 1
//!     Errors: 0
//!     Dated from EXIF: 3, filesystem: 0
//!     With GPS: 1
//! ```
//!
//! ## orient
//!
//! ```text
//! [DRY RUN] rotate 90°: IMG_0001.jpg (L 4032x3024 → P 3024x4032)
//! skipped: IMG_0002.HEIC (no pure-Rust decoder for this format)
//! ```
//!
//! ## dedupe
//!
//! ```text
//! Found 2 duplicate files (4.10 MB) in 1 group
//! [DRY RUN] remove: IMG_1234 2.JPG (2.05 MB), keeping IMG_1234.JPG
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function returning `Vec<String>` so the
//! layout is unit tested. Format functions are pure. The binary prints the
//! lines through a [`Reporter`], which also copies them to the log file.

use crate::actions::Outcome;
use crate::dedupe::{DedupeEvent, DedupeStats};
use crate::imaging::{Shape, describe_orientation};
use crate::orient::{
    CHECK_ERROR_LIMIT, CHECK_ROTATION_LIMIT, CheckReport, OrientEvent, OrientOutcome, OrientStats,
};
use crate::rename::{FileReport, RenameEvent, RenameStats};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

const DRY_RUN_TAG: &str = "[DRY RUN]";

// ============================================================================
// Shared helpers
// ============================================================================

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Destination as shown next to a source: just the name when it stays in
/// the same directory, the full path otherwise.
fn destination_label(source: &Path, destination: &Path) -> String {
    if source.parent() == destination.parent() {
        file_name(destination)
    } else {
        destination.display().to_string()
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

/// Bytes as megabytes with two decimals.
pub fn format_bytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

fn summary_header(dry_run: bool) -> String {
    if dry_run {
        "Summary (dry run)".to_string()
    } else {
        "Summary".to_string()
    }
}

fn error_details(details: &[String], limit: usize) -> Vec<String> {
    let mut lines: Vec<String> = details
        .iter()
        .take(limit)
        .map(|d| format!("{}{d}", indent(2)))
        .collect();
    if details.len() > limit {
        lines.push(format!("{}... and {} more", indent(2), details.len() - limit));
    }
    lines
}

// ============================================================================
// rename
// ============================================================================

pub fn format_rename_event(event: &RenameEvent) -> Vec<String> {
    match event {
        RenameEvent::Started { total, dry_run } => {
            let mut line = format!("Renaming {}", plural(*total, "file", "files"));
            if *dry_run {
                line.push_str(" (dry run)");
            }
            vec![line]
        }
        RenameEvent::File(report) => vec![format_file_report(report)],
        RenameEvent::Finished(stats) => format_rename_stats(stats),
    }
}

fn format_file_report(report: &FileReport) -> String {
    let source = file_name(&report.source);
    let destination = destination_label(&report.source, &report.destination);
    let verb = report.operation.verb();
    match &report.outcome {
        Outcome::Planned => format!("{DRY_RUN_TAG} {verb}: {source} \u{2192} {destination}"),
        Outcome::Applied => format!("{verb}: {source} \u{2192} {destination}"),
        Outcome::Unchanged => format!("unchanged: {source}"),
        Outcome::Failed(reason) => format!("FAILED: {}: {reason}", report.source.display()),
    }
}

pub fn format_rename_stats(stats: &RenameStats) -> Vec<String> {
    let done = if stats.dry_run { "Would process" } else { "Processed" };
    let mut lines = vec![
        String::new(),
        summary_header(stats.dry_run),
        format!("{}Files: {}", indent(1), stats.total),
        format!("{}{done}: {}", indent(1), stats.processed),
        format!("{}Unchanged: {}", indent(1), stats.unchanged),
        format!("{}Errors: {}", indent(1), stats.errors),
        format!(
            "{}Dated from EXIF: {}, filesystem: {}",
            indent(1),
            stats.exif_dated,
            stats.filesystem_dated
        ),
        format!("{}With GPS: {}", indent(1), stats.with_gps),
    ];
    lines.extend(error_details(&stats.error_details, CHECK_ERROR_LIMIT));
    lines
}

// ============================================================================
// orient
// ============================================================================

pub fn format_orient_event(event: &OrientEvent) -> Vec<String> {
    match event {
        OrientEvent::Started {
            total,
            dry_run,
            mode,
        } => {
            let mut line = format!("Orienting {}, {mode}", plural(*total, "file", "files"));
            if *dry_run {
                line.push_str(" (dry run)");
            }
            vec![line]
        }
        OrientEvent::File(report) => {
            let name = file_name(&report.source);
            let change = match (report.transform, report.before, report.after) {
                (Some(t), Some(before), Some(after)) => format!(
                    "{}: {name} ({} {before} \u{2192} {} {after})",
                    t.describe(),
                    Shape::of(before).letter(),
                    Shape::of(after).letter()
                ),
                _ => name.clone(),
            };
            match &report.outcome {
                OrientOutcome::Planned => vec![format!("{DRY_RUN_TAG} {change}")],
                OrientOutcome::Applied => vec![change],
                OrientOutcome::Unchanged => Vec::new(),
                OrientOutcome::Skipped(reason) => vec![format!("skipped: {name} ({reason})")],
                OrientOutcome::Failed(reason) => {
                    vec![format!("FAILED: {}: {reason}", report.source.display())]
                }
            }
        }
        OrientEvent::Finished(stats) => format_orient_stats(stats),
    }
}

pub fn format_orient_stats(stats: &OrientStats) -> Vec<String> {
    let done = if stats.dry_run { "Would rotate" } else { "Rotated" };
    let mut lines = vec![
        String::new(),
        summary_header(stats.dry_run),
        format!("{}Files: {}", indent(1), stats.total),
        format!("{}{done}: {}", indent(1), stats.processed),
        format!("{}Already upright: {}", indent(1), stats.unchanged),
        format!("{}Skipped: {}", indent(1), stats.skipped),
        format!("{}Errors: {}", indent(1), stats.errors),
    ];
    lines.extend(error_details(&stats.error_details, CHECK_ERROR_LIMIT));
    lines
}

// ============================================================================
// check
// ============================================================================

pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines = vec![format!("Scanned {}", plural(report.total, "image", "images"))];

    lines.push(String::new());
    lines.push("Formats".to_string());
    for (ext, count) in &report.by_extension {
        let ext = if ext.is_empty() { "(none)" } else { ext.as_str() };
        lines.push(format!("{}.{ext}: {count}", indent(1)));
    }

    lines.push(String::new());
    lines.push("Orientation tags".to_string());
    for (tag, count) in &report.by_orientation {
        lines.push(format!(
            "{}{tag} ({}): {count}",
            indent(1),
            describe_orientation(*tag)
        ));
    }

    if !report.needs_rotation.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "Needs rotation ({})",
            report.needs_rotation.len()
        ));
        for entry in report.needs_rotation.iter().take(CHECK_ROTATION_LIMIT) {
            let geometry = match (entry.shape(), entry.dimensions) {
                (Some(shape), Some(dims)) => format!("{} {dims}", shape.letter()),
                _ => "size unknown".to_string(),
            };
            lines.push(format!(
                "{}{}: tag {} ({geometry})",
                indent(1),
                entry.path.display(),
                entry.orientation
            ));
        }
        if report.needs_rotation.len() > CHECK_ROTATION_LIMIT {
            lines.push(format!(
                "{}... and {} more",
                indent(1),
                report.needs_rotation.len() - CHECK_ROTATION_LIMIT
            ));
        }
    }

    if !report.errors.is_empty() {
        lines.push(String::new());
        lines.push(format!("Errors ({})", report.errors.len()));
        for (path, reason) in report.errors.iter().take(CHECK_ERROR_LIMIT) {
            lines.push(format!("{}{}: {reason}", indent(1), path.display()));
        }
        if report.errors.len() > CHECK_ERROR_LIMIT {
            lines.push(format!(
                "{}... and {} more",
                indent(1),
                report.errors.len() - CHECK_ERROR_LIMIT
            ));
        }
    }

    lines.push(String::new());
    lines.push("Summary".to_string());
    lines.push(format!("{}Total: {}", indent(1), report.total));
    lines.push(format!(
        "{}Needing rotation: {}",
        indent(1),
        report.needs_rotation.len()
    ));
    lines.push(format!(
        "{}Already correct: {}",
        indent(1),
        report.already_correct()
    ));
    lines.push(format!("{}Errors: {}", indent(1), report.errors.len()));
    lines
}

// ============================================================================
// dedupe
// ============================================================================

pub fn format_dedupe_event(event: &DedupeEvent) -> Vec<String> {
    match event {
        DedupeEvent::Found {
            groups,
            copies,
            bytes,
        } => {
            if *copies == 0 {
                return vec!["No duplicates found".to_string()];
            }
            vec![format!(
                "Found {} ({}) in {}",
                plural(*copies, "duplicate file", "duplicate files"),
                format_bytes(*bytes),
                plural(*groups, "group", "groups")
            )]
        }
        DedupeEvent::Mismatch {
            copy,
            keeper,
            reason,
        } => vec![format!(
            "kept: {} ({reason} vs {})",
            file_name(copy),
            file_name(keeper)
        )],
        DedupeEvent::File(report) => {
            let name = file_name(&report.path);
            let size = format_bytes(report.bytes);
            let keeper = file_name(&report.keeper);
            let verb = if report.trashed_to.is_some() {
                "move to trash"
            } else {
                "remove"
            };
            let line = match &report.outcome {
                Outcome::Planned => {
                    format!("{DRY_RUN_TAG} {verb}: {name} ({size}), keeping {keeper}")
                }
                Outcome::Applied => format!("{verb}: {name} ({size}), keeping {keeper}"),
                Outcome::Unchanged => format!("unchanged: {name}"),
                Outcome::Failed(reason) => {
                    format!("FAILED: {}: {reason}", report.path.display())
                }
            };
            vec![line]
        }
        DedupeEvent::Finished(stats) => format_dedupe_stats(stats),
    }
}

pub fn format_dedupe_stats(stats: &DedupeStats) -> Vec<String> {
    let mut lines = vec![String::new(), summary_header(stats.dry_run)];
    if let Some(verified) = stats.verified {
        lines.push(format!(
            "{}Verified: {verified} of {}",
            indent(1),
            stats.candidates
        ));
    }
    let done = if stats.dry_run { "Would remove" } else { "Removed" };
    lines.push(format!(
        "{}{done}: {} ({})",
        indent(1),
        plural(stats.removed, "file", "files"),
        format_bytes(stats.bytes)
    ));
    lines.push(format!("{}Errors: {}", indent(1), stats.errors));
    lines.extend(error_details(&stats.error_details, CHECK_ERROR_LIMIT));
    lines
}

// ============================================================================
// Reporter
// ============================================================================

/// Prints result lines to stdout and, when a log file is open, appends
/// them there too.
#[derive(Clone, Default)]
pub struct Reporter {
    log: Option<Arc<File>>,
    log_failed: Arc<AtomicBool>,
}

impl Reporter {
    pub fn new(log: Option<Arc<File>>) -> Self {
        Self {
            log,
            log_failed: Arc::default(),
        }
    }

    /// Print `line`. Log write failures are warned about once; the run
    /// carries on.
    pub fn line(&self, line: &str) {
        println!("{line}");
        if let Some(file) = &self.log
            && let Err(e) = writeln!(file.as_ref(), "{line}")
            && !self.log_failed.swap(true, Ordering::Relaxed)
        {
            warn!(error = %e, "log file write failed");
        }
    }

    #[cfg(test)]
    fn log_failed(&self) -> bool {
        self.log_failed.load(Ordering::Relaxed)
    }

    pub fn lines(&self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            self.line(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Operation;
    use crate::dedupe::RemovalReport;
    use crate::imaging::{Dimensions, Rotation, Transform};
    use crate::orient::{OrientMode, OrientReport, RotationEntry};
    use crate::record::CaptureTime;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn report(outcome: Outcome, destination: &str) -> FileReport {
        FileReport {
            source: PathBuf::from("/photos/IMG_001.JPG"),
            destination: PathBuf::from(destination),
            operation: Operation::Rename,
            outcome,
            capture: CaptureTime::filesystem(
                NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap(),
            ),
            gps: None,
        }
    }

    #[test]
    fn format_bytes_megabytes() {
        assert_eq!(format_bytes(0), "0.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 3 / 2), "1.50 MB");
    }

    #[test]
    fn rename_started_line() {
        let lines = format_rename_event(&RenameEvent::Started {
            total: 1,
            dry_run: true,
        });
        assert_eq!(lines, vec!["Renaming 1 file (dry run)"]);
    }

    #[test]
    fn rename_planned_shows_name_only_in_same_dir() {
        let lines = format_rename_event(&RenameEvent::File(report(
            Outcome::Planned,
            "/photos/20240301_100000_000_IMG_001.jpg",
        )));
        assert_eq!(
            lines,
            vec!["[DRY RUN] renamed: IMG_001.JPG \u{2192} 20240301_100000_000_IMG_001.jpg"]
        );
    }

    #[test]
    fn rename_applied_to_other_dir_shows_full_path() {
        let lines = format_rename_event(&RenameEvent::File(report(
            Outcome::Applied,
            "/sorted/20240301_100000_000_IMG_001.jpg",
        )));
        assert_eq!(
            lines,
            vec!["renamed: IMG_001.JPG \u{2192} /sorted/20240301_100000_000_IMG_001.jpg"]
        );
    }

    #[test]
    fn rename_failure_includes_reason() {
        let lines = format_rename_event(&RenameEvent::File(report(
            Outcome::Failed("permission denied".into()),
            "/photos/x.jpg",
        )));
        assert_eq!(lines, vec!["FAILED: /photos/IMG_001.JPG: permission denied"]);
    }

    #[test]
    fn rename_stats_lists_errors() {
        let stats = RenameStats {
            total: 2,
            processed: 1,
            errors: 1,
            error_details: vec!["a.jpg: boom".into()],
            ..Default::default()
        };
        let lines = format_rename_stats(&stats);
        assert!(lines.contains(&"Summary".to_string()));
        assert!(lines.contains(&"    Processed: 1".to_string()));
        assert_eq!(lines.last().unwrap(), "        a.jpg: boom");
    }

    #[test]
    fn orient_planned_line_shows_geometry() {
        let event = OrientEvent::File(OrientReport {
            source: PathBuf::from("/p/a.jpg"),
            destination: Some(PathBuf::from("/p/a.jpg")),
            outcome: OrientOutcome::Planned,
            transform: Some(Transform::rotate(Rotation::Cw90)),
            before: Some(Dimensions { width: 400, height: 300 }),
            after: Some(Dimensions { width: 300, height: 400 }),
        });
        let lines = format_orient_event(&event);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[DRY RUN] "));
        assert!(lines[0].ends_with("a.jpg (L 400x300 \u{2192} P 300x400)"));
    }

    #[test]
    fn orient_unchanged_is_silent() {
        let event = OrientEvent::File(OrientReport {
            source: PathBuf::from("/p/a.jpg"),
            destination: None,
            outcome: OrientOutcome::Unchanged,
            transform: None,
            before: None,
            after: None,
        });
        assert!(format_orient_event(&event).is_empty());
    }

    #[test]
    fn orient_started_names_mode() {
        let lines = format_orient_event(&OrientEvent::Started {
            total: 2,
            dry_run: false,
            mode: OrientMode::Target(Shape::Portrait),
        });
        assert_eq!(lines, vec!["Orienting 2 files, forcing portrait"]);
    }

    #[test]
    fn check_report_truncates_lists() {
        let mut report = CheckReport {
            total: 25,
            ..Default::default()
        };
        report.by_orientation.insert(6, 25);
        report.by_extension.insert("jpg".into(), 25);
        for i in 0..25 {
            report.needs_rotation.push(RotationEntry {
                path: PathBuf::from(format!("{i}.jpg")),
                orientation: 6,
                dimensions: Some(Dimensions { width: 4, height: 3 }),
            });
        }
        let lines = format_check_report(&report);
        assert!(lines.contains(&"Needs rotation (25)".to_string()));
        assert!(lines.contains(&"    0.jpg: tag 6 (L 4x3)".to_string()));
        assert!(!lines.contains(&"    20.jpg: tag 6 (L 4x3)".to_string()));
        assert!(lines.contains(&"    ... and 5 more".to_string()));
        assert!(lines.contains(&"    Already correct: 0".to_string()));
    }

    #[test]
    fn dedupe_found_and_file_lines() {
        let found = format_dedupe_event(&DedupeEvent::Found {
            groups: 1,
            copies: 2,
            bytes: 2 * 1024 * 1024,
        });
        assert_eq!(found, vec!["Found 2 duplicate files (2.00 MB) in 1 group"]);

        let file = format_dedupe_event(&DedupeEvent::File(RemovalReport {
            path: PathBuf::from("/p/IMG 2.JPG"),
            keeper: PathBuf::from("/p/IMG.JPG"),
            bytes: 1024 * 1024,
            trashed_to: None,
            outcome: Outcome::Planned,
        }));
        assert_eq!(
            file,
            vec!["[DRY RUN] remove: IMG 2.JPG (1.00 MB), keeping IMG.JPG"]
        );
    }

    #[test]
    fn dedupe_nothing_found() {
        let lines = format_dedupe_event(&DedupeEvent::Found {
            groups: 0,
            copies: 0,
            bytes: 0,
        });
        assert_eq!(lines, vec!["No duplicates found"]);
    }

    #[test]
    fn reporter_copies_lines_to_log() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("run.log");
        let file = Arc::new(File::create(&path).unwrap());
        let reporter = Reporter::new(Some(file));
        reporter.lines(vec!["one".to_string(), "two".to_string()]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn reporter_flags_failed_log_writes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("run.log");
        File::create(&path).unwrap();
        let read_only = Arc::new(File::open(&path).unwrap());
        let reporter = Reporter::new(Some(read_only));
        assert!(!reporter.log_failed());
        reporter.line("one");
        reporter.clone().line("two");
        assert!(reporter.log_failed());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
