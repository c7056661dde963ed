//! Removal of macOS-style duplicate copies (`IMG_1234 2.JPG`).
//!
//! Finder and Photos exports name copies `<name> <N>.<ext>`. Copies are
//! grouped with their original `<name>.<ext>` in the same directory; when the
//! original is gone, the lowest-numbered copy is kept instead.
//!
//! Name matching alone is fast but trusts the naming. With verification on,
//! each copy must match its keeper by size and then by SHA-256:
//!
//! | Mode | Bytes hashed |
//! |---|---|
//! | quick | first 64 KiB, the file size, last 64 KiB |
//! | full | the whole file |
//!
//! Copies are deleted, or moved into a trash directory with `-N` suffixes
//! on name clashes. Like every other command, nothing is touched in dry-run.

use crate::actions::{self, Operation, Outcome};
use crate::collision::NameRegistry;
use crate::scan::{self, ScanError};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

/// `<name><whitespace><N>.<ext>`
static COPY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\s+(\d+)(\.[^.]+)$").expect("copy pattern compiles"));

const QUICK_HASH_WINDOW: u64 = 64 * 1024;

pub const DEFAULT_TRASH_DIR_NAME: &str = "_duplicates_trash";

#[derive(Error, Debug)]
pub enum DedupeError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    Quick,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposal {
    Delete,
    Trash(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DedupeOptions {
    pub recursive: bool,
    pub dry_run: bool,
    /// Compare size and content hash before removing anything.
    pub verify: Option<HashMode>,
    pub disposal: Disposal,
}

/// A kept file and the copies slated for removal, in copy-number order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub keeper: PathBuf,
    pub copies: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemovalReport {
    pub path: PathBuf,
    pub keeper: PathBuf,
    pub bytes: u64,
    /// Where the copy went (or would go) when trashing.
    pub trashed_to: Option<PathBuf>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupeStats {
    pub groups: usize,
    pub candidates: usize,
    pub candidate_bytes: u64,
    /// Copies that survived verification, when verification ran.
    pub verified: Option<usize>,
    pub removed: usize,
    pub bytes: u64,
    pub errors: usize,
    pub error_details: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DedupeEvent {
    Found {
        groups: usize,
        copies: usize,
        bytes: u64,
    },
    Mismatch {
        copy: PathBuf,
        keeper: PathBuf,
        reason: String,
    },
    File(RemovalReport),
    Finished(DedupeStats),
}

fn emit(events: Option<&Sender<DedupeEvent>>, event: DedupeEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// `(original name, copy number)` when `file_name` looks like a copy.
pub fn parse_copy_name(file_name: &str) -> Option<(String, u64)> {
    let caps = COPY_PATTERN.captures(file_name)?;
    let number = caps[2].parse().ok()?;
    Some((format!("{}{}", caps[1].trim_end(), &caps[3]), number))
}

/// Group copies with their originals. Only directories with at least one
/// removable copy produce a group.
pub fn find_duplicates(files: &[PathBuf]) -> Vec<DuplicateGroup> {
    let mut originals: BTreeMap<(PathBuf, String), PathBuf> = BTreeMap::new();
    let mut copies: BTreeMap<(PathBuf, String), Vec<(u64, PathBuf)>> = BTreeMap::new();

    for file in files {
        let Some(name) = file.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let dir = file.parent().unwrap_or(Path::new("")).to_path_buf();
        match parse_copy_name(&name) {
            Some((original, number)) => copies
                .entry((dir, original))
                .or_default()
                .push((number, file.clone())),
            None => {
                originals.insert((dir, name), file.clone());
            }
        }
    }

    let mut groups = Vec::new();
    for (key, mut numbered) in copies {
        numbered.sort();
        let mut numbered = numbered.into_iter().map(|(_, path)| path);
        let keeper = match originals.get(&key) {
            Some(original) => original.clone(),
            None => match numbered.next() {
                Some(first) => first,
                None => continue,
            },
        };
        let copies: Vec<PathBuf> = numbered.collect();
        if !copies.is_empty() {
            groups.push(DuplicateGroup { keeper, copies });
        }
    }
    groups
}

/// SHA-256 over the file, hex encoded.
pub fn file_digest(path: &Path, mode: HashMode) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    match mode {
        HashMode::Full => {
            io::copy(&mut file, &mut hasher)?;
        }
        HashMode::Quick => {
            let size = file.metadata()?.len();
            let mut head = Vec::new();
            (&mut file).take(QUICK_HASH_WINDOW).read_to_end(&mut head)?;
            hasher.update(&head);
            hasher.update(size.to_le_bytes());
            if size > QUICK_HASH_WINDOW {
                file.seek(SeekFrom::End(-(QUICK_HASH_WINDOW as i64)))?;
                let mut tail = Vec::new();
                file.take(QUICK_HASH_WINDOW).read_to_end(&mut tail)?;
                hasher.update(&tail);
            }
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Why `copy` is not a byte-identical duplicate of `keeper`, if it isn't.
fn mismatch(keeper: &Path, copy: &Path, mode: HashMode) -> io::Result<Option<String>> {
    let keeper_size = fs::metadata(keeper)?.len();
    let copy_size = fs::metadata(copy)?.len();
    if keeper_size != copy_size {
        return Ok(Some(format!("size {copy_size} differs from {keeper_size}")));
    }
    if file_digest(keeper, mode)? != file_digest(copy, mode)? {
        return Ok(Some("content hash differs".to_string()));
    }
    Ok(None)
}

/// Drop copies that do not match their keeper. Groups left empty vanish.
fn verify_groups(
    groups: Vec<DuplicateGroup>,
    mode: HashMode,
    events: Option<&Sender<DedupeEvent>>,
) -> Vec<DuplicateGroup> {
    let mut verified = Vec::new();
    for group in groups {
        let mut kept = Vec::new();
        for copy in group.copies {
            let reason = match mismatch(&group.keeper, &copy, mode) {
                Ok(None) => {
                    kept.push(copy);
                    continue;
                }
                Ok(Some(reason)) => reason,
                Err(e) => format!("cannot compare: {e}"),
            };
            debug!(copy = %copy.display(), %reason, "not a duplicate");
            emit(
                events,
                DedupeEvent::Mismatch {
                    copy,
                    keeper: group.keeper.clone(),
                    reason,
                },
            );
        }
        if !kept.is_empty() {
            verified.push(DuplicateGroup {
                keeper: group.keeper,
                copies: kept,
            });
        }
    }
    verified
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Scan `folder`, find copies, optionally verify them, and remove them.
pub fn dedupe_folder(
    folder: &Path,
    opts: &DedupeOptions,
    events: Option<Sender<DedupeEvent>>,
) -> Result<DedupeStats, DedupeError> {
    if !folder.is_dir() {
        if !folder.exists() {
            return Err(ScanError::NotFound(folder.to_path_buf()).into());
        }
        return Err(DedupeError::NotADirectory(folder.to_path_buf()));
    }
    let mut files = scan::collect_images(folder, opts.recursive)?;
    if let Disposal::Trash(trash) = &opts.disposal {
        files.retain(|f| !f.starts_with(trash));
    }
    Ok(remove_duplicates(&files, opts, events))
}

pub fn remove_duplicates(
    files: &[PathBuf],
    opts: &DedupeOptions,
    events: Option<Sender<DedupeEvent>>,
) -> DedupeStats {
    let events = events.as_ref();
    let mut groups = find_duplicates(files);

    let mut stats = DedupeStats {
        dry_run: opts.dry_run,
        ..Default::default()
    };
    stats.groups = groups.len();
    stats.candidates = groups.iter().map(|g| g.copies.len()).sum();
    stats.candidate_bytes = groups.iter().flat_map(|g| &g.copies).map(|p| file_size(p)).sum();
    info!(groups = stats.groups, copies = stats.candidates, "duplicate copies found");
    emit(
        events,
        DedupeEvent::Found {
            groups: stats.groups,
            copies: stats.candidates,
            bytes: stats.candidate_bytes,
        },
    );

    if let Some(mode) = opts.verify {
        groups = verify_groups(groups, mode, events);
        let verified = groups.iter().map(|g| g.copies.len()).sum();
        info!(verified, "duplicates verified by hash");
        stats.verified = Some(verified);
    }

    let mut registry = NameRegistry::new();
    for group in &groups {
        for copy in &group.copies {
            let report = remove_one(copy, &group.keeper, opts, &mut registry);
            match &report.outcome {
                Outcome::Planned | Outcome::Applied => {
                    stats.removed += 1;
                    stats.bytes += report.bytes;
                }
                Outcome::Failed(reason) => {
                    stats.errors += 1;
                    stats.error_details.push(format!("{}: {reason}", copy.display()));
                }
                Outcome::Unchanged => {}
            }
            emit(events, DedupeEvent::File(report));
        }
    }

    emit(events, DedupeEvent::Finished(stats.clone()));
    stats
}

fn remove_one(
    copy: &Path,
    keeper: &Path,
    opts: &DedupeOptions,
    registry: &mut NameRegistry,
) -> RemovalReport {
    let mut report = RemovalReport {
        path: copy.to_path_buf(),
        keeper: keeper.to_path_buf(),
        bytes: file_size(copy),
        trashed_to: None,
        outcome: Outcome::Planned,
    };

    match &opts.disposal {
        Disposal::Trash(trash) => {
            let stem = copy
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let ext = copy
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            let destination = registry.claim(trash, &stem, &ext, copy);
            report.outcome = actions::execute(copy, &destination, Operation::Rename, opts.dry_run);
            report.trashed_to = Some(destination);
        }
        Disposal::Delete if opts.dry_run => {}
        Disposal::Delete => {
            report.outcome = match fs::remove_file(copy) {
                Ok(()) => {
                    debug!(path = %copy.display(), "deleted duplicate");
                    Outcome::Applied
                }
                Err(e) => {
                    warn!(path = %copy.display(), error = %e, "cannot delete duplicate");
                    Outcome::Failed(e.to_string())
                }
            };
        }
    }
    report
}
