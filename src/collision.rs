//! Collision resolution for generated filenames.
//!
//! Two sources of conflict are checked for every candidate:
//!
//! 1. a file already on disk in the destination directory, and
//! 2. a name handed out earlier in the same run (which matters in dry-run,
//!    where nothing reaches the disk, and for copies into a shared directory).
//!
//! A file renamed away from its old name frees that name for later files in
//! the run. The registry records such releases so a dry run frees the name
//! exactly as the real run does.
//!
//! Conflicts are resolved by appending `-1`, `-2`, … to the stem, taking the
//! smallest free suffix. Files are claimed in discovery order, so the first
//! file in sorted path order keeps the unsuffixed name.

use crate::naming::join_extension;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Names handed out during one run.
#[derive(Debug, Default)]
pub struct NameRegistry {
    claimed: HashSet<PathBuf>,
    released: HashSet<PathBuf>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a unique `dir/stem[-N].ext` for `source`.
    ///
    /// A candidate equal to `source` itself is never a conflict: the file is
    /// already correctly named and the returned path equals `source`.
    pub fn claim(&mut self, dir: &Path, stem: &str, extension: &str, source: &Path) -> PathBuf {
        let mut candidate = dir.join(join_extension(stem, extension));
        let mut suffix: u32 = 0;
        while self.is_taken(&candidate, source) {
            suffix += 1;
            candidate = dir.join(join_extension(&format!("{stem}-{suffix}"), extension));
        }
        if suffix > 0 {
            debug!(
                source = %source.display(),
                resolved = %candidate.display(),
                "name collision resolved with suffix"
            );
        }
        self.claimed.insert(candidate.clone());
        candidate
    }

    /// Mark `path` as vacated: a file that lived there has been (or, in a
    /// dry run, would be) moved elsewhere. A later claim may take it.
    pub fn release(&mut self, path: &Path) {
        self.released.insert(path.to_path_buf());
    }

    #[cfg(test)]
    fn is_claimed(&self, path: &Path) -> bool {
        self.claimed.contains(path)
    }

    fn is_taken(&self, candidate: &Path, source: &Path) -> bool {
        if self.claimed.contains(candidate) {
            return true;
        }
        if candidate == source || self.released.contains(candidate) {
            return false;
        }
        candidate.symlink_metadata().is_ok() && !same_file(candidate, source)
    }
}

/// Whether two paths name the same file on disk. Catches case-only
/// differences on case-insensitive filesystems.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
