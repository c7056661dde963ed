//! File actions: rename or copy one file to its resolved destination.
//!
//! Dry-run never touches the filesystem. A real run refuses to overwrite an
//! existing file, and a rename that cannot be done atomically (source and
//! destination on different filesystems) degrades to copy-then-delete where
//! the source is only removed after the copy completed.

use crate::collision::same_file;
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("copied to {to} but could not remove {from}: {source}")]
    RemoveSource {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    Rename,
    Copy,
}

impl Operation {
    /// Past-tense verb for reports.
    pub fn verb(self) -> &'static str {
        match self {
            Operation::Rename => "renamed",
            Operation::Copy => "copied",
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Dry-run: the action would have been performed.
    Planned,
    Applied,
    /// The file already has its target name.
    Unchanged,
    Failed(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Run (or plan) one action and classify the result. Errors are logged and
/// turned into [`Outcome::Failed`] so the caller can carry on.
pub fn execute(source: &Path, destination: &Path, operation: Operation, dry_run: bool) -> Outcome {
    if source == destination {
        return Outcome::Unchanged;
    }
    if dry_run {
        return Outcome::Planned;
    }
    match apply(source, destination, operation) {
        Ok(()) => Outcome::Applied,
        Err(e) => {
            warn!(source = %source.display(), error = %e, "action failed");
            Outcome::Failed(e.to_string())
        }
    }
}

/// Perform the action for real.
pub fn apply(source: &Path, destination: &Path, operation: Operation) -> Result<(), ActionError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ActionError::CreateDir {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    // A case-only rename on a case-insensitive filesystem "exists" already.
    let occupied = destination.symlink_metadata().is_ok();
    if occupied && (operation == Operation::Copy || !same_file(source, destination)) {
        return Err(ActionError::DestinationExists(destination.to_path_buf()));
    }

    match operation {
        Operation::Copy => copy_with_times(source, destination),
        Operation::Rename => rename_or_move(source, destination),
    }
}

fn rename_or_move(source: &Path, destination: &Path) -> Result<(), ActionError> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                source = %source.display(),
                destination = %destination.display(),
                "cross-device rename, falling back to copy and delete"
            );
            copy_with_times(source, destination)?;
            fs::remove_file(source).map_err(|e| ActionError::RemoveSource {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(ActionError::Rename {
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
            source: e,
        }),
    }
}

/// Copy contents and permissions, then carry over access and modification
/// times. A partial copy is removed on failure.
pub fn copy_with_times(source: &Path, destination: &Path) -> Result<(), ActionError> {
    let copy_err = |e| ActionError::Copy {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: e,
    };
    if let Err(e) = fs::copy(source, destination) {
        let _ = fs::remove_file(destination);
        return Err(copy_err(e));
    }
    if let Err(e) = preserve_times(source, destination) {
        warn!(path = %destination.display(), error = %e, "could not preserve timestamps");
    }
    Ok(())
}

fn preserve_times(source: &Path, destination: &Path) -> io::Result<()> {
    let meta = fs::metadata(source)?;
    let times = FileTimes::new()
        .set_accessed(meta.accessed()?)
        .set_modified(meta.modified()?);
    File::options().write(true).open(destination)?.set_times(times)
}
