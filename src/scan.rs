//! Source discovery.
//!
//! Every subcommand starts here: turn the user's `SOURCE` argument into a
//! sorted, de-duplicated list of files.
//!
//! - A directory is walked with `walkdir`, either just its top level or the
//!   whole tree.
//! - A single file is accepted as-is if it passes the filter.
//! - Hidden entries (`.`-prefixed files and directories) are skipped, which
//!   also keeps `.DS_Store`, AppleDouble `._*` files and `.git` out.
//! - Symlinks are not followed.
//!
//! The sorted order is significant: it is the tie-break order when several
//! files resolve to the same target name.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("source not found: {0}")]
    NotFound(PathBuf),
    #[error("source is neither a directory nor a regular file: {0}")]
    NotADirectory(PathBuf),
    #[error("not a supported image file: {0}")]
    Unsupported(PathBuf),
}

/// Extensions handled by `rename`, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif", "heic", "heif", // common
    "dng", "cr2", "cr3", "nef", "nrw", "arw", "srf", "sr2", "orf", "rw2", "pef", "raf", "raw", // RAW
];

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Whether `path` has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported_image(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// All supported images under `source`.
pub fn collect_images(source: &Path, recursive: bool) -> Result<Vec<PathBuf>, ScanError> {
    collect_files(source, recursive, is_supported_image)
}

/// All visible regular files under `source` accepted by `filter`.
pub fn collect_files(
    source: &Path,
    recursive: bool,
    filter: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, ScanError> {
    let meta = source
        .metadata()
        .map_err(|_| ScanError::NotFound(source.to_path_buf()))?;

    if meta.is_file() {
        return if filter(source) {
            Ok(vec![source.to_path_buf()])
        } else {
            Err(ScanError::Unsupported(source.to_path_buf()))
        };
    }
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory(source.to_path_buf()));
    }

    let mut walker = WalkDir::new(source).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && filter(e.path()))
        .map(DirEntry::into_path)
        .collect();

    files.sort();
    files.dedup();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) -> PathBuf {
        let p = dir.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, b"x").unwrap();
        p
    }

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn top_level_only_by_default() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b.jpg");
        touch(tmp.path(), "a.PNG");
        touch(tmp.path(), "sub/c.jpg");
        let got = collect_images(tmp.path(), false).unwrap();
        assert_eq!(names(&got, tmp.path()), vec!["a.PNG", "b.jpg"]);
    }

    #[test]
    fn recursive_walk_is_sorted() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "z.cr3");
        touch(tmp.path(), "sub/deeper/c.heic");
        touch(tmp.path(), "sub/b.jpeg");
        let got = collect_images(tmp.path(), true).unwrap();
        assert_eq!(names(&got, tmp.path()), vec!["sub/b.jpeg", "sub/deeper/c.heic", "z.cr3"]);
    }

    #[test]
    fn skips_hidden_and_unsupported() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), ".hidden.jpg");
        touch(tmp.path(), "._IMG_1.jpg");
        touch(tmp.path(), ".git/x.jpg");
        touch(tmp.path(), "notes.txt");
        touch(tmp.path(), "noext");
        touch(tmp.path(), "ok.tif");
        let got = collect_images(tmp.path(), true).unwrap();
        assert_eq!(names(&got, tmp.path()), vec!["ok.tif"]);
    }

    #[test]
    fn single_file_source() {
        let tmp = TempDir::new().unwrap();
        let f = touch(tmp.path(), "IMG_001.JPG");
        assert_eq!(collect_images(&f, false).unwrap(), vec![f]);

        let txt = touch(tmp.path(), "notes.txt");
        assert!(matches!(collect_images(&txt, false), Err(ScanError::Unsupported(_))));
    }

    #[test]
    fn missing_source_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = collect_images(&tmp.path().join("nope"), true).unwrap_err();
        assert!(matches!(err, ScanError::NotFound(_)));
    }

    #[test]
    fn custom_filter() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.txt");
        touch(tmp.path(), "b.jpg");
        let all = collect_files(tmp.path(), false, |_| true).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported_image(Path::new("x.JPG")));
        assert!(is_supported_image(Path::new("x.Rw2")));
        assert!(!is_supported_image(Path::new("x.mov")));
        assert!(!is_supported_image(Path::new("jpg")));
    }
}
