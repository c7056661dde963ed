//! Batch wrapper around the external `exiftool` program.
//!
//! The rename pipeline only depends on the [`MetadataReader`] trait, so tests
//! can feed canned tag maps without exiftool installed. [`ExifTool`] is the
//! production implementation.
//!
//! ## Invocation
//!
//! ```text
//! exiftool -j -n -q -q <file>...
//! ```
//!
//! `-j` gives a JSON array with one object per readable file, `-n` keeps
//! numeric values (GPS in signed decimal degrees, Orientation as 1–8) and the
//! doubled `-q` silences warnings. Entries are matched back to the input paths
//! through their `SourceFile` key.
//!
//! ## Failure modes
//!
//! | Situation                                   | Result                         |
//! |---------------------------------------------|--------------------------------|
//! | exiftool missing or `-ver` fails            | `ExifToolError::NotFound`      |
//! | process cannot be spawned for a batch       | `ExifToolError::Spawn`         |
//! | non-zero exit, JSON still parses            | accepted                       |
//! | output is not a JSON array                  | warning, empty map             |
//! | a file is absent from the output            | absent from the map            |

use crate::metadata::Tags;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

const INSTALL_HINT: &str = "install it with `brew install exiftool` (macOS) or \
`sudo apt install libimage-exiftool-perl` (Debian/Ubuntu)";

#[derive(Error, Debug)]
pub enum ExifToolError {
    #[error("exiftool not found ({detail}); {INSTALL_HINT}")]
    NotFound { detail: String },
    #[error("failed to run exiftool at {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("exiftool failed on {file}: {stderr}")]
    CommandFailed { file: PathBuf, stderr: String },
}

/// Reads metadata tags for a batch of files.
pub trait MetadataReader {
    /// Tags per input path. Paths the tool could not read are simply absent.
    fn read_batch(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, Tags>, ExifToolError>;
}

/// A located, working exiftool executable.
#[derive(Debug, Clone)]
pub struct ExifTool {
    path: PathBuf,
    version: String,
}

impl ExifTool {
    /// Locate exiftool (an explicit path wins over `PATH`) and check it runs.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ExifToolError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => which::which("exiftool").map_err(|e| ExifToolError::NotFound {
                detail: e.to_string(),
            })?,
        };
        let version = probe_version(&path)?;
        info!(path = %path.display(), %version, "using exiftool");
        Ok(Self { path, version })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Copy every tag from `from` onto `to` in place, then reset Orientation
    /// to 1 since the pixels of `to` are already upright.
    pub fn copy_metadata(&self, from: &Path, to: &Path) -> Result<(), ExifToolError> {
        let output = Command::new(&self.path)
            .arg("-q")
            .arg("-overwrite_original")
            .arg("-TagsFromFile")
            .arg(from)
            .arg("-all:all")
            .arg("-Orientation=1")
            .arg("-n")
            .arg(to)
            .output()
            .map_err(|source| ExifToolError::Spawn {
                path: self.path.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ExifToolError::CommandFailed {
                file: to.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl MetadataReader for ExifTool {
    fn read_batch(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, Tags>, ExifToolError> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }
        let output = Command::new(&self.path)
            .args(["-j", "-n", "-q", "-q"])
            .args(paths)
            .output()
            .map_err(|source| ExifToolError::Spawn {
                path: self.path.clone(),
                source,
            })?;
        if !output.status.success() {
            // exiftool exits 1 when any file in the batch fails; the rest is still valid.
            debug!(status = %output.status, "exiftool reported errors for part of the batch");
        }
        match parse_json_output(&output.stdout, paths) {
            Some(map) => Ok(map),
            None => {
                warn!(
                    files = paths.len(),
                    "could not parse exiftool output, using filesystem timestamps for this batch"
                );
                Ok(HashMap::new())
            }
        }
    }
}

fn probe_version(path: &Path) -> Result<String, ExifToolError> {
    let output = Command::new(path)
        .arg("-ver")
        .output()
        .map_err(|e| ExifToolError::NotFound {
            detail: format!("{}: {e}", path.display()),
        })?;
    if !output.status.success() {
        return Err(ExifToolError::NotFound {
            detail: format!("{} -ver exited with {}", path.display(), output.status),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn path_key(s: &str) -> String {
    s.replace('\\', "/")
}

/// Map exiftool's JSON array back onto the requested paths.
///
/// Returns `None` if the output is not a JSON array. Empty output (every file
/// failed) is an empty map.
pub fn parse_json_output(stdout: &[u8], paths: &[PathBuf]) -> Option<HashMap<PathBuf, Tags>> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Some(HashMap::new());
    }
    let entries: Vec<Value> = serde_json::from_slice(stdout).ok()?;

    let by_name: HashMap<String, &PathBuf> = paths
        .iter()
        .map(|p| (path_key(&p.to_string_lossy()), p))
        .collect();

    let mut map = HashMap::new();
    for entry in entries {
        let Value::Object(tags) = entry else { continue };
        let Some(source) = tags.get("SourceFile").and_then(Value::as_str) else {
            continue;
        };
        match by_name.get(&path_key(source)) {
            Some(path) => {
                map.insert((*path).clone(), tags);
            }
            None => debug!(source, "exiftool returned an entry for an unrequested file"),
        }
    }
    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_entries_by_source_file() {
        let paths = vec![PathBuf::from("in/a.jpg"), PathBuf::from("in/b.jpg")];
        let out = br#"[
            {"SourceFile": "in/b.jpg", "Make": "Canon"},
            {"SourceFile": "in/a.jpg", "DateTimeOriginal": "2024:01:01 00:00:00"}
        ]"#;
        let map = parse_json_output(out, &paths).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&paths[1]]["Make"], "Canon");
        assert!(map[&paths[0]].contains_key("DateTimeOriginal"));
    }

    #[test]
    fn missing_files_are_absent() {
        let paths = vec![PathBuf::from("a.jpg"), PathBuf::from("broken.jpg")];
        let out = br#"[{"SourceFile": "a.jpg"}]"#;
        let map = parse_json_output(out, &paths).unwrap();
        assert!(map.contains_key(&paths[0]));
        assert!(!map.contains_key(&paths[1]));
    }

    #[test]
    fn backslash_paths_match_forward_slashes() {
        let paths = vec![PathBuf::from(r"C:\photos\a.jpg")];
        let out = br#"[{"SourceFile": "C:/photos/a.jpg"}]"#;
        let map = parse_json_output(out, &paths).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn empty_output_is_empty_map() {
        let map = parse_json_output(b"\n", &[PathBuf::from("a.jpg")]).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn garbage_output_is_rejected() {
        assert!(parse_json_output(b"Error: oops", &[PathBuf::from("a.jpg")]).is_none());
        assert!(parse_json_output(br#"{"SourceFile": "a.jpg"}"#, &[PathBuf::from("a.jpg")]).is_none());
    }

    #[test]
    fn entries_without_source_file_are_ignored() {
        let paths = vec![PathBuf::from("a.jpg")];
        let map = parse_json_output(br#"[{"Make": "Canon"}, 3]"#, &paths).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn discover_with_bogus_path_is_not_found() {
        let err = ExifTool::discover(Some(Path::new("/nonexistent/exiftool"))).unwrap_err();
        assert!(matches!(err, ExifToolError::NotFound { .. }));
        assert!(err.to_string().contains("brew install exiftool"));
    }
}
