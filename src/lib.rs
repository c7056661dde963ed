//! # photo-tidy
//!
//! Batch housekeeping for photo folders: rename images from their capture
//! metadata, bake EXIF orientation into pixels, and clear out macOS
//! `IMG_1234 2.JPG` copies.
//!
//! # Architecture: rename pipeline
//!
//! ```text
//! scan ─► exiftool (batched JSON) ─► ImageRecord ─► FilenameTemplate ─► NameRegistry ─► action
//! ```
//!
//! Every stage is sequential and deterministic: files are sorted before
//! anything else happens, so the first file in path order keeps a contested
//! name and later ones get `-1`, `-2`, … suffixes. Progress flows out as
//! events over an `mpsc` channel that the binary drains on a printer thread.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Collects supported images from a file or directory tree |
//! | [`exiftool`] | Locates exiftool, reads tags in JSON batches, copies metadata |
//! | [`metadata`] | Turns exiftool tags into an [`record::ImageRecord`], with filesystem fallbacks |
//! | [`record`] | Capture time, GPS and device data for one file |
//! | [`naming`] | Filename templates and stem sanitization |
//! | [`collision`] | Unique-name assignment across disk and the current run |
//! | [`actions`] | Rename / copy execution with dry-run support |
//! | [`rename`] | The rename pipeline tying the above together |
//! | [`imaging`] | Pure-Rust orientation transforms behind an `ImageBackend` trait |
//! | [`orient`] | `orient` and `check` commands |
//! | [`dedupe`] | Duplicate-copy detection and removal |
//! | [`config`] | `photo-tidy.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## exiftool for reading, `image` for pixels
//!
//! exiftool understands every maker note and RAW container in existence, so
//! metadata reads go through it, one process per batch. Pixel work stays in
//! pure Rust (`image` + `kamadak-exif`): formats it cannot decode are skipped
//! with a reason rather than half-handled.
//!
//! ## Dry-run by default
//!
//! Every command that moves, rewrites or deletes files only reports what it
//! would do until `--no-dry-run` is given.

pub mod actions;
pub mod collision;
pub mod config;
pub mod dedupe;
pub mod exiftool;
pub mod imaging;
pub mod metadata;
pub mod naming;
pub mod orient;
pub mod output;
pub mod record;
pub mod rename;
pub mod scan;

#[cfg(test)]
pub(crate) mod test_helpers;
