//! Tool configuration.
//!
//! Loads and validates `photo-tidy.toml`. Stock defaults are the base layer;
//! the user file is merged on top key by key, then command-line flags
//! override the merged result.
//!
//! ## Config File Location
//!
//! `--config PATH` names a file explicitly (it must exist). Otherwise
//! `photo-tidy.toml` is picked up from the source directory when present:
//!
//! ```text
//! Pictures/
//! ├── photo-tidy.toml      # optional
//! ├── IMG_0001.JPG
//! └── ...
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [rename]
//! # template = "{date}_{time}_{ms}{gps}_{original}"
//! include_camera = false
//! keep_original = true
//! batch_size = 50
//!
//! [exiftool]
//! # path = "/opt/homebrew/bin/exiftool"
//!
//! [orient]
//! jpeg_quality = 95
//!
//! [dedupe]
//! trash_dir_name = "_duplicates_trash"
//! ```
//!
//! Config files are sparse, and unknown keys are rejected to catch typos early.

use crate::dedupe::DEFAULT_TRASH_DIR_NAME;
use crate::naming::{FilenameTemplate, NamingError};
use crate::rename::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Picked up from the source directory when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "photo-tidy.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("invalid rename.template: {0}")]
    Template(#[from] NamingError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub rename: RenameConfig,
    pub exiftool: ExifToolConfig,
    pub orient: OrientConfig,
    pub dedupe: DedupeConfig,
}

impl ToolConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rename.batch_size == 0 {
            return Err(ConfigError::Validation(
                "rename.batch_size must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.orient.jpeg_quality) {
            return Err(ConfigError::Validation(
                "orient.jpeg_quality must be 1-100".into(),
            ));
        }
        let trash = &self.dedupe.trash_dir_name;
        if trash.is_empty() || trash.contains(['/', '\\']) || trash == "." || trash == ".." {
            return Err(ConfigError::Validation(
                "dedupe.trash_dir_name must be a plain directory name".into(),
            ));
        }
        self.template()?;
        Ok(())
    }

    /// The compiled custom template, if one is configured.
    pub fn template(&self) -> Result<Option<FilenameTemplate>, NamingError> {
        self.rename
            .template
            .as_deref()
            .map(str::parse::<FilenameTemplate>)
            .transpose()
    }
}

/// Defaults for the `rename` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenameConfig {
    /// Custom filename template. Absent means the stock layout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Render `{camera}` placeholders.
    pub include_camera: bool,
    /// Append the original stem to generated names.
    pub keep_original: bool,
    /// Files per exiftool invocation.
    pub batch_size: usize,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            template: None,
            include_camera: false,
            keep_original: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExifToolConfig {
    /// Explicit exiftool binary. Absent means a `PATH` lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrientConfig {
    /// JPEG re-encode quality (1 = worst, 100 = best).
    pub jpeg_quality: u32,
}

impl Default for OrientConfig {
    fn default() -> Self {
        Self { jpeg_quality: 95 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupeConfig {
    /// Trash folder created inside the scanned folder by `--trash`.
    pub trash_dir_name: String,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            trash_dir_name: DEFAULT_TRASH_DIR_NAME.to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ToolConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` when it does not exist.
pub fn load_raw_config(file: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !file.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(file)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ToolConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ToolConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Where the config comes from: the explicit path, else
/// [`CONFIG_FILE_NAME`] in `source_dir`.
pub fn config_path(explicit: Option<&Path>, source_dir: &Path) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => source_dir.join(CONFIG_FILE_NAME),
    }
}

/// Load, merge over stock defaults, and validate.
///
/// An explicit path that does not exist is an error; a missing file in the
/// source directory just means stock defaults.
pub fn load_config(explicit: Option<&Path>, source_dir: &Path) -> Result<ToolConfig, ConfigError> {
    let path = config_path(explicit, source_dir);
    let overlay = load_raw_config(&path)?;
    if overlay.is_none() && explicit.is_some() {
        return Err(ConfigError::NotFound(path));
    }
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `photo-tidy.toml` with all keys.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# photo-tidy configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Looked up as photo-tidy.toml in the source directory, or passed with
# --config. Command-line flags override anything set here.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# rename
# ---------------------------------------------------------------------------
[rename]
# Filename template. Placeholders: {date} {time} {ms} {gps} {original}
# {year} {month} {day} {hour} {minute} {second} {camera} {device}.
# Use {{ and }} for literal braces. Leave unset for the stock layout:
#   {date}_{time}_{ms}{gps}_{original}
# template = "{year}-{month}-{day}_{hour}{minute}{second}_{device}"

# Render {camera} placeholders in custom templates.
include_camera = false

# Append the original file stem to generated names.
keep_original = true

# Files per exiftool invocation.
batch_size = 50

# ---------------------------------------------------------------------------
# exiftool
# ---------------------------------------------------------------------------
[exiftool]
# Explicit binary. Omit to search PATH.
# path = "/opt/homebrew/bin/exiftool"

# ---------------------------------------------------------------------------
# orient
# ---------------------------------------------------------------------------
[orient]
# JPEG re-encode quality (1 = worst, 100 = best).
jpeg_quality = 95

# ---------------------------------------------------------------------------
# dedupe
# ---------------------------------------------------------------------------
[dedupe]
# Folder created inside the scanned folder by --trash.
trash_dir_name = "_duplicates_trash"
"##
}
