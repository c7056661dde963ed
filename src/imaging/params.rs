//! Parameter types for pixel operations.
//!
//! These structs describe *what* to do, not *how*. [`orient`](crate::orient)
//! decides the transform, the [`backend`](super::backend) does the pixel work,
//! and a mock backend can stand in for tests.
//!
//! ## Types
//!
//! - [`Quality`] — JPEG encoding quality (1–100, default 95). Clamped on construction.
//! - [`Rotation`] — Clockwise quarter turns.
//! - [`Transform`] — A rotation followed by optional mirroring.
//! - [`TransformParams`] — Source, output path, transform and quality.

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Clockwise rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Whether width and height trade places.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }
}

/// Rotate first, then mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transform {
    pub rotation: Rotation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl Transform {
    pub fn rotate(rotation: Rotation) -> Self {
        Self {
            rotation,
            ..Self::default()
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Short human description, e.g. `rotate 90° + flip horizontal`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.rotation != Rotation::None {
            parts.push(format!("rotate {}°", self.rotation.degrees()));
        }
        if self.flip_horizontal {
            parts.push("flip horizontal".to_string());
        }
        if self.flip_vertical {
            parts.push("flip vertical".to_string());
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(" + ")
        }
    }
}

/// Full specification for one transform-and-save.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub source: PathBuf,
    /// Output file; the format follows its extension.
    pub output: PathBuf,
    pub transform: Transform,
    pub quality: Quality,
}
