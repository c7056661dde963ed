//! Pure orientation math.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;
use super::params::{Rotation, Transform};

/// Target shape for `orient --mode target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Width ≥ height. Squares count as landscape.
    Landscape,
    Portrait,
}

impl Shape {
    pub fn of(dims: Dimensions) -> Self {
        if dims.width >= dims.height {
            Shape::Landscape
        } else {
            Shape::Portrait
        }
    }

    /// `L` / `P`, as used in the check report.
    pub fn letter(self) -> char {
        match self {
            Shape::Landscape => 'L',
            Shape::Portrait => 'P',
        }
    }
}

/// Pixel transform that makes an image with EXIF `Orientation` upright.
///
/// Returns `None` for 1 (already upright) and for values outside 1–8.
///
/// | Tag | Stored as                     | Correction            |
/// |-----|-------------------------------|-----------------------|
/// | 2   | mirrored                      | flip horizontal       |
/// | 3   | upside down                   | rotate 180°           |
/// | 4   | mirrored upside down          | flip vertical         |
/// | 5   | transposed                    | rotate 90° + flip H   |
/// | 6   | turned 90° counter-clockwise  | rotate 90°            |
/// | 7   | transversed                   | rotate 270° + flip H  |
/// | 8   | turned 90° clockwise          | rotate 270°           |
pub fn transform_for_exif(orientation: u16) -> Option<Transform> {
    let (rotation, flip_horizontal, flip_vertical) = match orientation {
        2 => (Rotation::None, true, false),
        3 => (Rotation::Cw180, false, false),
        4 => (Rotation::None, false, true),
        5 => (Rotation::Cw90, true, false),
        6 => (Rotation::Cw90, false, false),
        7 => (Rotation::Cw270, true, false),
        8 => (Rotation::Cw270, false, false),
        _ => return None,
    };
    Some(Transform {
        rotation,
        flip_horizontal,
        flip_vertical,
    })
}

/// Quarter turn that brings `dims` to `target`, or `None` if it already is.
///
/// Landscape is reached clockwise and portrait counter-clockwise.
pub fn transform_for_target(dims: Dimensions, target: Shape) -> Option<Transform> {
    if Shape::of(dims) == target {
        return None;
    }
    Some(Transform::rotate(match target {
        Shape::Landscape => Rotation::Cw90,
        Shape::Portrait => Rotation::Cw270,
    }))
}

/// Dimensions after applying `transform`.
pub fn transformed_dimensions(dims: Dimensions, transform: &Transform) -> Dimensions {
    if transform.rotation.swaps_axes() {
        Dimensions {
            width: dims.height,
            height: dims.width,
        }
    } else {
        dims
    }
}

/// Human-readable meaning of an EXIF Orientation value.
pub fn describe_orientation(orientation: u16) -> String {
    match orientation {
        1 => "Normal (no rotation needed)".into(),
        2 => "Mirrored horizontally".into(),
        3 => "Rotated 180°".into(),
        4 => "Mirrored vertically".into(),
        5 => "Mirrored horizontally and rotated 270° CW".into(),
        6 => "Rotated 90° CW (270° CCW)".into(),
        7 => "Mirrored horizontally and rotated 90° CW".into(),
        8 => "Rotated 270° CW (90° CCW)".into(),
        other => format!("Unknown ({other})"),
    }
}
