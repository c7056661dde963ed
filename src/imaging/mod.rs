//! Image orientation handling — pure Rust, no external programs.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **EXIF Orientation** | `kamadak-exif` |
//! | **Rotate / mirror → encode** | `image` (JPEG at configurable quality) |
//!
//! The module is split into:
//! - **Calculations**: Pure orientation math (unit testable)
//! - **Parameters**: Data structures describing a transform
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{
    Shape, describe_orientation, transform_for_exif, transform_for_target, transformed_dimensions,
};
pub use params::{Quality, Rotation, Transform, TransformParams};
pub use rust_backend::{RustBackend, can_decode};
