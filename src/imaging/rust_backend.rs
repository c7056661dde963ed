//! Pure Rust image backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF, BMP) | `image` crate (pure Rust decoders) |
//! | Dimensions | `image::image_dimensions` (header only, no full decode) |
//! | EXIF Orientation | `kamadak-exif` (`exif::Reader::read_from_container`) |
//! | Rotate / mirror | `image::DynamicImage::{rotate90, rotate180, rotate270, fliph, flipv}` |
//! | Encode JPEG | `image::codecs::jpeg::JpegEncoder` at the requested quality |
//! | Encode other formats | `image::DynamicImage::save_with_format` |
//!
//! HEIC/HEIF and camera RAW have no pure-Rust decoder here; callers check
//! [`can_decode`] and skip those files.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{Rotation, Transform, TransformParams};
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

/// Extensions whose decoders are compiled in.
const DECODABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp", "gif", "bmp"];

/// Whether this backend can decode (and re-encode) `path`.
pub fn can_decode(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| DECODABLE_EXTENSIONS.contains(&e.as_str()))
}

/// Pure Rust backend using the `image` and `exif` crates.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk. EXIF orientation is *not* applied.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

fn apply_transform(img: DynamicImage, transform: &Transform) -> DynamicImage {
    let img = match transform.rotation {
        Rotation::None => img,
        Rotation::Cw90 => img.rotate90(),
        Rotation::Cw180 => img.rotate180(),
        Rotation::Cw270 => img.rotate270(),
    };
    let img = if transform.flip_horizontal {
        img.fliph()
    } else {
        img
    };
    if transform.flip_vertical {
        img.flipv()
    } else {
        img
    }
}

/// Save a DynamicImage to the given path, inferring format from extension.
fn save_image(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let format = ImageFormat::from_path(path).map_err(|e| {
        BackendError::ProcessingFailed(format!("Unsupported output format {}: {e}", path.display()))
    })?;

    match format {
        ImageFormat::Jpeg => save_jpeg(img, path, quality),
        other => img.save_with_format(path, other).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to encode {}: {e}", path.display()))
        }),
    }
}

/// JPEG has no alpha and no 16-bit mode, so anything else is flattened to RGB8.
fn save_jpeg(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let file = File::create(path).map_err(BackendError::Io)?;
    let writer = BufWriter::new(file);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality.clamp(1, 100) as u8);
    let result = match img.color() {
        ColorType::L8 | ColorType::Rgb8 => img.write_with_encoder(encoder),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder),
    };
    result.map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn read_orientation(&self, path: &Path) -> Result<Option<u16>, BackendError> {
        let file = File::open(path).map_err(BackendError::Io)?;
        let mut reader = BufReader::new(file);
        let exif_data = match exif::Reader::new().read_from_container(&mut reader) {
            Ok(data) => data,
            Err(exif::Error::Io(e)) => return Err(BackendError::Io(e)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no readable EXIF");
                return Ok(None);
            }
        };
        Ok(exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .and_then(|v| u16::try_from(v).ok()))
    }

    fn transform(&self, params: &TransformParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let out = apply_transform(img, &params.transform);
        save_image(&out, &params.output, params.quality.value())
    }
}
