//! Image backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations `orient` and
//! `check` need: identify, read_orientation, and transform.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend) — pure Rust, no external
//! programs. Tests use the `MockBackend` below.

use super::params::TransformParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Trait for image backends.
pub trait ImageBackend: Sync {
    /// Stored pixel dimensions (before any orientation is applied).
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// EXIF `Orientation` value, `None` when the file has no EXIF or no tag.
    fn read_orientation(&self, path: &Path) -> Result<Option<u16>, BackendError>;

    /// Decode the source, apply the transform, encode to the output path.
    fn transform(&self, params: &TransformParams) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::params::{Quality, Rotation, Transform};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Mock backend that records operations without executing them.
    ///
    /// `transform` writes a small marker file to the output path so callers
    /// that persist or move the result see a real file.
    #[derive(Default)]
    pub struct MockBackend {
        pub dimensions: Mutex<HashMap<PathBuf, Dimensions>>,
        pub orientations: Mutex<HashMap<PathBuf, u16>>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        ReadOrientation(String),
        Transform {
            source: String,
            transform: Transform,
            quality: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_image(self, path: &Path, dims: Dimensions, orientation: Option<u16>) -> Self {
            self.dimensions
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), dims);
            if let Some(o) = orientation {
                self.orientations
                    .lock()
                    .unwrap()
                    .insert(path.to_path_buf(), o);
            }
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn transforms(&self) -> Vec<(String, Transform)> {
            self.get_operations()
                .into_iter()
                .filter_map(|op| match op {
                    RecordedOp::Transform {
                        source, transform, ..
                    } => Some((source, transform)),
                    _ => None,
                })
                .collect()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(path.to_string_lossy().to_string()));

            self.dimensions
                .lock()
                .unwrap()
                .get(path)
                .copied()
                .ok_or_else(|| BackendError::ProcessingFailed("No mock dimensions".to_string()))
        }

        fn read_orientation(&self, path: &Path) -> Result<Option<u16>, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::ReadOrientation(path.to_string_lossy().to_string()));

            Ok(self.orientations.lock().unwrap().get(path).copied())
        }

        fn transform(&self, params: &TransformParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Transform {
                source: params.source.to_string_lossy().to_string(),
                transform: params.transform,
                quality: params.quality.value(),
            });
            std::fs::write(&params.output, b"transformed")?;
            Ok(())
        }
    }

    #[test]
    fn mock_records_identify() {
        let path = Path::new("/test/image.jpg");
        let backend = MockBackend::new().with_image(
            path,
            Dimensions {
                width: 800,
                height: 600,
            },
            None,
        );

        let result = backend.identify(path).unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "/test/image.jpg"));
    }

    #[test]
    fn mock_orientation_defaults_to_none() {
        let backend = MockBackend::new();
        assert_eq!(backend.read_orientation(Path::new("/x.jpg")).unwrap(), None);
    }

    #[test]
    fn mock_records_transform() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::new();

        backend
            .transform(&TransformParams {
                source: "/source.jpg".into(),
                output: tmp.path().join("out.jpg"),
                transform: Transform::rotate(Rotation::Cw90),
                quality: Quality::new(95),
            })
            .unwrap();

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Transform {
                quality: 95,
                transform: Transform {
                    rotation: Rotation::Cw90,
                    ..
                },
                ..
            }
        ));
        assert!(tmp.path().join("out.jpg").exists());
    }

    #[test]
    fn dimensions_display() {
        let d = Dimensions {
            width: 4032,
            height: 3024,
        };
        assert_eq!(d.to_string(), "4032x3024");
    }
}
