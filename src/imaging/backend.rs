//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the operations the derivative pipeline
//! needs: identify, load, resample, and encode. It is the seam tests use to
//! substitute a recording mock or to simulate a runtime without AVIF.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::geometry::Placement;
use super::orientation::Orientation;
use super::params::{Format, Quality};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot read source image {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },
    #[error("{0} encoding is not available in this build")]
    FormatUnsupported(Format),
    #[error("{format} encode failed: {reason}")]
    EncodeFailed { format: Format, reason: String },
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A decoded source, before orientation correction.
///
/// Lives only for the duration of one generate call.
pub struct SourceImage {
    pub pixels: DynamicImage,
    pub orientation: Orientation,
}

impl SourceImage {
    /// Consume the source and return upright pixels.
    pub fn into_upright(self) -> DynamicImage {
        self.orientation.apply(self.pixels)
    }
}

/// Trait for image processing backends.
///
/// Must be `Sync`: the backfill shares one backend across worker threads.
pub trait ImageBackend: Sync {
    /// Get image dimensions as stored (orientation not applied).
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode a source file and read its orientation tag.
    fn load(&self, path: &Path) -> Result<SourceImage, BackendError>;

    /// Crop to `placement.crop` and resample to the output size.
    fn resample(&self, image: &DynamicImage, placement: &Placement) -> DynamicImage;

    /// Whether this runtime can encode `format` at all.
    fn supports(&self, format: Format) -> bool;

    /// Encode `image` as `format` and write it to `output`.
    fn encode(
        &self,
        image: &DynamicImage,
        format: Format,
        quality: Quality,
        output: &Path,
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use image::GenericImageView;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock backend that records operations and writes placeholder files.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    pub struct MockBackend {
        pub source_dims: (u32, u32),
        pub dims_by_path: Mutex<HashMap<PathBuf, (u32, u32)>>,
        pub unsupported: Vec<Format>,
        pub failing: Vec<Format>,
        pub denied: Vec<Format>,
        pub unwritten: Vec<Format>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Load(String),
        Resample {
            crop: (u32, u32, u32, u32),
            width: u32,
            height: u32,
        },
        Encode {
            output: String,
            format: Format,
            quality: u32,
            width: u32,
            height: u32,
        },
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self::with_source(3000, 2000)
        }
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every existing source decodes to a blank image of this size.
        pub fn with_source(width: u32, height: u32) -> Self {
            Self {
                source_dims: (width, height),
                dims_by_path: Mutex::new(HashMap::new()),
                unsupported: Vec::new(),
                failing: Vec::new(),
                denied: Vec::new(),
                unwritten: Vec::new(),
                operations: Mutex::new(Vec::new()),
            }
        }

        pub fn without(mut self, format: Format) -> Self {
            self.unsupported.push(format);
            self
        }

        pub fn failing_on(mut self, format: Format) -> Self {
            self.failing.push(format);
            self
        }

        /// Encoding `format` fails with a permission error, as when the
        /// output directory belongs to another user.
        pub fn denied_on(mut self, format: Format) -> Self {
            self.denied.push(format);
            self
        }

        /// Encoding `format` reports success without writing anything.
        pub fn unwritten_on(mut self, format: Format) -> Self {
            self.unwritten.push(format);
            self
        }

        pub fn set_dims(&self, path: &Path, dims: (u32, u32)) {
            self.dims_by_path
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), dims);
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn encodes(&self) -> Vec<RecordedOp> {
            self.get_operations()
                .into_iter()
                .filter(|op| matches!(op, RecordedOp::Encode { .. }))
                .collect()
        }

        fn dims_for(&self, path: &Path) -> (u32, u32) {
            self.dims_by_path
                .lock()
                .unwrap()
                .get(path)
                .copied()
                .unwrap_or(self.source_dims)
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            let (width, height) = self.dims_for(path);
            Ok(Dimensions { width, height })
        }

        fn load(&self, path: &Path) -> Result<SourceImage, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Load(path.to_string_lossy().to_string()));
            if !path.exists() {
                return Err(BackendError::SourceUnreadable {
                    path: path.to_path_buf(),
                    reason: "No such file".into(),
                });
            }
            let (w, h) = self.dims_for(path);
            Ok(SourceImage {
                pixels: DynamicImage::new_rgb8(w, h),
                orientation: Orientation::Normal,
            })
        }

        fn resample(&self, _image: &DynamicImage, placement: &Placement) -> DynamicImage {
            let c = placement.crop;
            self.operations.lock().unwrap().push(RecordedOp::Resample {
                crop: (c.x, c.y, c.width, c.height),
                width: placement.output_width,
                height: placement.output_height,
            });
            DynamicImage::new_rgb8(placement.output_width, placement.output_height)
        }

        fn supports(&self, format: Format) -> bool {
            !self.unsupported.contains(&format)
        }

        fn encode(
            &self,
            image: &DynamicImage,
            format: Format,
            quality: Quality,
            output: &Path,
        ) -> Result<(), BackendError> {
            let (width, height) = image.dimensions();
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                output: output.to_string_lossy().to_string(),
                format,
                quality: quality.value(),
                width,
                height,
            });
            if self.unsupported.contains(&format) {
                return Err(BackendError::FormatUnsupported(format));
            }
            if self.failing.contains(&format) {
                return Err(BackendError::EncodeFailed {
                    format,
                    reason: "mock failure".into(),
                });
            }
            if self.denied.contains(&format) {
                return Err(BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "permission denied",
                )));
            }
            if self.unwritten.contains(&format) {
                return Ok(());
            }
            std::fs::write(output, format!("{format} {width}x{height}"))?;
            Ok(())
        }
    }

    #[test]
    fn mock_records_load_and_encode() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("a.jpg");
        std::fs::write(&source, "").unwrap();

        let backend = MockBackend::with_source(800, 600);
        let loaded = backend.load(&source).unwrap();
        assert_eq!(loaded.pixels.dimensions(), (800, 600));

        let out = tmp.path().join("a.card_640x360.jpeg");
        backend
            .encode(&loaded.pixels, Format::Jpeg, Quality::new(85), &out)
            .unwrap();
        assert!(out.exists());

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[1], RecordedOp::Encode { quality: 85, format: Format::Jpeg, .. }));
    }

    #[test]
    fn mock_refuses_missing_source() {
        let backend = MockBackend::new();
        let result = backend.load(Path::new("/nonexistent/a.jpg"));
        assert!(matches!(result, Err(BackendError::SourceUnreadable { .. })));
    }

    #[test]
    fn mock_reports_unsupported_format() {
        let backend = MockBackend::new().without(Format::Avif);
        assert!(!backend.supports(Format::Avif));
        assert!(backend.supports(Format::Webp));
    }

    #[test]
    fn upright_applies_orientation() {
        let source = SourceImage {
            pixels: DynamicImage::new_rgb8(40, 20),
            orientation: Orientation::Rotate90,
        };
        assert_eq!(source.into_upright().dimensions(), (20, 40));
    }
}
