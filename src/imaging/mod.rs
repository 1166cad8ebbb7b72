//! Image processing: geometry, orientation, and codecs.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Orientation** | `kamadak-exif` Orientation tag → flip/rotate |
//! | **Crop + resample** | `crop_imm` + Lanczos3 `resize_exact` |
//! | **Encode** | rav1e (AVIF), libwebp (WebP), `image` (JPEG) |
//!
//! The module is split into:
//! - **Geometry**: Pure functions for crop/fit math (unit testable)
//! - **Orientation**: EXIF tag reading and pixel correction
//! - **Parameters**: Formats and the quality policy
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
pub mod geometry;
pub mod orientation;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, SourceImage};
pub use geometry::{CropPolicy, CropRect, Placement};
pub use orientation::Orientation;
pub use params::{Format, Quality, QualityPolicy};
pub use rust_backend::RustBackend;
