//! Pure Rust decoding plus native WebP, statically linked.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate decoders |
//! | Orientation | `kamadak-exif` via [`read_orientation`] |
//! | Crop + resample | `crop_imm` + `resize_exact` with `Lanczos3` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6), `avif` feature |
//! | Encode → WebP | `webp` crate (libwebp, lossy) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//!
//! Encoders are picked from a per-format table. A format without a table
//! entry reports [`BackendError::FormatUnsupported`].

use super::backend::{BackendError, Dimensions, ImageBackend, SourceImage};
use super::geometry::Placement;
use super::orientation::read_orientation;
use super::params::{Format, Quality};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError, ImageReader};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// rav1e speed preset: 6 keeps a full-catalog encode within a few seconds.
#[cfg(feature = "avif")]
const AVIF_SPEED: u8 = 6;

type EncodeFn = fn(&DynamicImage, Quality, &mut BufWriter<File>) -> Result<(), BackendError>;

/// The encoder table. `None` means the codec is not compiled in.
fn encoder_for(format: Format) -> Option<EncodeFn> {
    match format {
        #[cfg(feature = "avif")]
        Format::Avif => Some(encode_avif),
        #[cfg(not(feature = "avif"))]
        Format::Avif => None,
        Format::Webp => Some(encode_webp),
        Format::Jpeg => Some(encode_jpeg),
    }
}

/// Backend using the `image` crate ecosystem.
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

fn unreadable(path: &Path, reason: impl ToString) -> BackendError {
    BackendError::SourceUnreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Narrow to 8-bit RGB, or RGBA when the format keeps alpha and the source
/// has it. No background is composited.
fn as_8bit(img: &DynamicImage, keep_alpha: bool) -> Cow<'_, DynamicImage> {
    match img {
        DynamicImage::ImageRgb8(_) => Cow::Borrowed(img),
        DynamicImage::ImageRgba8(_) if keep_alpha => Cow::Borrowed(img),
        _ if keep_alpha && img.color().has_alpha() => {
            Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8()))
        }
        _ => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
    }
}

fn image_error(format: Format, e: ImageError) -> BackendError {
    match e {
        ImageError::Unsupported(_) => BackendError::FormatUnsupported(format),
        ImageError::IoError(io) => BackendError::Io(io),
        other => BackendError::EncodeFailed {
            format,
            reason: other.to_string(),
        },
    }
}

#[cfg(feature = "avif")]
fn encode_avif(
    img: &DynamicImage,
    quality: Quality,
    writer: &mut BufWriter<File>,
) -> Result<(), BackendError> {
    let pixels = as_8bit(img, Format::Avif.supports_alpha());
    let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
        writer,
        AVIF_SPEED,
        quality.value() as u8,
    );
    pixels
        .write_with_encoder(encoder)
        .map_err(|e| image_error(Format::Avif, e))
}

fn encode_webp(
    img: &DynamicImage,
    quality: Quality,
    writer: &mut BufWriter<File>,
) -> Result<(), BackendError> {
    let pixels = as_8bit(img, Format::Webp.supports_alpha());
    let (width, height) = pixels.dimensions();
    let encoder = if let Some(buf) = pixels.as_rgba8() {
        webp::Encoder::from_rgba(buf.as_raw(), width, height)
    } else if let Some(buf) = pixels.as_rgb8() {
        webp::Encoder::from_rgb(buf.as_raw(), width, height)
    } else {
        return Err(BackendError::EncodeFailed {
            format: Format::Webp,
            reason: format!("unexpected pixel layout {:?}", pixels.color()),
        });
    };
    let memory = encoder
        .encode_simple(false, quality.value() as f32)
        .map_err(|e| BackendError::EncodeFailed {
            format: Format::Webp,
            reason: format!("{e:?}"),
        })?;
    writer.write_all(&memory)?;
    Ok(())
}

fn encode_jpeg(
    img: &DynamicImage,
    quality: Quality,
    writer: &mut BufWriter<File>,
) -> Result<(), BackendError> {
    // Alpha is dropped here, not flattened onto a color
    let pixels = as_8bit(img, Format::Jpeg.supports_alpha());
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality.value() as u8);
    pixels
        .write_with_encoder(encoder)
        .map_err(|e| image_error(Format::Jpeg, e))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) =
            image::image_dimensions(path).map_err(|e| unreadable(path, e))?;
        Ok(Dimensions { width, height })
    }

    fn load(&self, path: &Path) -> Result<SourceImage, BackendError> {
        let pixels = ImageReader::open(path)
            .map_err(|e| unreadable(path, e))?
            .with_guessed_format()
            .map_err(|e| unreadable(path, e))?
            .decode()
            .map_err(|e| unreadable(path, e))?;
        Ok(SourceImage {
            pixels,
            orientation: read_orientation(path),
        })
    }

    fn resample(&self, image: &DynamicImage, placement: &Placement) -> DynamicImage {
        let c = placement.crop;
        let full = c.x == 0 && c.y == 0 && (c.width, c.height) == image.dimensions();
        let region = if full {
            Cow::Borrowed(image)
        } else {
            Cow::Owned(image.crop_imm(c.x, c.y, c.width, c.height))
        };
        if region.dimensions() == (placement.output_width, placement.output_height) {
            return region.into_owned();
        }
        region.resize_exact(
            placement.output_width,
            placement.output_height,
            FilterType::Lanczos3,
        )
    }

    fn supports(&self, format: Format) -> bool {
        encoder_for(format).is_some()
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: Format,
        quality: Quality,
        output: &Path,
    ) -> Result<(), BackendError> {
        let encode = encoder_for(format).ok_or(BackendError::FormatUnsupported(format))?;
        let file = File::create(output)?;
        let mut writer = BufWriter::new(file);
        let result = encode(image, quality, &mut writer).and_then(|()| {
            writer.flush()?;
            Ok(())
        });
        if result.is_err() {
            // Never leave a truncated derivative behind for the existence check
            let _ = std::fs::remove_file(output);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::geometry::compute_center_crop;
    use crate::imaging::orientation::Orientation;
    use crate::test_helpers::{jpeg_with_orientation, write_jpeg, write_transparent_png};

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        write_jpeg(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 200, height: 150 });
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(BackendError::SourceUnreadable { .. })));
    }

    #[test]
    fn load_reads_orientation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("turned.jpg");
        jpeg_with_orientation(&path, 40, 20, 6);

        let source = RustBackend::new().load(&path).unwrap();
        assert_eq!(source.orientation, Orientation::Rotate90);
        assert_eq!(source.into_upright().dimensions(), (20, 40));
    }

    #[test]
    fn load_garbage_is_unreadable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fake.jpg");
        std::fs::write(&path, b"definitely not pixels").unwrap();

        let result = RustBackend::new().load(&path);
        assert!(matches!(result, Err(BackendError::SourceUnreadable { .. })));
    }

    #[test]
    fn resample_crops_then_scales() {
        let img = DynamicImage::ImageRgb8(crate::test_helpers::gradient(300, 200));
        let placement = compute_center_crop((300, 200), (64, 36)).unwrap();
        let out = RustBackend::new().resample(&img, &placement);
        assert_eq!(out.dimensions(), (64, 36));
    }

    #[test]
    fn jpeg_and_webp_are_always_available() {
        let backend = RustBackend::new();
        assert!(backend.supports(Format::Webp));
        assert!(backend.supports(Format::Jpeg));
        assert_eq!(backend.supports(Format::Avif), cfg!(feature = "avif"));
    }

    #[test]
    fn encode_jpeg_and_webp_round_trip_dimensions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let img = DynamicImage::ImageRgb8(crate::test_helpers::gradient(64, 36));
        let backend = RustBackend::new();

        for format in [Format::Webp, Format::Jpeg] {
            let out = tmp.path().join(format!("out.{}", format.extension()));
            backend.encode(&img, format, Quality::new(80), &out).unwrap();
            assert_eq!(image::image_dimensions(&out).unwrap(), (64, 36));
        }
    }

    #[cfg(feature = "avif")]
    #[test]
    fn encode_avif_writes_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let img = DynamicImage::ImageRgb8(crate::test_helpers::gradient(32, 18));
        let out = tmp.path().join("out.avif");
        RustBackend::new()
            .encode(&img, Format::Avif, Quality::new(55), &out)
            .unwrap();
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
    }

    #[test]
    fn webp_keeps_alpha() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("logo.png");
        write_transparent_png(&src, 32, 16);
        let backend = RustBackend::new();
        let img = backend.load(&src).unwrap().into_upright();

        let out = tmp.path().join("logo.webp");
        backend.encode(&img, Format::Webp, Quality::new(80), &out).unwrap();

        let decoded = image::open(&out).unwrap();
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn jpeg_drops_alpha_without_failing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("logo.png");
        write_transparent_png(&src, 32, 16);
        let backend = RustBackend::new();
        let img = backend.load(&src).unwrap().into_upright();

        let out = tmp.path().join("logo.jpeg");
        backend.encode(&img, Format::Jpeg, Quality::new(85), &out).unwrap();
        assert!(!image::open(&out).unwrap().color().has_alpha());
    }

    #[test]
    fn failed_encode_leaves_no_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let img = DynamicImage::ImageRgb8(crate::test_helpers::gradient(8, 8));
        // Directory does not exist: File::create fails before anything is written
        let out = tmp.path().join("missing-dir").join("x.jpeg");
        let result = RustBackend::new().encode(&img, Format::Jpeg, Quality::new(85), &out);
        assert!(matches!(result, Err(BackendError::Io(_))));
        assert!(!out.exists());
    }
}
