//! Shared test utilities: synthetic source images and record fixtures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let source = tmp.path().join("livingroom.jpg");
//! write_jpeg(&source, 400, 300);
//! jpeg_with_orientation(&tmp.path().join("turned.jpg"), 400, 300, 6);
//! ```

use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

use crate::records::{ImageRecord, RecordId};

// =========================================================================
// Synthetic images
// =========================================================================

/// Gradient RGB pixels, so crops and rotations are visible when debugging.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

fn encode_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut bytes)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    bytes
}

/// Write a valid baseline JPEG with the given dimensions.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, encode_jpeg(width, height)).unwrap();
}

/// Write a JPEG carrying an EXIF APP1 segment with a single Orientation tag.
pub fn jpeg_with_orientation(path: &Path, width: u32, height: u32, tag: u16) {
    let jpeg = encode_jpeg(width, height);

    // Little-endian TIFF: header, one IFD entry (0x0112 SHORT x1), no next IFD
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II\x2A\x00");
    tiff.extend_from_slice(&8u32.to_le_bytes());
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x0112u16.to_le_bytes());
    tiff.extend_from_slice(&3u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&tag.to_le_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_le_bytes());

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, out).unwrap();
}

/// Write an RGBA PNG whose left half is fully transparent.
pub fn write_transparent_png(path: &Path, width: u32, height: u32) {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([200, 30, 30, 255])
        }
    });
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    img.save(path).unwrap();
}

// =========================================================================
// Records
// =========================================================================

/// A record whose `image_path` is a public URL under `/uploads`.
pub fn record(id: u64, property: u64, sort_order: i64, url_path: &str) -> ImageRecord {
    ImageRecord {
        id: RecordId::from(id),
        property_id: RecordId::from(property),
        image_path: Some(url_path.to_string()),
        image_url: None,
        sort_order,
    }
}
