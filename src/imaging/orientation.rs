//! EXIF orientation correction.
//!
//! Cameras store pixels in sensor order and record how the picture should be
//! displayed in the EXIF Orientation tag (0x0112). Derivatives are cropped
//! from the *displayed* picture, so the correction runs before any geometry.
//!
//! | Tag | Stored as | Correction |
//! |---|---|---|
//! | 1 | normal | none |
//! | 2 | mirrored | flip horizontal |
//! | 3 | upside down | rotate 180° |
//! | 4 | mirrored, upside down | flip vertical |
//! | 5 | transposed | rotate 90° CW, flip horizontal |
//! | 6 | rotated 90° CCW | rotate 90° CW |
//! | 7 | transversed | rotate 270° CW, flip horizontal |
//! | 8 | rotated 90° CW | rotate 270° CW |
//!
//! Missing, corrupt or out-of-range metadata is never an error: the image is
//! treated as tag 1.

use image::DynamicImage;
use std::io::BufReader;
use std::path::Path;

/// EXIF orientation, tags 1–8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::Normal,
        Orientation::FlipHorizontal,
        Orientation::Rotate180,
        Orientation::FlipVertical,
        Orientation::Transpose,
        Orientation::Rotate90,
        Orientation::Transverse,
        Orientation::Rotate270,
    ];

    /// Map an EXIF tag value. Anything outside 1–8 is `None`.
    pub fn from_exif(tag: u32) -> Option<Self> {
        match tag {
            1..=8 => Some(Self::ALL[(tag - 1) as usize]),
            _ => None,
        }
    }

    pub fn exif_value(self) -> u32 {
        match self {
            Orientation::Normal => 1,
            Orientation::FlipHorizontal => 2,
            Orientation::Rotate180 => 3,
            Orientation::FlipVertical => 4,
            Orientation::Transpose => 5,
            Orientation::Rotate90 => 6,
            Orientation::Transverse => 7,
            Orientation::Rotate270 => 8,
        }
    }

    /// Whether correcting swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90
                | Orientation::Transverse
                | Orientation::Rotate270
        )
    }

    /// Apply the correction, returning upright pixels.
    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Orientation::Normal => img,
            Orientation::FlipHorizontal => img.fliph(),
            Orientation::Rotate180 => img.rotate180(),
            Orientation::FlipVertical => img.flipv(),
            Orientation::Transpose => img.rotate90().fliph(),
            Orientation::Rotate90 => img.rotate90(),
            Orientation::Transverse => img.rotate270().fliph(),
            Orientation::Rotate270 => img.rotate270(),
        }
    }

    /// The orientation whose [`apply`](Self::apply) undoes this one.
    ///
    /// Flips, 180° and the two diagonal mirrors are their own inverse; the
    /// quarter turns swap.
    pub fn inverse(self) -> Self {
        match self {
            Orientation::Rotate90 => Orientation::Rotate270,
            Orientation::Rotate270 => Orientation::Rotate90,
            other => other,
        }
    }
}

/// Read the orientation tag from a file's EXIF block.
///
/// Returns [`Orientation::Normal`] when the file has no EXIF, the tag is
/// absent, or the value is out of range.
pub fn read_orientation(path: &Path) -> Orientation {
    match read_exif_tag(path) {
        Some(tag) => Orientation::from_exif(tag).unwrap_or_else(|| {
            tracing::debug!(path = %path.display(), tag, "ignoring out-of-range orientation");
            Orientation::Normal
        }),
        None => Orientation::Normal,
    }
}

fn read_exif_tag(path: &Path) -> Option<u32> {
    let file = std::fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(e) => {
            tracing::trace!(path = %path.display(), error = %e, "no readable EXIF");
            return None;
        }
    };
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{jpeg_with_orientation, write_jpeg};
    use image::{GenericImageView, Rgb, RgbImage};

    /// 3x2 image where every pixel is unique.
    fn marked() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(3, 2, |x, y| {
            Rgb([x as u8 * 40, y as u8 * 40, (x + 3 * y) as u8])
        }))
    }

    #[test]
    fn exif_values_round_trip() {
        for tag in 1..=8 {
            assert_eq!(Orientation::from_exif(tag).unwrap().exif_value(), tag);
        }
        assert_eq!(Orientation::from_exif(0), None);
        assert_eq!(Orientation::from_exif(9), None);
    }

    #[test]
    fn rotate90_moves_bottom_left_to_top_left() {
        // Tag 6: sensor stored the picture turned 90° CCW
        let img = marked();
        let bottom_left = img.get_pixel(0, 1);
        let corrected = Orientation::Rotate90.apply(img);
        assert_eq!(corrected.dimensions(), (2, 3));
        assert_eq!(corrected.get_pixel(0, 0), bottom_left);
    }

    #[test]
    fn transpose_mirrors_across_main_diagonal() {
        let img = marked();
        let corrected = Orientation::Transpose.apply(img.clone());
        for (x, y, px) in img.pixels() {
            assert_eq!(corrected.get_pixel(y, x), px);
        }
    }

    #[test]
    fn transverse_mirrors_across_anti_diagonal() {
        let img = marked();
        let (w, h) = img.dimensions();
        let corrected = Orientation::Transverse.apply(img.clone());
        for (x, y, px) in img.pixels() {
            assert_eq!(corrected.get_pixel(h - 1 - y, w - 1 - x), px);
        }
    }

    #[test]
    fn dimensions_swap_only_for_quarter_turns() {
        for o in Orientation::ALL {
            let corrected = o.apply(marked());
            let expected = if o.swaps_dimensions() { (2, 3) } else { (3, 2) };
            assert_eq!(corrected.dimensions(), expected, "{o:?}");
        }
    }

    #[test]
    fn apply_then_inverse_restores_layout() {
        for o in Orientation::ALL {
            let original = marked();
            let restored = o.inverse().apply(o.apply(original.clone()));
            assert_eq!(restored.to_rgb8(), original.to_rgb8(), "{o:?}");
        }
    }

    #[test]
    fn read_orientation_from_exif_block() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rotated.jpg");
        jpeg_with_orientation(&path, 40, 20, 6);
        assert_eq!(read_orientation(&path), Orientation::Rotate90);
    }

    #[test]
    fn missing_exif_reads_as_normal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("plain.jpg");
        write_jpeg(&path, 20, 10);
        assert_eq!(read_orientation(&path), Orientation::Normal);
    }

    #[test]
    fn unreadable_file_reads_as_normal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("garbage.jpg");
        std::fs::write(&path, b"not an image at all").unwrap();
        assert_eq!(read_orientation(&path), Orientation::Normal);
        assert_eq!(
            read_orientation(Path::new("/nonexistent/photo.jpg")),
            Orientation::Normal
        );
    }

    #[test]
    fn out_of_range_tag_reads_as_normal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("odd.jpg");
        jpeg_with_orientation(&path, 8, 8, 42);
        assert_eq!(read_orientation(&path), Orientation::Normal);
    }
}
