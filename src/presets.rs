//! The size preset catalog.
//!
//! Four crop presets cover every place a listing photo is shown:
//!
//! | Preset | Box | Aspect | Used for |
//! |---|---|---|---|
//! | `hero_1920x1080` | 1920×1080 | 16:9 | full-width hero, large screens |
//! | `hero_1280x720` | 1280×720 | 16:9 | hero on laptops and tablets |
//! | `card_640x360` | 640×360 | 16:9 | listing cards |
//! | `thumb_160x128` | 160×128 | 5:4 | gallery thumbnails |
//!
//! The catalog is fixed at build time. It is handed to the
//! [`DerivativeGenerator`](crate::derivatives::DerivativeGenerator) as a
//! value, so tests can run the pipeline against a smaller catalog.

use crate::imaging::CropPolicy;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// One named output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizePreset {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub policy: CropPolicy,
}

impl SizePreset {
    pub const fn crop(name: &'static str, width: u32, height: u32) -> Self {
        Self {
            name,
            width,
            height,
            policy: CropPolicy::Crop,
        }
    }

    pub const fn fit(name: &'static str, width: u32, height: u32) -> Self {
        Self {
            name,
            width,
            height,
            policy: CropPolicy::Fit,
        }
    }

    pub fn target(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reduced aspect ratio, e.g. `(16, 9)`.
    pub fn aspect(&self) -> (u32, u32) {
        let g = gcd(self.width, self.height).max(1);
        (self.width / g, self.height / g)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Built-in presets, in generation order.
pub const CATALOG: [SizePreset; 4] = [
    SizePreset::crop("hero_1920x1080", 1920, 1080),
    SizePreset::crop("hero_1280x720", 1280, 720),
    SizePreset::crop("card_640x360", 640, 360),
    SizePreset::crop("thumb_160x128", 160, 128),
];

/// SHA-256 over a catalog's names, boxes and policies.
///
/// Changes whenever a preset is added, removed, renamed or resized.
pub fn catalog_fingerprint(presets: &[SizePreset]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"presets\0");
    for preset in presets {
        hasher.update(preset.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(preset.width.to_le_bytes());
        hasher.update(preset.height.to_le_bytes());
        hasher.update(match preset.policy {
            CropPolicy::Crop => b"c",
            CropPolicy::Fit => b"f",
        });
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_and_boxes() {
        let names: Vec<&str> = CATALOG.iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec!["hero_1920x1080", "hero_1280x720", "card_640x360", "thumb_160x128"]
        );
        assert_eq!(CATALOG[0].target(), (1920, 1080));
        assert_eq!(CATALOG[3].target(), (160, 128));
    }

    #[test]
    fn all_builtins_crop() {
        assert!(CATALOG.iter().all(|p| p.policy == CropPolicy::Crop));
    }

    #[test]
    fn aspects_match_names() {
        assert_eq!(CATALOG[0].aspect(), (16, 9));
        assert_eq!(CATALOG[1].aspect(), (16, 9));
        assert_eq!(CATALOG[2].aspect(), (16, 9));
        assert_eq!(CATALOG[3].aspect(), (5, 4));
    }

    #[test]
    fn names_encode_their_box() {
        for p in CATALOG {
            assert!(p.name.ends_with(&format!("{}x{}", p.width, p.height)));
        }
    }

    #[test]
    fn fingerprint_tracks_catalog_changes() {
        let base = catalog_fingerprint(&CATALOG);
        assert_eq!(base, catalog_fingerprint(&CATALOG));
        assert_ne!(base, catalog_fingerprint(&CATALOG[..3]));

        let mut resized = CATALOG;
        resized[2] = SizePreset::crop("card_640x360", 640, 400);
        assert_ne!(base, catalog_fingerprint(&resized));

        let mut refit = CATALOG;
        refit[3] = SizePreset::fit("thumb_160x128", 160, 128);
        assert_ne!(base, catalog_fingerprint(&refit));
    }
}
