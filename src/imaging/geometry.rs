//! Pure geometry for derivative sizing.
//!
//! All functions here are pure and testable without any I/O or images.
//! Dimensions are `(width, height)` tuples in pixels.

use serde::{Deserialize, Serialize};

/// How a source is mapped onto a preset's target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropPolicy {
    /// Fill the box exactly; overflow on one axis is cropped away, centered.
    Crop,
    /// Fit inside the box, keeping the whole source and its aspect ratio.
    Fit,
}

/// Region of the source image that is sampled, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where the pixels come from and how large the output is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub crop: CropRect,
    pub output_width: u32,
    pub output_height: u32,
}

/// Center-crop a source to fill a target box.
///
/// `scale = max(tw/sw, th/sh)`, so the scaled source covers the target and
/// the overflow is cut equally from both sides. The crop rectangle is rounded
/// half-up to whole pixels and clamped inside the source. Output is exactly
/// the target size.
///
/// The arithmetic is done on integer ratios so `.5` cases round the same way
/// on every platform.
///
/// Returns `None` when any dimension is zero.
///
/// # Examples
/// ```
/// # use responsive_derivatives::imaging::geometry::compute_center_crop;
/// // 3000x2000 into 1920x1080: full width, 1688 rows starting at y=156
/// let p = compute_center_crop((3000, 2000), (1920, 1080)).unwrap();
/// assert_eq!((p.crop.x, p.crop.y, p.crop.width, p.crop.height), (0, 156, 3000, 1688));
/// assert_eq!((p.output_width, p.output_height), (1920, 1080));
/// ```
pub fn compute_center_crop(source: (u32, u32), target: (u32, u32)) -> Option<Placement> {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;
    if src_w == 0 || src_h == 0 || tgt_w == 0 || tgt_h == 0 {
        return None;
    }
    let (sw, sh, tw, th) = (src_w as u64, src_h as u64, tgt_w as u64, tgt_h as u64);

    let (width, height, x, y) = if tw * sh >= th * sw {
        // scale = tw/sw: full width, rows trimmed top and bottom
        let crop_h = div_round(th * sw, tw);
        let offset = div_round(sh * tw - th * sw, 2 * tw);
        (sw, crop_h, 0, offset)
    } else {
        // scale = th/sh: full height, columns trimmed left and right
        let crop_w = div_round(tw * sh, th);
        let offset = div_round(sw * th - tw * sh, 2 * th);
        (crop_w, sh, offset, 0)
    };

    let width = (width as u32).clamp(1, src_w);
    let height = (height as u32).clamp(1, src_h);

    Some(Placement {
        crop: CropRect {
            x: (x as u32).min(src_w - width),
            y: (y as u32).min(src_h - height),
            width,
            height,
        },
        output_width: tgt_w,
        output_height: tgt_h,
    })
}

/// Fit a source inside a target box without cropping.
///
/// `scale = min(tw/sw, th/sh)`; output is the scaled source rounded to whole
/// pixels (never below 1). The crop rectangle is the full source.
///
/// Returns `None` when any dimension is zero.
pub fn compute_fit_dimensions(source: (u32, u32), target: (u32, u32)) -> Option<Placement> {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;
    if src_w == 0 || src_h == 0 || tgt_w == 0 || tgt_h == 0 {
        return None;
    }
    let (sw, sh, tw, th) = (src_w as u64, src_h as u64, tgt_w as u64, tgt_h as u64);

    let (output_width, output_height) = if tw * sh <= th * sw {
        (tw, div_round(sh * tw, sw))
    } else {
        (div_round(sw * th, sh), th)
    };

    Some(Placement {
        crop: CropRect {
            x: 0,
            y: 0,
            width: src_w,
            height: src_h,
        },
        output_width: (output_width as u32).clamp(1, tgt_w),
        output_height: (output_height as u32).clamp(1, tgt_h),
    })
}

/// `num / den` rounded half-up.
fn div_round(num: u64, den: u64) -> u64 {
    (2 * num + den) / (2 * den)
}

/// Compute the placement for a target box under the given policy.
pub fn plan(source: (u32, u32), target: (u32, u32), policy: CropPolicy) -> Option<Placement> {
    match policy {
        CropPolicy::Crop => compute_center_crop(source, target),
        CropPolicy::Fit => compute_fit_dimensions(source, target),
    }
}

/// True when producing the target box would require enlarging the source.
///
/// Derivatives are never upscaled; callers skip such presets.
pub fn needs_upscale(source: (u32, u32), target: (u32, u32)) -> bool {
    source.0 < target.0 || source.1 < target.1
}
