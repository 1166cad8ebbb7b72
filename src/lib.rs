//! # Responsive Derivatives
//!
//! Turns every uploaded property photo into a fixed set of pre-cropped,
//! pre-encoded variants so listing pages can serve the right size and codec
//! per viewport and browser without resizing anything at request time.
//!
//! # Architecture
//!
//! One generator, two callers:
//!
//! ```text
//! upload handler ─┐
//!                 ├─→ DerivativeGenerator ─→ orient → crop/fit → encode ─→ files next to source
//! backfill ───────┘        (presets × formats)
//! ```
//!
//! The upload path calls [`derivatives::DerivativeGenerator::generate`] for
//! a single image. The [`backfill`] walks existing image records and calls
//! the same function for every image that has no derivatives yet.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`derivatives`] | Generator: one source → every preset × format, plus inventory and removal |
//! | [`backfill`] | Batch driver over image records with skip/force policy, parallelism and cancellation |
//! | [`imaging`] | Geometry, EXIF orientation, and the codec backend |
//! | [`presets`] | The size preset catalog |
//! | [`naming`] | `{basename}.{preset}.{format}` naming contract |
//! | [`records`] | Image record listing (`ImageSource`, JSON exports) |
//! | [`cache`] | Content-hash freshness cache for verified backfills |
//! | [`config`] | `derivatives.toml` loading, merging, env overrides |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Three Formats, Fixed Order
//!
//! Every preset is written as AVIF, WebP and JPEG, in that order, so a
//! `<picture>` element can list them from smallest to most compatible. A
//! runtime without an AVIF encoder (built without the `avif` feature) still
//! writes the other two and reports nothing as an error.
//!
//! ## No Upscaling
//!
//! A preset larger than the source in either dimension is skipped. A 100×100
//! upload yields zero derivatives; the front end falls back to the original.
//!
//! ## Orientation Baked In
//!
//! EXIF orientation is applied to the pixels before any geometry is computed.
//! Derivatives carry no orientation tag and display upright everywhere.
//!
//! ## Existence Means Done
//!
//! The backfill skips an image when any of its derivatives exists. Sources
//! replaced in place are caught by `--verify-hash`, which consults the
//! [`cache`]; `--force` regenerates unconditionally.
//!
//! ## Pure-Rust Decoding
//!
//! Decoding, resampling, AVIF (rav1e) and JPEG encoding use the `image`
//! crate. Lossy WebP goes through libwebp via the `webp` crate, statically
//! built, so the binary needs no system image libraries.

pub mod backfill;
pub mod cache;
pub mod config;
pub mod derivatives;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod presets;
pub mod records;

#[cfg(test)]
pub(crate) mod test_helpers;
