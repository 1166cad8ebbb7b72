//! Parameter types for encoding.
//!
//! These describe *what* to write, not *how*. The
//! [`derivatives`](crate::derivatives) module decides which outputs to
//! create, and the [`backend`](super::backend) does the pixel work.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1 to 100). Clamped on construction.
//! - [`Format`]: the three delivery codecs, in client preference order.
//! - [`QualityPolicy`]: fixed quality per format (AVIF 55, WebP 80, JPEG 85).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Output codec of a derivative.
///
/// Declaration order is encode order, which is also the order the front end
/// probes `<source>` elements in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Avif,
    Webp,
    Jpeg,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Avif, Format::Webp, Format::Jpeg];

    /// Lowercase file extension, part of the naming contract.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Avif => "avif",
            Format::Webp => "webp",
            Format::Jpeg => "jpeg",
        }
    }

    /// Whether the codec can store an alpha channel.
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Format::Jpeg)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Per-format quality, fixed for the whole pipeline.
///
/// Values sit at the point where each codec is visually near-lossless for
/// photographs. They are not adjustable per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityPolicy {
    pub avif: Quality,
    pub webp: Quality,
    pub jpeg: Quality,
}

impl QualityPolicy {
    pub fn for_format(&self, format: Format) -> Quality {
        match format {
            Format::Avif => self.avif,
            Format::Webp => self.webp,
            Format::Jpeg => self.jpeg,
        }
    }
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            avif: Quality::new(55),
            webp: Quality::new(80),
            jpeg: Quality::new(85),
        }
    }
}
