//! Centralized filename handling for the derivative naming convention.
//!
//! Every derivative lives next to its source and is named
//! `{basename}.{preset}.{format}`, where `basename` is the source filename
//! without its final extension:
//!
//! - `livingroom.jpg` → `livingroom.hero_1920x1080.avif`
//! - `prop_12_1700000000_ab12cd34.png` → `prop_12_1700000000_ab12cd34.thumb_160x128.jpeg`
//! - `house.front.jpg` → `house.front.card_640x360.webp`
//!
//! The front end builds `srcset` URLs from the same pattern, so this module
//! is the single place that spells it.

use crate::imaging::Format;

/// Source filename without directory and without its final extension.
///
/// Only the last extension is removed, so dots inside the name survive:
/// - `"livingroom.jpg"` → `"livingroom"`
/// - `"uploads/12/house.front.JPG"` → `"house.front"`
/// - `"noext"` → `"noext"`
pub fn source_basename(original_filename: &str) -> &str {
    let name = original_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_filename);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    }
}

/// Filename of one derivative.
pub fn derivative_filename(basename: &str, preset: &str, format: Format) -> String {
    format!("{}.{}.{}", basename, preset, format.extension())
}

/// Result of parsing a derivative filename like `livingroom.card_640x360.webp`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDerivative<'a> {
    pub basename: &'a str,
    pub preset: &'a str,
    pub format: Format,
}

/// Split a derivative filename back into its parts.
///
/// Returns `None` for anything that does not end in `.{preset}.{format}`
/// with a known format extension. Preset names are not validated here.
pub fn parse_derivative_filename(name: &str) -> Option<ParsedDerivative<'_>> {
    let mut parts = name.rsplitn(3, '.');
    let ext = parts.next()?;
    let preset = parts.next()?;
    let basename = parts.next()?;
    let format = Format::ALL.into_iter().find(|f| f.extension() == ext)?;
    if preset.is_empty() || basename.is_empty() {
        return None;
    }
    Some(ParsedDerivative {
        basename,
        preset,
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_strips_final_extension() {
        assert_eq!(source_basename("livingroom.jpg"), "livingroom");
    }

    #[test]
    fn basename_keeps_inner_dots() {
        assert_eq!(source_basename("house.front.jpg"), "house.front");
    }

    #[test]
    fn basename_drops_directories() {
        assert_eq!(source_basename("/uploads/properties/12/kitchen.PNG"), "kitchen");
        assert_eq!(source_basename("12\\kitchen.png"), "kitchen");
    }

    #[test]
    fn basename_without_extension() {
        assert_eq!(source_basename("noext"), "noext");
    }

    #[test]
    fn basename_of_dotfile_is_whole_name() {
        assert_eq!(source_basename(".hidden"), ".hidden");
    }

    #[test]
    fn derivative_filename_matches_contract() {
        assert_eq!(
            derivative_filename("livingroom", "hero_1920x1080", Format::Avif),
            "livingroom.hero_1920x1080.avif"
        );
        assert_eq!(
            derivative_filename("photo", "thumb_160x128", Format::Jpeg),
            "photo.thumb_160x128.jpeg"
        );
    }

    #[test]
    fn parse_derivative_round_trip() {
        let p = parse_derivative_filename("house.front.card_640x360.webp").unwrap();
        assert_eq!(p.basename, "house.front");
        assert_eq!(p.preset, "card_640x360");
        assert_eq!(p.format, Format::Webp);
    }

    #[test]
    fn parse_rejects_unknown_extension() {
        assert!(parse_derivative_filename("photo.card_640x360.png").is_none());
        assert!(parse_derivative_filename("photo.jpg").is_none());
        assert!(parse_derivative_filename("photo.jpeg").is_none());
    }
}
