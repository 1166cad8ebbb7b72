//! CLI output formatting for every subcommand.
//!
//! # Information-First Display
//!
//! Each image leads with its listing position and record id. The stored path
//! and the per-image outcome follow as indented context lines, so a backfill
//! log reads as an inventory of what happened to which record.
//!
//! # Output Format
//!
//! ## Backfill
//!
//! ```text
//! Found 3 images
//! 001 #41 (livingroom.jpg)
//!     Source: /uploads/properties/12/livingroom.jpg
//!     Created 12 derivatives
//! 002 #42 (kitchen.jpg)
//!     Source: /uploads/properties/12/kitchen.jpg
//!     Skipped: derivatives exist (use --force to regenerate)
//! 003 #43 (gone.jpg)
//!     Source: /uploads/properties/12/gone.jpg
//!     Error: source file not found: /srv/uploads/properties/12/gone.jpg
//!
//! Summary
//!     Processed: 1
//!     Skipped: 1
//!     Errors: 1
//!     Derivatives created: 12
//! Completed with errors, see log for details
//! ```
//!
//! ## Generate / Inspect
//!
//! ```text
//! hero_1920x1080
//!     avif: photo.hero_1920x1080.avif (1920x1080, 212.4 KB)
//!     webp: photo.hero_1920x1080.webp (1920x1080, 301 KB)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability. Format functions are pure: no I/O, no side effects.
//! [`print_lines`] writes them to stdout.

use crate::backfill::{BackfillEvent, BackfillStats, ImageOutcome, Phase, SkipReason};
use crate::derivatives::{DerivativeFile, DerivativeInventory, RemovalReport};
use crate::imaging::QualityPolicy;
use crate::presets::SizePreset;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Human-readable byte count with one decimal, trailing `.0` dropped.
///
/// ```text
/// 512 → "512 B"    1536 → "1.5 KB"    1048576 → "1 MB"
/// ```
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, UNITS[unit])
    } else {
        format!("{:.1} {}", rounded, UNITS[unit])
    }
}

/// Print formatted lines to stdout.
pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Backfill
// ============================================================================

/// Format a single backfill progress event as display lines.
pub fn format_backfill_event(event: &BackfillEvent) -> Vec<String> {
    match event {
        BackfillEvent::Phase { phase } => match phase {
            Phase::Enumerating => vec!["Listing images".to_string()],
            Phase::Processing | Phase::Reporting | Phase::Done => Vec::new(),
        },
        BackfillEvent::Enumerated { total } => match total {
            0 => vec!["No images found".to_string()],
            1 => vec!["Found 1 image".to_string()],
            n => vec![format!("Found {} images", n)],
        },
        BackfillEvent::ImageFinished {
            index,
            image_id,
            stored_path,
            outcome,
            ..
        } => {
            let mut lines = Vec::new();
            match stored_path {
                Some(path) => {
                    lines.push(format!(
                        "{} #{} ({})",
                        format_index(*index),
                        image_id,
                        file_name(path)
                    ));
                    lines.push(format!("{}Source: {}", indent(1), path));
                }
                None => lines.push(format!("{} #{}", format_index(*index), image_id)),
            }
            lines.push(format!("{}{}", indent(1), outcome_line(outcome)));
            lines
        }
        BackfillEvent::Finished { stats } => {
            let mut lines = vec![String::new()];
            lines.extend(format_summary(stats));
            lines
        }
    }
}

fn outcome_line(outcome: &ImageOutcome) -> String {
    match outcome {
        ImageOutcome::Generated { derivatives: 0 } => {
            "No derivatives created (source smaller than every preset)".to_string()
        }
        ImageOutcome::Generated { derivatives: 1 } => "Created 1 derivative".to_string(),
        ImageOutcome::Generated { derivatives } => format!("Created {} derivatives", derivatives),
        ImageOutcome::Skipped {
            reason: SkipReason::NoStoredPath,
        } => "Skipped: no image path".to_string(),
        ImageOutcome::Skipped {
            reason: SkipReason::UpToDate,
        } => "Skipped: derivatives exist (use --force to regenerate)".to_string(),
        ImageOutcome::Failed { reason } => format!("Error: {}", reason),
    }
}

/// Run summary. `Cancelled` only appears when something was cancelled.
pub fn format_summary(stats: &BackfillStats) -> Vec<String> {
    let mut lines = vec![
        "Summary".to_string(),
        format!("{}Processed: {}", indent(1), stats.processed),
        format!("{}Skipped: {}", indent(1), stats.skipped),
        format!("{}Errors: {}", indent(1), stats.errors),
        format!("{}Derivatives created: {}", indent(1), stats.derivatives_created),
    ];
    if stats.cancelled > 0 {
        lines.push(format!("{}Cancelled: {}", indent(1), stats.cancelled));
    }
    lines.push(if stats.cancelled > 0 {
        "Backfill interrupted".to_string()
    } else if stats.errors > 0 {
        "Completed with errors, see log for details".to_string()
    } else {
        "Backfill complete".to_string()
    });
    lines
}

// ============================================================================
// Generate / inspect / clean
// ============================================================================

/// Files written by one generate call, grouped under their preset.
pub fn format_generated(files: &[DerivativeFile]) -> Vec<String> {
    if files.is_empty() {
        return vec!["No derivatives created (source smaller than every preset)".to_string()];
    }
    let mut lines = Vec::new();
    let mut current: Option<&str> = None;
    for file in files {
        if current != Some(file.preset.as_str()) {
            lines.push(file.preset.clone());
            current = Some(file.preset.as_str());
        }
        lines.push(format!(
            "{}{}: {} ({}x{}, {})",
            indent(1),
            file.format,
            file.filename,
            file.width,
            file.height,
            format_file_size(file.byte_size)
        ));
    }
    lines.push(format!("Created {} derivatives", files.len()));
    lines
}

/// Derivatives found on disk, grouped by preset.
pub fn format_inventory(inventory: &DerivativeInventory) -> Vec<String> {
    if inventory.is_empty() {
        return vec!["No derivatives found".to_string()];
    }
    let mut lines = Vec::new();
    for preset in &inventory.presets {
        lines.push(preset.preset.clone());
        for file in &preset.files {
            lines.push(format!(
                "{}{}: {} ({})",
                indent(1),
                file.format,
                file.filename,
                format_file_size(file.byte_size)
            ));
        }
    }
    lines.push(format!(
        "{} files, {}",
        inventory.file_count(),
        format_file_size(inventory.total_bytes())
    ));
    lines
}

pub fn format_removal(report: &RemovalReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .deleted
        .iter()
        .map(|p| format!("Deleted {}", p.display()))
        .collect();
    for failure in &report.errors {
        lines.push(format!(
            "Failed to delete {}: {}",
            failure.path.display(),
            failure.reason
        ));
    }
    if report.deleted.is_empty() && report.errors.is_empty() {
        lines.push("No derivatives found".to_string());
    }
    lines
}

/// The preset catalog and quality policy.
pub fn format_presets(presets: &[SizePreset], quality: &QualityPolicy) -> Vec<String> {
    let mut lines = vec!["Presets".to_string()];
    for preset in presets {
        let (aw, ah) = preset.aspect();
        lines.push(format!(
            "{}{} {}x{} {}:{} {:?}",
            indent(1),
            preset.name,
            preset.width,
            preset.height,
            aw,
            ah,
            preset.policy
        ));
    }
    lines.push("Quality".to_string());
    lines.push(format!("{}avif: {}", indent(1), quality.avif.value()));
    lines.push(format!("{}webp: {}", indent(1), quality.webp.value()));
    lines.push(format!("{}jpeg: {}", indent(1), quality.jpeg.value()));
    lines
}
