//! Responsive derivative generation.
//!
//! Takes one uploaded property photo and writes every preset × format
//! variant next to it. The same [`DerivativeGenerator::generate`] call serves
//! both upload-time processing and the [`backfill`](crate::backfill).
//!
//! ## Pipeline per image
//!
//! ```text
//! decode → orient → for each preset: (skip if upscale) → crop/fit → resample
//!                                    → for each format: encode → DerivativeFile
//! ```
//!
//! ## Output
//!
//! ```text
//! uploads/properties/12/
//! ├── livingroom.jpg                         # source
//! ├── livingroom.hero_1920x1080.avif
//! ├── livingroom.hero_1920x1080.webp
//! ├── livingroom.hero_1920x1080.jpeg
//! ├── livingroom.hero_1280x720.{avif,webp,jpeg}
//! ├── livingroom.card_640x360.{avif,webp,jpeg}
//! └── livingroom.thumb_160x128.{avif,webp,jpeg}
//! ```
//!
//! ## Failure scope
//!
//! - Source missing or undecodable, or output directory unwritable: the
//!   whole call fails. A write error from the encoder (permissions, full
//!   disk) counts as an unwritable directory.
//! - A preset that would need upscaling: skipped silently.
//! - One format failing (or not compiled in): logged, the other formats and
//!   presets still run.

use crate::imaging::geometry::{self, needs_upscale};
use crate::imaging::{
    BackendError, Dimensions, Format, ImageBackend, QualityPolicy, RustBackend,
};
use crate::naming;
use crate::presets::{CATALOG, SizePreset};
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DerivativeError {
    #[error("Source image unreadable: {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },
    #[error("Output directory not writable: {path}: {reason}")]
    DirectoryUnwritable { path: PathBuf, reason: String },
    #[error("Image backend error: {0}")]
    Backend(BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for DerivativeError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::SourceUnreadable { path, reason } => {
                DerivativeError::SourceUnreadable { path, reason }
            }
            BackendError::Io(io) => DerivativeError::Io(io),
            other @ (BackendError::FormatUnsupported(_) | BackendError::EncodeFailed { .. }) => {
                DerivativeError::Backend(other)
            }
        }
    }
}

/// One file written by [`DerivativeGenerator::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeFile {
    pub preset: String,
    pub format: Format,
    pub path: PathBuf,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
}

/// Presets and quality policy a generator runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub presets: Vec<SizePreset>,
    pub quality: QualityPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            presets: CATALOG.to_vec(),
            quality: QualityPolicy::default(),
        }
    }
}

/// A derivative found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingDerivative {
    pub format: Format,
    pub path: PathBuf,
    pub filename: String,
    pub byte_size: u64,
}

/// Existing derivatives of one preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetFiles {
    pub preset: String,
    pub files: Vec<ExistingDerivative>,
}

/// What is on disk for an image, grouped by preset in catalog order.
/// Presets with no files are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivativeInventory {
    pub presets: Vec<PresetFiles>,
}

impl DerivativeInventory {
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.presets.iter().map(|p| p.files.len()).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.presets
            .iter()
            .flat_map(|p| &p.files)
            .map(|f| f.byte_size)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of [`DerivativeGenerator::remove`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub deleted: Vec<PathBuf>,
    pub errors: Vec<RemovalFailure>,
}

/// Stateless service producing derivatives with a given backend and config.
pub struct DerivativeGenerator<B: ImageBackend = RustBackend> {
    backend: B,
    config: GeneratorConfig,
}

impl DerivativeGenerator<RustBackend> {
    /// Production generator: built-in catalog, default quality policy.
    pub fn standard() -> Self {
        Self::new(RustBackend::new())
    }
}

impl<B: ImageBackend> DerivativeGenerator<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, GeneratorConfig::default())
    }

    pub fn with_config(backend: B, config: GeneratorConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Source dimensions as stored, without decoding pixels.
    pub fn identify(&self, source_path: &Path) -> Result<Dimensions, DerivativeError> {
        Ok(self.backend.identify(source_path)?)
    }

    /// Generate every derivative of `source_path` into `output_dir`.
    ///
    /// `original_filename` supplies the basename used in derivative names
    /// (upload temp files have meaningless names). Returns the files actually
    /// written; an empty list (source too small, every encode failed) is not
    /// an error.
    pub fn generate(
        &self,
        source_path: &Path,
        original_filename: &str,
        output_dir: &Path,
    ) -> Result<Vec<DerivativeFile>, DerivativeError> {
        if !source_path.is_file() {
            return Err(DerivativeError::SourceUnreadable {
                path: source_path.to_path_buf(),
                reason: "file not found".into(),
            });
        }

        let source = self.backend.load(source_path)?;
        if source.orientation.exif_value() != 1 {
            tracing::debug!(
                source = %source_path.display(),
                orientation = source.orientation.exif_value(),
                "correcting orientation"
            );
        }
        let upright = source.into_upright();
        let dims = upright.dimensions();

        prepare_output_dir(output_dir)?;

        let formats: Vec<Format> = Format::ALL
            .into_iter()
            .filter(|&f| {
                let supported = self.backend.supports(f);
                if !supported {
                    tracing::info!(format = %f, "format unsupported by this runtime, skipping");
                }
                supported
            })
            .collect();

        let basename = naming::source_basename(original_filename);
        let mut created = Vec::new();

        for preset in &self.config.presets {
            if needs_upscale(dims, preset.target()) {
                tracing::debug!(
                    preset = preset.name,
                    width = dims.0,
                    height = dims.1,
                    "source smaller than preset, skipping"
                );
                continue;
            }
            let Some(placement) = geometry::plan(dims, preset.target(), preset.policy) else {
                continue;
            };
            let resized = self.backend.resample(&upright, &placement);

            for &format in &formats {
                let filename = naming::derivative_filename(basename, preset.name, format);
                let path = output_dir.join(&filename);
                let quality = self.config.quality.for_format(format);

                match self.backend.encode(&resized, format, quality, &path) {
                    Ok(()) => {
                        let byte_size = fs::metadata(&path)?.len();
                        created.push(DerivativeFile {
                            preset: preset.name.to_string(),
                            format,
                            path,
                            filename,
                            width: placement.output_width,
                            height: placement.output_height,
                            byte_size,
                        });
                    }
                    // Writes failing means the directory is unusable for every
                    // remaining file, not just this format
                    Err(BackendError::Io(e)) => {
                        tracing::error!(
                            dir = %output_dir.display(),
                            path = %path.display(),
                            error = %e,
                            "cannot write derivative"
                        );
                        return Err(unwritable(output_dir, e));
                    }
                    Err(e) => {
                        tracing::warn!(
                            preset = preset.name,
                            format = %format,
                            path = %path.display(),
                            error = %e,
                            "derivative encode failed"
                        );
                    }
                }
            }
        }

        Ok(created)
    }

    /// Every path a full set of derivatives would occupy, preset-major.
    pub fn expected_paths(&self, source_path: &Path, original_filename: &str) -> Vec<PathBuf> {
        let dir = source_dir(source_path);
        let basename = naming::source_basename(original_filename);
        self.config
            .presets
            .iter()
            .flat_map(|preset| {
                Format::ALL.into_iter().map(move |format| {
                    dir.join(naming::derivative_filename(basename, preset.name, format))
                })
            })
            .collect()
    }

    /// Whether at least one expected derivative exists.
    pub fn any_exist(&self, source_path: &Path, original_filename: &str) -> bool {
        self.expected_paths(source_path, original_filename)
            .iter()
            .any(|p| p.is_file())
    }

    /// Derivatives currently on disk for an image.
    pub fn existing(&self, source_path: &Path, original_filename: &str) -> DerivativeInventory {
        let dir = source_dir(source_path);
        let basename = naming::source_basename(original_filename);
        let presets = self
            .config
            .presets
            .iter()
            .filter_map(|preset| {
                let files: Vec<ExistingDerivative> = Format::ALL
                    .into_iter()
                    .filter_map(|format| {
                        let filename = naming::derivative_filename(basename, preset.name, format);
                        let path = dir.join(&filename);
                        let meta = fs::metadata(&path).ok().filter(|m| m.is_file())?;
                        Some(ExistingDerivative {
                            format,
                            path,
                            filename,
                            byte_size: meta.len(),
                        })
                    })
                    .collect();
                (!files.is_empty()).then(|| PresetFiles {
                    preset: preset.name.to_string(),
                    files,
                })
            })
            .collect();
        DerivativeInventory { presets }
    }

    /// Delete every existing derivative of an image. The source is untouched.
    pub fn remove(&self, source_path: &Path, original_filename: &str) -> RemovalReport {
        let mut report = RemovalReport::default();
        for path in self.expected_paths(source_path, original_filename) {
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => report.deleted.push(path),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to delete derivative");
                    report.errors.push(RemovalFailure {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

/// Derivatives live next to their source.
fn source_dir(source_path: &Path) -> &Path {
    source_path.parent().unwrap_or(Path::new("."))
}

fn unwritable(path: &Path, reason: impl ToString) -> DerivativeError {
    DerivativeError::DirectoryUnwritable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Create the output directory if needed and make sure it can take files.
///
/// Mode bits alone do not say whether this process may write (ownership,
/// ACLs, read-only mounts), so a marker file is created and removed.
fn prepare_output_dir(dir: &Path) -> Result<(), DerivativeError> {
    if !dir.is_dir() {
        fs::create_dir_all(dir).map_err(|e| unwritable(dir, e))?;
        inherit_parent_permissions(dir);
    }
    let meta = fs::metadata(dir).map_err(|e| unwritable(dir, e))?;
    if meta.permissions().readonly() {
        return Err(unwritable(dir, "directory is read-only"));
    }

    let marker = dir.join(format!(".derivatives-write-check-{}", std::process::id()));
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&marker)
        .map_err(|e| unwritable(dir, e))?;
    if let Err(e) = fs::remove_file(&marker) {
        tracing::debug!(path = %marker.display(), error = %e, "could not remove write check marker");
    }
    Ok(())
}

#[cfg(unix)]
fn inherit_parent_permissions(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(parent) = dir.parent()
        && let Ok(meta) = fs::metadata(parent)
    {
        let mode = meta.permissions().mode() & 0o7777;
        if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(mode)) {
            tracing::debug!(dir = %dir.display(), error = %e, "could not copy parent permissions");
        }
    }
}

#[cfg(not(unix))]
fn inherit_parent_permissions(_dir: &Path) {}
