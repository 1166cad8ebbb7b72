//! Batch derivative generation for images uploaded before the pipeline
//! existed.
//!
//! A run moves through four phases, each announced as a [`BackfillEvent`]:
//!
//! ```text
//! Enumerating → Processing → Reporting → Done
//! ```
//!
//! ## Per-image rules
//!
//! | Situation | Outcome | Counter |
//! |---|---|---|
//! | record has no stored path | skip | `skipped` |
//! | resolved source missing, or path escapes the uploads base | log, continue | `errors` |
//! | any derivative exists and not `force` | skip | `skipped` |
//! | same, with `verify_source_hash` and a changed source | regenerate | |
//! | no derivatives, `verify_source_hash`, cache says zero were possible | skip | `skipped` |
//! | generate succeeded (even with zero files) | | `processed`, `derivatives_created` |
//! | generate failed or panicked | log, continue | `errors` |
//! | cancelled before the image started | | `cancelled` |
//!
//! Only a failure to list the records aborts the run. Everything else is
//! isolated to its image, and stats are always returned.
//!
//! ## Concurrency
//!
//! Images run on a rayon pool, one image per worker. Counters are atomics.
//! The cancellation token is checked between images, never mid-image, so no
//! partially written derivative set is left behind by a cancel.
//!
//! Two backfills over the same property at the same time are not guarded
//! against; callers must not do that.

use crate::cache::{self, CacheEntry, FreshnessCache};
use crate::config::UploadsConfig;
use crate::derivatives::DerivativeGenerator;
use crate::imaging::ImageBackend;
use crate::records::{ImageRecord, ImageSource, RecordsError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackfillError {
    #[error("Cannot enumerate image records: {0}")]
    Enumeration(#[from] RecordsError),
    #[error("Cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillStats {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub derivatives_created: usize,
    pub cancelled: usize,
}

impl BackfillStats {
    /// Images that reached a decision (everything but `cancelled`).
    pub fn handled(&self) -> usize {
        self.processed + self.skipped + self.errors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Enumerating,
    Processing,
    Reporting,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoStoredPath,
    UpToDate,
}

/// What happened to one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImageOutcome {
    Generated { derivatives: usize },
    Skipped { reason: SkipReason },
    Failed { reason: String },
}

/// Progress events sent while a run is in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BackfillEvent {
    Phase { phase: Phase },
    Enumerated { total: usize },
    ImageFinished {
        /// 1-based position in listing order. Completion order may differ.
        index: usize,
        total: usize,
        image_id: String,
        stored_path: Option<String>,
        #[serde(flatten)]
        outcome: ImageOutcome,
    },
    Finished { stats: BackfillStats },
}

/// Cooperative cancellation shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackfillOptions {
    /// Regenerate even when derivatives exist.
    pub force: bool,
    /// Only skip when the source content matches the freshness cache.
    pub verify_source_hash: bool,
    /// Worker count for a dedicated pool. `None` runs on the global pool.
    pub threads: Option<usize>,
    pub cancel: CancelToken,
    pub progress: Option<Sender<BackfillEvent>>,
}

/// A stored path mapped onto the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Path below the uploads base, `/`-separated. Keys the freshness cache.
    pub relative: String,
    pub path: PathBuf,
}

/// Map a stored URL path onto the uploads directory.
///
/// The public prefix is stripped only at a path boundary, so `/uploads` does
/// not eat the start of `/uploads-old/...`. Paths without the prefix are
/// taken relative to the base. `None` when the path would leave the base.
pub fn resolve_path(fs_base: &Path, public_base: &str, stored: &str) -> Option<ResolvedSource> {
    let stored = stored.trim();
    let prefix = public_base.trim_end_matches('/');
    let rest = match stored.strip_prefix(prefix) {
        Some(rest) if !prefix.is_empty() && (rest.is_empty() || rest.starts_with('/')) => rest,
        _ => stored,
    };

    let mut parts = Vec::new();
    for component in Path::new(rest).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }

    let path = parts.iter().fold(fs_base.to_path_buf(), |p, part| p.join(part));
    Some(ResolvedSource {
        relative: parts.join("/"),
        path,
    })
}

#[derive(Default)]
struct StatsAccumulator {
    processed: AtomicUsize,
    skipped: AtomicUsize,
    errors: AtomicUsize,
    derivatives_created: AtomicUsize,
    cancelled: AtomicUsize,
}

impl StatsAccumulator {
    fn count(&self, outcome: &ImageOutcome) {
        match outcome {
            ImageOutcome::Generated { derivatives } => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                self.derivatives_created
                    .fetch_add(*derivatives, Ordering::Relaxed);
            }
            ImageOutcome::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            ImageOutcome::Failed { .. } => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> BackfillStats {
        BackfillStats {
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            derivatives_created: self.derivatives_created.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

fn emit(progress: &Option<Sender<BackfillEvent>>, event: BackfillEvent) {
    if let Some(tx) = progress {
        // A dropped receiver only means nobody is listening
        let _ = tx.send(event);
    }
}

fn failed(reason: impl Into<String>) -> ImageOutcome {
    ImageOutcome::Failed {
        reason: reason.into(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Freshness state for a verified run.
struct Freshness {
    cache: Mutex<FreshnessCache>,
    catalog_hash: String,
}

/// Batch driver over an [`ImageSource`].
pub struct Backfill<'a, B: ImageBackend> {
    generator: &'a DerivativeGenerator<B>,
    uploads: &'a UploadsConfig,
}

impl<'a, B: ImageBackend> Backfill<'a, B> {
    pub fn new(generator: &'a DerivativeGenerator<B>, uploads: &'a UploadsConfig) -> Self {
        Self { generator, uploads }
    }

    /// Run over every record of `property`, or of all properties.
    pub fn run(
        &self,
        source: &impl ImageSource,
        property: Option<&str>,
        options: &BackfillOptions,
    ) -> Result<BackfillStats, BackfillError> {
        emit(&options.progress, BackfillEvent::Phase { phase: Phase::Enumerating });
        let records = source.list(property)?;
        let total = records.len();
        tracing::info!(total, property = property.unwrap_or("all"), "backfill enumerated records");
        emit(&options.progress, BackfillEvent::Enumerated { total });

        let freshness = options.verify_source_hash.then(|| Freshness {
            cache: Mutex::new(FreshnessCache::load(&self.uploads.fs_base)),
            catalog_hash: cache::catalog_hash(self.generator.config()),
        });

        emit(&options.progress, BackfillEvent::Phase { phase: Phase::Processing });
        let stats = StatsAccumulator::default();
        let work = || {
            records.par_iter().enumerate().for_each(|(i, record)| {
                self.run_one(i + 1, total, record, options, freshness.as_ref(), &stats);
            });
        };
        match options.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads.max(1))
                .build()?
                .install(work),
            None => work(),
        }

        emit(&options.progress, BackfillEvent::Phase { phase: Phase::Reporting });
        if let Some(freshness) = freshness {
            let cache = freshness
                .cache
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(e) = cache.save(&self.uploads.fs_base) {
                tracing::warn!(error = %e, "failed to save freshness cache");
            }
        }
        let stats = stats.snapshot();
        tracing::info!(
            processed = stats.processed,
            skipped = stats.skipped,
            errors = stats.errors,
            derivatives_created = stats.derivatives_created,
            cancelled = stats.cancelled,
            "backfill finished"
        );
        emit(&options.progress, BackfillEvent::Finished { stats });
        emit(&options.progress, BackfillEvent::Phase { phase: Phase::Done });
        Ok(stats)
    }

    fn run_one(
        &self,
        index: usize,
        total: usize,
        record: &ImageRecord,
        options: &BackfillOptions,
        freshness: Option<&Freshness>,
        stats: &StatsAccumulator,
    ) {
        if options.cancel.is_cancelled() {
            stats.cancelled.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.process_record(record, options.force, freshness)
        }))
        .unwrap_or_else(|payload| {
            let reason = format!("panicked: {}", panic_message(payload.as_ref()));
            tracing::error!(
                image_id = %record.id,
                stored_path = record.stored_path().unwrap_or(""),
                reason = %reason,
                "image processing panicked"
            );
            failed(reason)
        });

        stats.count(&outcome);
        emit(
            &options.progress,
            BackfillEvent::ImageFinished {
                index,
                total,
                image_id: record.id.to_string(),
                stored_path: record.stored_path().map(str::to_string),
                outcome,
            },
        );
    }

    fn process_record(
        &self,
        record: &ImageRecord,
        force: bool,
        freshness: Option<&Freshness>,
    ) -> ImageOutcome {
        let Some(stored) = record.stored_path() else {
            tracing::debug!(image_id = %record.id, "record has no stored path");
            return ImageOutcome::Skipped {
                reason: SkipReason::NoStoredPath,
            };
        };

        let Some(resolved) =
            resolve_path(&self.uploads.fs_base, &self.uploads.public_base, stored)
        else {
            tracing::warn!(image_id = %record.id, stored_path = stored, "stored path escapes uploads base");
            return failed("path escapes uploads base");
        };
        let source_path = resolved.path.as_path();
        if !source_path.is_file() {
            tracing::warn!(
                image_id = %record.id,
                stored_path = stored,
                resolved = %source_path.display(),
                "source file not found"
            );
            return failed(format!("source file not found: {}", source_path.display()));
        }

        let mut source_hash = None;
        if !force {
            let exists = self.generator.any_exist(source_path, stored);
            match freshness {
                None if exists => {
                    return ImageOutcome::Skipped {
                        reason: SkipReason::UpToDate,
                    };
                }
                None => {}
                Some(freshness) => {
                    let hash = match cache::hash_file(source_path) {
                        Ok(h) => h,
                        Err(e) => return failed(format!("cannot hash source: {e}")),
                    };
                    let recorded = freshness.cache.lock().ok().and_then(|c| {
                        c.fresh_entry(&resolved.relative, &hash, &freshness.catalog_hash)
                            .map(|e| e.derivatives)
                    });
                    match recorded {
                        // Smaller than every preset last time: nothing on disk to find
                        Some(0) => {
                            return ImageOutcome::Skipped {
                                reason: SkipReason::UpToDate,
                            };
                        }
                        Some(_) if exists => {
                            return ImageOutcome::Skipped {
                                reason: SkipReason::UpToDate,
                            };
                        }
                        _ => {}
                    }
                    if exists {
                        tracing::info!(image_id = %record.id, source = %source_path.display(), "source changed since last run, regenerating");
                    }
                    source_hash = Some(hash);
                }
            }
        }

        let output_dir = source_path.parent().unwrap_or(Path::new("."));
        match self.generator.generate(source_path, stored, output_dir) {
            Ok(files) => {
                tracing::info!(
                    image_id = %record.id,
                    source = %source_path.display(),
                    derivatives = files.len(),
                    "generated derivatives"
                );
                if let Some(freshness) = freshness {
                    let hash = source_hash.map(Ok).unwrap_or_else(|| cache::hash_file(source_path));
                    match (hash, freshness.cache.lock()) {
                        (Ok(hash), Ok(mut cache)) => cache.record(
                            resolved.relative.clone(),
                            CacheEntry {
                                source_hash: hash,
                                catalog_hash: freshness.catalog_hash.clone(),
                                derivatives: files.len(),
                            },
                        ),
                        (Err(e), _) => {
                            tracing::warn!(source = %source_path.display(), error = %e, "cannot hash source for freshness cache")
                        }
                        (_, Err(_)) => {}
                    }
                }
                ImageOutcome::Generated {
                    derivatives: files.len(),
                }
            }
            Err(e) => {
                tracing::error!(
                    image_id = %record.id,
                    stored_path = stored,
                    resolved = %source_path.display(),
                    error = %e,
                    "derivative generation failed"
                );
                failed(e.to_string())
            }
        }
    }
}
