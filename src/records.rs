//! Image record listing.
//!
//! The backfill does not talk to a database. It asks an [`ImageSource`] for
//! the property image records and works from those. [`JsonRecords`] reads an
//! export of the `property_images` table:
//!
//! ```json
//! [
//!   {"id": 41, "property_id": 12, "image_path": "/uploads/properties/12/a.jpg", "sort_order": 0},
//!   {"id": "42", "property_id": "12", "image_url": "/uploads/properties/12/b.jpg", "sort_order": 1}
//! ]
//! ```
//!
//! Ids may be JSON numbers or strings; exports from different drivers
//! disagree on that.

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordsError {
    #[error("Cannot read records from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid records in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Record or property identifier.
///
/// Numeric ids order numerically and before any non-numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Signed(i64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self(n.to_string()),
            Raw::Signed(n) => Self(n.to_string()),
            Raw::Text(s) => Self(s),
        })
    }
}

/// One row of the property image table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: RecordId,
    pub property_id: RecordId,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
}

impl ImageRecord {
    /// `image_path`, falling back to `image_url`. Empty strings count as
    /// absent.
    pub fn stored_path(&self) -> Option<&str> {
        [&self.image_path, &self.image_url]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .find(|p| !p.trim().is_empty())
    }
}

/// Where the backfill gets its records from.
pub trait ImageSource {
    /// Records for one property, or all of them, ordered by property then
    /// `sort_order`.
    fn list(&self, property: Option<&str>) -> Result<Vec<ImageRecord>, RecordsError>;
}

/// Filter to one property and apply the listing order. The sort is stable,
/// so ties keep their input order.
pub fn select(mut records: Vec<ImageRecord>, property: Option<&str>) -> Vec<ImageRecord> {
    if let Some(property) = property {
        records.retain(|r| r.property_id.as_str() == property);
    }
    records.sort_by(|a, b| {
        a.property_id
            .cmp(&b.property_id)
            .then(a.sort_order.cmp(&b.sort_order))
    });
    records
}

impl ImageSource for Vec<ImageRecord> {
    fn list(&self, property: Option<&str>) -> Result<Vec<ImageRecord>, RecordsError> {
        Ok(select(self.clone(), property))
    }
}

/// Records read from a JSON array on disk. The file is read on every
/// [`list`](ImageSource::list) call.
#[derive(Debug, Clone)]
pub struct JsonRecords {
    path: PathBuf,
}

impl JsonRecords {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ImageSource for JsonRecords {
    fn list(&self, property: Option<&str>) -> Result<Vec<ImageRecord>, RecordsError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| RecordsError::Io {
            path: self.path.clone(),
            source,
        })?;
        let records: Vec<ImageRecord> =
            serde_json::from_str(&content).map_err(|source| RecordsError::Json {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(path = %self.path.display(), count = records.len(), "loaded image records");
        Ok(select(records, property))
    }
}
