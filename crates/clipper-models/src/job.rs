//! Job identity and the immutable clip job descriptor.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a clip job.
///
/// Formatted as `<unix-millis>-<8 hex chars>` so ids sort roughly by
/// submission time and are always safe to embed in a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new job id from the current time and a random suffix.
    pub fn new() -> Self {
        let millis = Utc::now().timestamp_millis();
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", millis, &random[..8]))
    }

    /// Create from an existing string (e.g. a path parameter).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested sub-range of the source video.
///
/// Offsets are kept in the form the client sent them; the trim tool owns
/// their exact syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl ClipRange {
    pub fn new(start: Option<String>, end: Option<String>) -> Self {
        Self { start, end }
    }

    /// The whole source, no trimming.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl fmt::Display for ClipRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start.as_deref().unwrap_or("start");
        let end = self.end.as_deref().unwrap_or("end");
        write!(f, "{}..{}", start, end)
    }
}

/// Immutable record of one clip request.
///
/// Built once by request validation and then handed to exactly one job
/// runner. Paths are derived from the id so concurrent jobs never share a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    id: JobId,
    source_url: String,
    range: ClipRange,
    download_path: PathBuf,
    output_path: PathBuf,
    created_at: DateTime<Utc>,
}

impl JobDescriptor {
    /// Build a descriptor with paths derived from `id` inside `dir`.
    pub fn new(
        id: JobId,
        source_url: impl Into<String>,
        range: ClipRange,
        dir: impl AsRef<Path>,
        extension: &str,
    ) -> Self {
        let dir = dir.as_ref();
        let download_path = dir.join(format!("{}.{}", id, extension));
        let output_path = dir.join(output_file_name(&id, extension));
        Self {
            id,
            source_url: source_url.into(),
            range,
            download_path,
            output_path,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Normalized source URL handed to the fetch tool.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn range(&self) -> &ClipRange {
        &self.range
    }

    /// Where the fetch tool writes the full source video.
    pub fn download_path(&self) -> &Path {
        &self.download_path
    }

    /// Where the trim tool writes the clip.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Prefix of every trimmed clip's file name.
pub const OUTPUT_FILE_PREFIX: &str = "clipped_";

/// File name of the trimmed artifact for a job.
pub fn output_file_name(id: &JobId, extension: &str) -> String {
    format!("{}{}.{}", OUTPUT_FILE_PREFIX, id, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_file_name_safe() {
        let id = JobId::new();
        let (millis, suffix) = id.as_str().split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_descriptor_paths() {
        let id = JobId::from_string("1700000000000-deadbeef");
        let job = JobDescriptor::new(id, "https://twitter.com/a/status/1", ClipRange::full(), "download", "mp4");

        assert_eq!(job.download_path(), Path::new("download/1700000000000-deadbeef.mp4"));
        assert_eq!(job.output_path(), Path::new("download/clipped_1700000000000-deadbeef.mp4"));
        assert!(job.range().is_full());
    }

    #[test]
    fn test_range_display() {
        let range = ClipRange::new(Some("00:00:05".into()), None);
        assert_eq!(range.to_string(), "00:00:05..end");
    }
}
