//! Result publication and artifact retention.
//!
//! A clip becomes downloadable only after [`ResultPublisher::publish`] has
//! registered it. Downloads hold an [`ArtifactLease`] for as long as the
//! response body is alive; sweeping skips leased artifacts, and removal from
//! the registry happens under the write lock, so a lease can never be handed
//! out for a file that is about to be deleted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use clipper_models::{DownloadLocator, JobId, JobResult, JobStatus, OUTPUT_FILE_PREFIX};

use crate::error::{PublishError, PublishResult};
use crate::metrics;

#[derive(Debug)]
struct Artifact {
    job_id: JobId,
    path: PathBuf,
    published_at: Instant,
    leases: Arc<AtomicUsize>,
}

/// Outcome of one retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Published clips removed after their TTL
    pub expired: usize,
    /// Expired clips kept because a download was in progress
    pub leased: usize,
    /// Unpublished leftovers (sources, failed outputs) removed
    pub orphans: usize,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.expired + self.orphans
    }
}

/// Registry of downloadable clips.
#[derive(Debug)]
pub struct ResultPublisher {
    dir: PathBuf,
    ttl: Duration,
    artifacts: RwLock<HashMap<String, Artifact>>,
}

impl ResultPublisher {
    pub fn new(dir: impl AsRef<Path>, ttl: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ttl,
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register the output of a succeeded job and return its locator.
    ///
    /// Publishing the same result twice returns the same locator.
    pub async fn publish(&self, result: &JobResult) -> PublishResult<DownloadLocator> {
        let path = match (result.status, result.output_path.as_ref()) {
            (JobStatus::Succeeded, Some(path)) => path.clone(),
            _ => return Err(PublishError::NotSucceeded(result.job_id.clone())),
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| PublishError::NotFound(path.display().to_string()))?;

        match fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(PublishError::NotFound(file_name)),
            Err(e) => return Err(PublishError::Io(e)),
        }

        let mut artifacts = self.artifacts.write().await;
        artifacts.entry(file_name.clone()).or_insert_with(|| Artifact {
            job_id: result.job_id.clone(),
            path,
            published_at: Instant::now(),
            leases: Arc::new(AtomicUsize::new(0)),
        });
        metrics::set_published(artifacts.len());

        info!(job_id = %result.job_id, file = %file_name, "Published clip");
        Ok(DownloadLocator::for_file(file_name))
    }

    /// Take a lease on a published clip for serving.
    pub async fn open(&self, file_name: &str) -> PublishResult<ArtifactLease> {
        if !is_plain_file_name(file_name) {
            return Err(PublishError::NotFound(file_name.to_string()));
        }

        let lease = {
            let artifacts = self.artifacts.read().await;
            let artifact = artifacts
                .get(file_name)
                .ok_or_else(|| PublishError::NotFound(file_name.to_string()))?;
            artifact.leases.fetch_add(1, Ordering::SeqCst);
            ArtifactLease {
                file_name: file_name.to_string(),
                job_id: artifact.job_id.clone(),
                path: artifact.path.clone(),
                leases: Arc::clone(&artifact.leases),
            }
        };

        if fs::metadata(&lease.path).await.is_err() {
            warn!(file = %file_name, "Published clip missing on disk");
            return Err(PublishError::NotFound(file_name.to_string()));
        }
        Ok(lease)
    }

    /// Re-register clips left in the download directory by a previous run.
    ///
    /// A `clipped_*` file counts only if it is non-empty, younger than the
    /// TTL, and its source download is gone: the runner removes the source
    /// after a successful publish and keeps it on failure.
    pub async fn restore(&self) -> usize {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to scan {}: {}", self.dir.display(), e);
                }
                return 0;
            }
        };

        let mut found = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(source_name) = name.strip_prefix(OUTPUT_FILE_PREFIX) else { continue };
            if !is_plain_file_name(source_name) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else { continue };
            if !meta.is_file() || meta.len() == 0 {
                continue;
            }
            let age = file_age(&meta);
            if age >= self.ttl {
                continue;
            }
            if fs::try_exists(self.dir.join(source_name)).await.unwrap_or(true) {
                debug!(file = %name, "Skipping clip of an unfinished job");
                continue;
            }

            let job_id = Path::new(source_name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| source_name.to_string());
            found.push((
                name,
                Artifact {
                    job_id: JobId::from_string(job_id),
                    path: entry.path(),
                    published_at: Instant::now().checked_sub(age).unwrap_or_else(Instant::now),
                    leases: Arc::new(AtomicUsize::new(0)),
                },
            ));
        }

        let mut artifacts = self.artifacts.write().await;
        let mut restored = 0;
        for (name, artifact) in found {
            if !artifacts.contains_key(&name) {
                artifacts.insert(name, artifact);
                restored += 1;
            }
        }
        metrics::set_published(artifacts.len());
        if restored > 0 {
            info!("Restored {} published clips from {}", restored, self.dir.display());
        }
        restored
    }

    /// Number of currently published clips.
    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove expired clips and stale leftovers from the download directory.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let expired: Vec<(String, PathBuf)> = {
            let mut artifacts = self.artifacts.write().await;
            let mut expired = Vec::new();
            artifacts.retain(|name, artifact| {
                if artifact.published_at.elapsed() < self.ttl {
                    return true;
                }
                if artifact.leases.load(Ordering::SeqCst) > 0 {
                    report.leased += 1;
                    return true;
                }
                expired.push((name.clone(), artifact.path.clone()));
                false
            });
            metrics::set_published(artifacts.len());
            expired
        };

        for (name, path) in expired {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(file = %name, "Removed expired clip");
                    report.expired += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.expired += 1,
                Err(e) => warn!(file = %name, "Failed to remove expired clip: {}", e),
            }
        }

        report.orphans = self.sweep_orphans().await;
        metrics::record_swept(report.removed());
        report
    }

    /// Delete unpublished regular files older than the TTL.
    async fn sweep_orphans(&self) -> usize {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to scan {}: {}", self.dir.display(), e);
                }
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(meta) = entry.metadata().await else { continue };
            if !meta.is_file() || self.artifacts.read().await.contains_key(&name) {
                continue;
            }
            if file_age(&meta) < self.ttl {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!(file = %name, "Removed unpublished leftover");
                    removed += 1;
                }
                Err(e) => warn!(file = %name, "Failed to remove leftover: {}", e),
            }
        }
        removed
    }
}

/// A download in progress. Keeps the clip from being swept until dropped.
#[derive(Debug)]
pub struct ArtifactLease {
    file_name: String,
    job_id: JobId,
    path: PathBuf,
    leases: Arc<AtomicUsize>,
}

impl ArtifactLease {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        self.leases.fetch_sub(1, Ordering::SeqCst);
    }
}

fn file_age(meta: &std::fs::Metadata) -> Duration {
    meta.modified()
        .ok()
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .unwrap_or_default()
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipper_models::{JobError, ErrorKind};
    use tempfile::TempDir;

    async fn succeeded(dir: &Path, id: &str) -> JobResult {
        let path = dir.join(format!("clipped_{}.mp4", id));
        fs::write(&path, b"clip").await.unwrap();

        let mut result = JobResult::pending(JobId::from_string(id));
        result.advance(JobStatus::Downloading).unwrap();
        result.advance(JobStatus::Trimming).unwrap();
        let locator = DownloadLocator::for_file(format!("clipped_{}.mp4", id));
        result.succeed(&path, locator).unwrap();
        result
    }

    #[tokio::test]
    async fn test_publish_and_open() {
        let dir = TempDir::new().unwrap();
        let publisher = ResultPublisher::new(dir.path(), Duration::from_secs(3600));
        let result = succeeded(dir.path(), "1-aa").await;

        let locator = publisher.publish(&result).await.unwrap();
        assert_eq!(locator.path, "/download/clipped_1-aa.mp4");
        assert_eq!(publisher.publish(&result).await.unwrap(), locator);
        assert_eq!(publisher.len().await, 1);

        let lease = publisher.open("clipped_1-aa.mp4").await.unwrap();
        assert_eq!(lease.job_id().as_str(), "1-aa");
        assert!(lease.path().ends_with("clipped_1-aa.mp4"));
    }

    #[tokio::test]
    async fn test_failed_results_are_not_published() {
        let dir = TempDir::new().unwrap();
        let publisher = ResultPublisher::new(dir.path(), Duration::from_secs(3600));

        // A partial output left by a failed trim must stay unreachable.
        fs::write(dir.path().join("clipped_2-bb.mp4"), b"partial").await.unwrap();
        let mut result = JobResult::pending(JobId::from_string("2-bb"));
        result.advance(JobStatus::Downloading).unwrap();
        result.advance(JobStatus::Trimming).unwrap();
        result.fail(JobError::new(ErrorKind::TrimFailed, "ffmpeg failed")).unwrap();

        assert!(matches!(publisher.publish(&result).await, Err(PublishError::NotSucceeded(_))));
        assert!(matches!(
            publisher.open("clipped_2-bb.mp4").await,
            Err(PublishError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_names_rejected() {
        let dir = TempDir::new().unwrap();
        let publisher = ResultPublisher::new(dir.path(), Duration::from_secs(3600));

        for name in ["../etc/passwd", "a/b.mp4", "..", ".hidden", ""] {
            assert!(matches!(publisher.open(name).await, Err(PublishError::NotFound(_))));
        }
    }

    #[tokio::test]
    async fn test_lease_blocks_sweep() {
        let dir = TempDir::new().unwrap();
        let publisher = ResultPublisher::new(dir.path(), Duration::ZERO);
        let result = succeeded(dir.path(), "3-cc").await;
        publisher.publish(&result).await.unwrap();

        let lease = publisher.open("clipped_3-cc.mp4").await.unwrap();
        let report = publisher.sweep().await;
        assert_eq!(report.leased, 1);
        assert_eq!(report.expired, 0);
        assert!(lease.path().exists());

        drop(lease);
        let report = publisher.sweep().await;
        assert_eq!(report.expired, 1);
        assert!(!dir.path().join("clipped_3-cc.mp4").exists());
        assert!(publisher.is_empty().await);
    }

    #[tokio::test]
    async fn test_fresh_artifacts_survive_sweep() {
        let dir = TempDir::new().unwrap();
        let publisher = ResultPublisher::new(dir.path(), Duration::from_secs(3600));
        let result = succeeded(dir.path(), "4-dd").await;
        publisher.publish(&result).await.unwrap();
        fs::write(dir.path().join("4-dd.mp4"), b"source").await.unwrap();

        let report = publisher.sweep().await;
        assert_eq!(report, SweepReport::default());
        assert!(dir.path().join("clipped_4-dd.mp4").exists());
        assert!(dir.path().join("4-dd.mp4").exists());
    }

    #[tokio::test]
    async fn test_restore_reregisters_finished_clips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path();
        fs::write(path.join("clipped_7-gg.mp4"), b"clip").await.unwrap();
        // Failed trim: partial output next to the kept source.
        fs::write(path.join("clipped_8-hh.mp4"), b"partial").await.unwrap();
        fs::write(path.join("8-hh.mp4"), b"source").await.unwrap();
        fs::write(path.join("clipped_9-ii.mp4"), b"").await.unwrap();
        fs::write(path.join("notes.txt"), b"x").await.unwrap();

        let publisher = ResultPublisher::new(path, Duration::from_secs(3600));
        assert_eq!(publisher.restore().await, 1);
        assert_eq!(publisher.restore().await, 0);

        let lease = publisher.open("clipped_7-gg.mp4").await.unwrap();
        assert_eq!(lease.job_id().as_str(), "7-gg");
        for name in ["clipped_8-hh.mp4", "clipped_9-ii.mp4", "8-hh.mp4", "notes.txt"] {
            assert!(matches!(publisher.open(name).await, Err(PublishError::NotFound(_))));
        }
    }

    #[tokio::test]
    async fn test_restore_skips_expired_clips() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("clipped_10-jj.mp4"), b"clip").await.unwrap();

        let publisher = ResultPublisher::new(dir.path(), Duration::ZERO);
        assert_eq!(publisher.restore().await, 0);
        assert!(publisher.is_empty().await);
        assert_eq!(publisher.sweep().await.orphans, 1);
    }

    #[tokio::test]
    async fn test_orphans_swept_after_ttl() {
        let dir = TempDir::new().unwrap();
        let publisher = ResultPublisher::new(dir.path(), Duration::ZERO);
        fs::write(dir.path().join("5-ee.mp4"), b"source").await.unwrap();
        fs::create_dir(dir.path().join("nested")).await.unwrap();

        let report = publisher.sweep().await;
        assert_eq!(report.orphans, 1);
        assert!(!dir.path().join("5-ee.mp4").exists());
        assert!(dir.path().join("nested").exists());
    }
}
