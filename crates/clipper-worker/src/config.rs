//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use clipper_media::{DEFAULT_FETCH_TOOL, DEFAULT_TRIM_TOOL};
use clipper_models::{DescriptorPolicy, HostAliases};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs (further capped by `core_limit`)
    pub max_concurrent_jobs: usize,
    /// Ceiling on worker slots; `None` uses the available cores
    pub core_limit: Option<usize>,
    /// Maximum jobs waiting for a slot before submissions are refused
    pub max_queued_jobs: usize,
    /// Shared directory for downloads and clips
    pub download_dir: PathBuf,
    /// Extension used for both the source and clip files
    pub output_extension: String,
    /// Fetch tool program
    pub fetch_program: String,
    /// Extra fetch tool arguments
    pub fetch_extra_args: Vec<String>,
    /// Trim tool program
    pub trim_program: String,
    /// Fetch stage timeout
    pub download_timeout: Duration,
    /// Trim stage timeout
    pub trim_timeout: Duration,
    /// How long published clips and finished job records are kept
    pub artifact_ttl: Duration,
    /// Interval between retention sweeps
    pub retention_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Source host aliases
    pub host_aliases: HostAliases,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            core_limit: None,
            max_queued_jobs: 64,
            download_dir: PathBuf::from("download"),
            output_extension: "mp4".to_string(),
            fetch_program: DEFAULT_FETCH_TOOL.to_string(),
            fetch_extra_args: Vec::new(),
            trim_program: DEFAULT_TRIM_TOOL.to_string(),
            download_timeout: Duration::from_secs(600),
            trim_timeout: Duration::from_secs(300),
            artifact_ttl: Duration::from_secs(3600),
            retention_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            host_aliases: HostAliases::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(
                std::env::var(key)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.as_secs()),
            )
        };

        let host_aliases = match std::env::var("CLIPPER_HOST_ALIASES") {
            Ok(list) => HostAliases::parse(&list).unwrap_or_else(|e| {
                warn!("{}, falling back to default host aliases", e);
                HostAliases::default()
            }),
            Err(_) => HostAliases::default(),
        };

        Self {
            max_concurrent_jobs: std::env::var("CLIPPER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            core_limit: std::env::var("CLIPPER_CORE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(defaults.core_limit),
            max_queued_jobs: std::env::var("CLIPPER_MAX_QUEUED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_queued_jobs),
            download_dir: std::env::var("CLIPPER_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            output_extension: std::env::var("CLIPPER_OUTPUT_EXT").unwrap_or(defaults.output_extension),
            fetch_program: std::env::var("CLIPPER_FETCH_TOOL").unwrap_or(defaults.fetch_program),
            fetch_extra_args: std::env::var("CLIPPER_FETCH_EXTRA_ARGS")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            trim_program: std::env::var("CLIPPER_TRIM_TOOL").unwrap_or(defaults.trim_program),
            download_timeout: secs("CLIPPER_DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout),
            trim_timeout: secs("CLIPPER_TRIM_TIMEOUT_SECS", defaults.trim_timeout),
            artifact_ttl: secs("CLIPPER_ARTIFACT_TTL_SECS", defaults.artifact_ttl),
            retention_interval: secs("CLIPPER_RETENTION_INTERVAL_SECS", defaults.retention_interval),
            shutdown_timeout: secs("CLIPPER_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
            host_aliases,
        }
    }

    /// Number of worker slots: the configured limit, capped by the core
    /// ceiling, never below one.
    pub fn effective_capacity(&self) -> usize {
        let cores = self.core_limit.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        self.max_concurrent_jobs.min(cores).max(1)
    }

    /// Retention TTL, never shorter than a job's worst-case runtime so files
    /// of an in-flight job are not swept.
    pub fn effective_ttl(&self) -> Duration {
        self.artifact_ttl.max(self.download_timeout + self.trim_timeout)
    }

    /// Policy used to turn requests into descriptors.
    pub fn descriptor_policy(&self) -> DescriptorPolicy {
        DescriptorPolicy {
            download_dir: self.download_dir.clone(),
            extension: self.output_extension.clone(),
            host_aliases: self.host_aliases.clone(),
        }
    }
}
