//! Clip request validation.
//!
//! Turns the raw client payload into a [`JobDescriptor`]. Everything that
//! later becomes an argument of an external tool is checked here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::host_alias::HostAliases;
use crate::job::{ClipRange, JobDescriptor, JobId};
use crate::job_status::ErrorKind;
use crate::timestamp::range_is_ordered;

/// Longest accepted offset string.
pub const MAX_OFFSET_LEN: usize = 32;

/// Longest accepted source URL.
pub const MAX_URL_LEN: usize = 2048;

/// Raw `POST /clip` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequest {
    #[serde(default)]
    pub tweet_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Request validation failure. Always maps to [`ErrorKind::InvalidInput`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required fields")]
    MissingUrl,

    #[error("Source URL is not a valid http(s) URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid {field} offset: {reason}")]
    InvalidOffset { field: &'static str, reason: String },

    #[error("End offset must be after start offset")]
    InvertedRange,
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

/// Inputs that shape a descriptor beyond the request itself.
#[derive(Debug, Clone)]
pub struct DescriptorPolicy {
    pub download_dir: PathBuf,
    pub extension: String,
    pub host_aliases: HostAliases,
}

impl Default for DescriptorPolicy {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("download"),
            extension: "mp4".to_string(),
            host_aliases: HostAliases::default(),
        }
    }
}

impl ClipRequest {
    pub fn new(tweet_url: impl Into<String>) -> Self {
        Self {
            tweet_url: tweet_url.into(),
            start: None,
            end: None,
        }
    }

    pub fn with_range(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start = start.map(str::to_string);
        self.end = end.map(str::to_string);
        self
    }

    /// Validate and produce a descriptor with a fresh id.
    pub fn into_descriptor(self, policy: &DescriptorPolicy) -> Result<JobDescriptor, ValidationError> {
        self.into_descriptor_with_id(JobId::new(), policy)
    }

    /// Validate and produce a descriptor for the given id.
    pub fn into_descriptor_with_id(
        self,
        id: JobId,
        policy: &DescriptorPolicy,
    ) -> Result<JobDescriptor, ValidationError> {
        let source_url = normalize_source_url(&self.tweet_url, &policy.host_aliases)?;

        let start = validate_offset("start", self.start)?;
        let end = validate_offset("end", self.end)?;
        if let (Some(s), Some(e)) = (&start, &end) {
            if range_is_ordered(s, e) == Some(false) {
                return Err(ValidationError::InvertedRange);
            }
        }

        Ok(JobDescriptor::new(
            id,
            source_url,
            ClipRange::new(start, end),
            &policy.download_dir,
            &policy.extension,
        ))
    }
}

/// Trim, parse and alias-normalize a source URL.
pub fn normalize_source_url(raw: &str, aliases: &HostAliases) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingUrl);
    }
    if raw.len() > MAX_URL_LEN {
        return Err(ValidationError::InvalidUrl("URL is too long".to_string()));
    }
    if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::InvalidUrl("URL contains whitespace or control characters".to_string()));
    }

    let mut url = Url::parse(raw).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ValidationError::InvalidUrl(format!("unsupported URL '{}'", raw)));
    }

    if let Some((alias, canonical)) = aliases.rewrite(&mut url) {
        info!(alias = %alias, canonical = %canonical, "Rewrote source host alias");
    }

    Ok(url.to_string())
}

/// Empty offsets mean "absent"; present ones must be plain clock text.
fn validate_offset(field: &'static str, value: Option<String>) -> Result<Option<String>, ValidationError> {
    let value = match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(None),
    };

    let invalid = |reason: &str| ValidationError::InvalidOffset {
        field,
        reason: reason.to_string(),
    };

    if value.len() > MAX_OFFSET_LEN {
        return Err(invalid("too long"));
    }
    if value.starts_with('-') {
        return Err(invalid("must not start with '-'"));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '.') {
        return Err(invalid("only digits, letters, ':' and '.' are allowed"));
    }

    Ok(Some(value))
}
