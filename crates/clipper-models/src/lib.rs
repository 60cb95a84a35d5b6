//! Shared data models for the clipper service.
//!
//! This crate provides:
//! - Clip request validation into immutable job descriptors
//! - Job ids, statuses, results and the pipeline state machine
//! - Configurable source host aliases
//! - Clock offset parsing for range checks

pub mod host_alias;
pub mod job;
pub mod job_status;
pub mod request;
pub mod timestamp;

pub use host_alias::{HostAliasParseError, HostAliases, DEFAULT_HOST_ALIASES};
pub use job::{output_file_name, ClipRange, JobDescriptor, JobId, OUTPUT_FILE_PREFIX};
pub use job_status::{DownloadLocator, ErrorKind, JobError, JobResult, JobStatus, TransitionError};
pub use request::{normalize_source_url, ClipRequest, DescriptorPolicy, ValidationError};
pub use timestamp::{parse_timestamp, range_is_ordered, TimestampError};
