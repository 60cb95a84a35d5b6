//! External tool adapter for the clipper pipeline.
//!
//! This crate provides:
//! - Subprocess invocation with discrete arguments, timeouts and merged output
//! - The [`ToolInvoker`] seam used by the job runner
//! - Fetch (yt-dlp) and stream-copy trim (ffmpeg) command builders

pub mod command;
pub mod download;
pub mod error;
pub mod trim;

pub use command::{check_tool, ProcessRunner, ToolInvocation, ToolInvoker, ToolOutput};
pub use download::{FetchCommand, DEFAULT_FETCH_TOOL};
pub use error::{MediaError, MediaResult};
pub use trim::{TrimCommand, DEFAULT_TRIM_TOOL};
