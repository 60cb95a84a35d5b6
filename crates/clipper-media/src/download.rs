//! Fetch tool (yt-dlp) command building.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::ToolInvocation;

/// Default fetch tool.
pub const DEFAULT_FETCH_TOOL: &str = "yt-dlp";

/// Builder for a fetch tool invocation.
///
/// The URL is always placed after `--` so a value beginning with `-` can never
/// be read as an option.
#[derive(Debug, Clone)]
pub struct FetchCommand {
    url: String,
    output: PathBuf,
    extra_args: Vec<String>,
}

impl FetchCommand {
    pub fn new(url: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            url: url.into(),
            output: output.as_ref().to_path_buf(),
            extra_args: Vec::new(),
        }
    }

    /// Add operator-supplied arguments (placed before `-o`).
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.push("-o".to_string());
        args.push(self.output.to_string_lossy().to_string());
        args.push("--".to_string());
        args.push(self.url.clone());
        args
    }

    /// Turn into an invocation of `program`.
    pub fn into_invocation(self, program: &str, timeout: Duration) -> ToolInvocation {
        ToolInvocation::new(program, timeout).args(self.build_args())
    }
}
