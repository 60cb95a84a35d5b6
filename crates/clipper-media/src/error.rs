//! Error types for external tool operations.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running an external tool.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("{tool} exited with non-zero status {}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "(signal)".to_string()))]
    ToolFailed {
        tool: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout {
        tool: String,
        secs: u64,
        output: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a tool failure error.
    pub fn tool_failed(tool: impl Into<String>, exit_code: Option<i32>, output: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            exit_code,
            output: output.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(tool: impl Into<String>, secs: u64, output: impl Into<String>) -> Self {
        Self::Timeout {
            tool: tool.into(),
            secs,
            output: output.into(),
        }
    }

    /// Combined tool output captured before the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            MediaError::ToolFailed { output, .. } | MediaError::Timeout { output, .. } => {
                Some(output.as_str())
            }
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MediaError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_does_not_include_output() {
        let err = MediaError::tool_failed("yt-dlp", Some(1), "ERROR: /srv/download/1.mp4");
        assert_eq!(err.to_string(), "yt-dlp exited with non-zero status 1");
        assert_eq!(err.output(), Some("ERROR: /srv/download/1.mp4"));

        let killed = MediaError::tool_failed("ffmpeg", None, "");
        assert_eq!(killed.to_string(), "ffmpeg exited with non-zero status (signal)");
    }

    #[test]
    fn test_timeout_classification() {
        let err = MediaError::timeout("ffmpeg", 30, "partial");
        assert!(err.is_timeout());
        assert_eq!(err.output(), Some("partial"));
        assert!(!MediaError::ToolNotFound("yt-dlp".into()).is_timeout());
    }
}
