//! Trim tool (ffmpeg) command building.
//!
//! Trimming always uses stream copy (`-c copy`): no re-encode, so a clip is
//! produced in roughly the time it takes to read the source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clipper_models::ClipRange;

use crate::command::ToolInvocation;

/// Default trim tool.
pub const DEFAULT_TRIM_TOOL: &str = "ffmpeg";

/// Builder for a stream-copy trim.
#[derive(Debug, Clone)]
pub struct TrimCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    range: ClipRange,
}

impl TrimCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            range: ClipRange::full(),
        }
    }

    /// Set the requested range.
    pub fn range(mut self, range: &ClipRange) -> Self {
        self.range = range.clone();
        self
    }

    /// Build the command arguments.
    ///
    /// Offsets follow `-i` so they apply to the output:
    /// - neither: full copy
    /// - start only: `-ss start` to end of input
    /// - end only: from the beginning `-to end`
    /// - both: `-ss start -to end`
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.push("-y".to_string());
        args.push("-hide_banner".to_string());
        args.push("-nostdin".to_string());
        args.push("-v".to_string());
        args.push("error".to_string());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        if let Some(start) = &self.range.start {
            args.push("-ss".to_string());
            args.push(start.clone());
        }
        if let Some(end) = &self.range.end {
            args.push("-to".to_string());
            args.push(end.clone());
        }

        args.push("-c".to_string());
        args.push("copy".to_string());

        args.push(self.output.to_string_lossy().to_string());
        args
    }

    /// Turn into an invocation of `program`.
    pub fn into_invocation(self, program: &str, timeout: Duration) -> ToolInvocation {
        ToolInvocation::new(program, timeout).args(self.build_args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_for(start: Option<&str>, end: Option<&str>) -> Vec<String> {
        let range = ClipRange::new(start.map(String::from), end.map(String::from));
        TrimCommand::new("in.mp4", "out.mp4").range(&range).build_args()
    }

    fn tail_after_input(args: &[String]) -> Vec<&str> {
        let i = args.iter().position(|a| a == "-i").unwrap();
        args[i + 2..].iter().map(String::as_str).collect()
    }

    #[test]
    fn test_full_copy() {
        let args = args_for(None, None);
        assert_eq!(tail_after_input(&args), vec!["-c", "copy", "out.mp4"]);
    }

    #[test]
    fn test_start_only() {
        let args = args_for(Some("00:00:05"), None);
        assert_eq!(tail_after_input(&args), vec!["-ss", "00:00:05", "-c", "copy", "out.mp4"]);
    }

    #[test]
    fn test_end_only() {
        let args = args_for(None, Some("00:00:10"));
        assert_eq!(tail_after_input(&args), vec!["-to", "00:00:10", "-c", "copy", "out.mp4"]);
    }

    #[test]
    fn test_bounded_range() {
        let args = args_for(Some("00:00:05"), Some("00:00:10"));
        assert_eq!(
            tail_after_input(&args),
            vec!["-ss", "00:00:05", "-to", "00:00:10", "-c", "copy", "out.mp4"]
        );
    }

    #[test]
    fn test_input_and_overwrite() {
        let args = args_for(None, None);
        assert_eq!(args[0], "-y");
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "in.mp4");
        assert!(!args.iter().any(|a| a == "-c:v" || a == "libx264"));
    }
}
