// Error types for the download engine and request validation

use std::path::PathBuf;

use thiserror::Error;

/// Message engine stderr carries when the merger/extractor needs ffmpeg.
pub const FFMPEG_MISSING_MARKER: &str = "ffmpeg is not installed";

/// Shown when remuxing is required and the direct-download path could not help.
pub const FFMPEG_INSTALL_GUIDANCE: &str = "FFmpeg is required but not installed. Please install FFmpeg:\n\n\
     1. Download FFmpeg from https://ffmpeg.org/download.html\n\
     2. Extract the archive\n\
     3. Put the ffmpeg executable in a folder on your system PATH\n\
     4. Or point VEDL_FFMPEG at the executable and try again";

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// yt-dlp (or another required binary) not found
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The merge/extract step needs ffmpeg and it is not available
    #[error("{0}")]
    RemuxBinaryMissing(String),

    /// Failed to parse engine JSON output
    #[error("Parse error: {0}")]
    Parse(String),

    /// Metadata probe did not answer in time
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Transfer was stopped because cancellation was requested
    #[error("Download cancelled by user")]
    Cancelled,

    /// Engine ran and reported a failure
    #[error("{0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl EngineError {
    /// Classify a failed engine run from its stderr.
    ///
    /// `ffmpeg_available` is the capability probe result. When ffmpeg is known
    /// to be absent, any complaint about ffmpeg or merging counts as a missing
    /// remux binary; otherwise only the engine's documented message does.
    pub fn from_stderr(stderr: &str, ffmpeg_available: bool) -> Self {
        let lower = stderr.to_lowercase();

        if lower.contains(FFMPEG_MISSING_MARKER) {
            return Self::RemuxBinaryMissing(last_error_line(stderr));
        }
        if !ffmpeg_available
            && (lower.contains("ffmpeg") || lower.contains("ffprobe") || lower.contains("merging"))
        {
            return Self::RemuxBinaryMissing(last_error_line(stderr));
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return Self::ToolNotFound(last_error_line(stderr));
        }

        Self::Failed(last_error_line(stderr))
    }

    pub fn is_remux_binary_missing(&self) -> bool {
        matches!(self, Self::RemuxBinaryMissing(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::ToolNotFound(e.to_string())
        } else {
            Self::Io(e.to_string())
        }
    }
}

/// Pick the line worth showing to a user out of a noisy stderr dump.
fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Rejected before any download is attempted
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Please enter a URL")]
    EmptyUrl,

    #[error("Could not create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown quality: {0}")]
    UnknownQuality(String),

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Already downloading: {0}")]
    AlreadyInFlight(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_ffmpeg_message() {
        let stderr = "WARNING: something\nERROR: You have requested merging of multiple formats but ffmpeg is not installed. Aborting due to --abort-on-error";
        let err = EngineError::from_stderr(stderr, true);
        assert!(err.is_remux_binary_missing());
        assert!(err.to_string().starts_with("ERROR:"));
    }

    #[test]
    fn test_probe_backs_up_substring() {
        let stderr = "ERROR: Postprocessing: ffprobe and ffmpeg not found. Please install or provide the path";
        assert!(EngineError::from_stderr(stderr, false).is_remux_binary_missing());
        assert!(!EngineError::from_stderr(stderr, true).is_remux_binary_missing());
    }

    #[test]
    fn test_other_failure_keeps_engine_text() {
        let stderr = "[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Video unavailable";
        match EngineError::from_stderr(stderr, true) {
            EngineError::Failed(msg) => assert_eq!(msg, "ERROR: [youtube] abc: Video unavailable"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_stderr() {
        match EngineError::from_stderr("", true) {
            EngineError::Failed(msg) => assert_eq!(msg, "Unknown error"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
