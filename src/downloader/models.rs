// Common data models for downloader

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::errors::RequestError;

/// Quality tier picked by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    Best,
    P1080,
    P720,
    P480,
    P360,
    AudioOnly,
}

impl Quality {
    pub const ALL: [Quality; 6] = [
        Self::Best,
        Self::P1080,
        Self::P720,
        Self::P480,
        Self::P360,
        Self::AudioOnly,
    ];

    /// Height ceiling in lines, `None` for "best" and audio
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::P360 => Some(360),
            Self::Best | Self::AudioOnly => None,
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, Self::AudioOnly)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Best => "Best",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::P360 => "360p",
            Self::AudioOnly => "Audio Only",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Quality {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "1080p" | "1080" => Ok(Self::P1080),
            "720p" | "720" => Ok(Self::P720),
            "480p" | "480" => Ok(Self::P480),
            "360p" | "360" => Ok(Self::P360),
            "audio only" | "audio-only" | "audio_only" | "audio" => Ok(Self::AudioOnly),
            _ => Err(RequestError::UnknownQuality(s.to_string())),
        }
    }
}

/// Container or audio codec the output should end up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Auto,
    Mp4,
    Mkv,
    Webm,
    Mp3,
    Aac,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        Self::Auto,
        Self::Mp4,
        Self::Mkv,
        Self::Webm,
        Self::Mp3,
        Self::Aac,
    ];

    /// Video container to merge into, if this is a container choice
    pub fn container(&self) -> Option<&'static str> {
        match self {
            Self::Mp4 => Some("mp4"),
            Self::Mkv => Some("mkv"),
            Self::Webm => Some("webm"),
            _ => None,
        }
    }

    /// Audio codec to extract to, if this is a codec choice
    pub fn audio_codec(&self) -> Option<&'static str> {
        match self {
            Self::Mp3 => Some("mp3"),
            Self::Aac => Some("aac"),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OutputFormat {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.label() == lower)
            .ok_or_else(|| RequestError::UnknownFormat(s.to_string()))
    }
}

/// One download as submitted from the form. Not modified after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub quality: Quality,
    pub format: OutputFormat,
    pub subtitles: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.into(),
            quality: Quality::Best,
            format: OutputFormat::Auto,
            subtitles: false,
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_subtitles(mut self, enabled: bool) -> Self {
        self.subtitles = enabled;
        self
    }
}

/// One streamable variant offered by the source, as reported by the probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatCandidate {
    pub id: String,
    pub ext: String,
    pub has_audio: bool,
    pub has_video: bool,
    pub height: Option<u32>,
    /// Average audio bitrate in kbps
    pub abr: Option<f32>,
}

impl FormatCandidate {
    /// Holds audio and video, so it plays without a merge step
    pub fn is_complete(&self) -> bool {
        self.has_audio && self.has_video
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }
}

/// Result of probing a URL without downloading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    pub ext: String,
    pub formats: Vec<FormatCandidate>,
}

/// Raw progress report pushed by the engine during a transfer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Downloading {
        #[serde(default, deserialize_with = "lenient_bytes")]
        downloaded_bytes: Option<u64>,
        #[serde(default, deserialize_with = "lenient_bytes")]
        total_bytes: Option<u64>,
        #[serde(default)]
        total_bytes_estimate: Option<f64>,
        /// Bytes per second
        #[serde(default)]
        speed: Option<f64>,
    },
    Finished {
        #[serde(default)]
        filename: Option<String>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

/// Byte counters show up as ints or floats depending on the downloader
fn lenient_bytes<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadState {
    /// Waiting for a free download slot
    Queued,
    Resolving,
    Downloading,
    PostProcessing,
    Succeeded,
    Failed,
    Cancelled,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Terminal result, reported once per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub status: OutcomeStatus,
    pub message: String,
    /// Media title when the probe got that far
    pub title: Option<String>,
}

impl DownloadOutcome {
    pub fn succeeded(title: &str) -> Self {
        Self {
            status: OutcomeStatus::Succeeded,
            message: format!("Successfully downloaded: {}", title),
            title: Some(title.to_string()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            message: message.into(),
            title: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: OutcomeStatus::Cancelled,
            message: "Download cancelled by user".to_string(),
            title: None,
        }
    }

    pub fn success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }

    pub fn state(&self) -> DownloadState {
        match self.status {
            OutcomeStatus::Succeeded => DownloadState::Succeeded,
            OutcomeStatus::Failed => DownloadState::Failed,
            OutcomeStatus::Cancelled => DownloadState::Cancelled,
        }
    }
}

/// What the background task pushes to the foreground
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    State(DownloadState),
    Progress(u8),
    Status(String),
    Finished(DownloadOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_labels_parse() {
        assert_eq!("audio only".parse::<Quality>().unwrap(), Quality::AudioOnly);
        assert_eq!("Audio Only".parse::<Quality>().unwrap(), Quality::AudioOnly);
        assert_eq!("720P".parse::<Quality>().unwrap(), Quality::P720);
        assert_eq!("best".parse::<Quality>().unwrap(), Quality::Best);
        assert!("4k".parse::<Quality>().is_err());
    }

    #[test]
    fn test_format_labels_parse() {
        assert_eq!("MP4".parse::<OutputFormat>().unwrap(), OutputFormat::Mp4);
        assert_eq!("auto".parse::<OutputFormat>().unwrap(), OutputFormat::Auto);
        assert!("flac".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Mkv.container(), Some("mkv"));
        assert_eq!(OutputFormat::Aac.audio_codec(), Some("aac"));
        assert_eq!(OutputFormat::Aac.container(), None);
    }

    #[test]
    fn test_progress_event_from_engine_json() {
        let json = r#"{"status":"downloading","downloaded_bytes":1024,"total_bytes":null,
            "total_bytes_estimate":4096.5,"speed":2048.0,"eta":3,"filename":"a.mp4",
            "_percent_str":" 25.0%"}"#;
        let event: ProgressEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ProgressEvent::Downloading {
                downloaded_bytes: Some(1024),
                total_bytes: None,
                total_bytes_estimate: Some(4096.5),
                speed: Some(2048.0),
            }
        );
    }

    #[test]
    fn test_progress_event_float_bytes_and_finished() {
        let event: ProgressEvent =
            serde_json::from_str(r#"{"status":"downloading","downloaded_bytes":99.0}"#).unwrap();
        assert!(matches!(
            event,
            ProgressEvent::Downloading { downloaded_bytes: Some(99), total_bytes: None, .. }
        ));

        let event: ProgressEvent =
            serde_json::from_str(r#"{"status":"finished","filename":"x.webm","elapsed":1.5}"#)
                .unwrap();
        assert_eq!(
            event,
            ProgressEvent::Finished { filename: Some("x.webm".to_string()) }
        );
    }

    #[test]
    fn test_outcome_shapes() {
        let ok = DownloadOutcome::succeeded("Clip");
        assert!(ok.success());
        assert_eq!(ok.message, "Successfully downloaded: Clip");
        assert_eq!(ok.state(), DownloadState::Succeeded);

        let cancelled = DownloadOutcome::cancelled();
        assert!(!cancelled.success());
        assert_eq!(cancelled.state(), DownloadState::Cancelled);
        assert!(cancelled.state().is_terminal());
    }
}
