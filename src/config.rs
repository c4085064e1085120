// In-memory settings: defaults, then environment, then command-line flags

use std::path::PathBuf;

use tracing::warn;

pub const MIN_CONCURRENT_DOWNLOADS: usize = 1;
pub const MAX_CONCURRENT_DOWNLOADS: usize = 10;
const DEFAULT_CONCURRENT_DOWNLOADS: usize = 3;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Used when a request does not name an output directory
    pub default_output_dir: PathBuf,
    /// How many downloads may transfer at once (1..=10)
    pub max_concurrent_downloads: usize,
    /// Explicit yt-dlp executable, otherwise looked up
    pub ytdlp_path: Option<PathBuf>,
    /// Explicit ffmpeg executable, otherwise looked up
    pub ffmpeg_path: Option<PathBuf>,
    /// Limit for the metadata probe only; transfers are never timed out
    pub probe_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from("./downloads")),
            max_concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
            ytdlp_path: None,
            ffmpeg_path: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Defaults overridden by `VEDL_*` environment variables
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("VEDL_OUTPUT_DIR").filter(|d| !d.trim().is_empty()) {
            self.default_output_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("VEDL_MAX_CONCURRENT") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self = self.with_max_concurrent(n),
                Err(e) => warn!("Ignoring VEDL_MAX_CONCURRENT={:?}: {}", raw, e),
            }
        }
        if let Some(path) = lookup("VEDL_YTDLP").filter(|p| !p.trim().is_empty()) {
            self.ytdlp_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("VEDL_FFMPEG").filter(|p| !p.trim().is_empty()) {
            self.ffmpeg_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup("VEDL_PROBE_TIMEOUT") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.probe_timeout_secs = secs,
                _ => warn!("Ignoring VEDL_PROBE_TIMEOUT={:?}", raw),
            }
        }
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent_downloads = n.clamp(MIN_CONCURRENT_DOWNLOADS, MAX_CONCURRENT_DOWNLOADS);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_output_dir = dir.into();
        self
    }
}
