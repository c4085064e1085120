// Locates the external binaries the downloader drives

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg takes a single dash
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

/// Lookup order: explicit override, PATH, then common install locations
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    ytdlp_override: Option<PathBuf>,
    ffmpeg_override: Option<PathBuf>,
}

const COMMON_DIRS: [&str; 3] = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

impl ToolManager {
    pub fn new(ytdlp_override: Option<PathBuf>, ffmpeg_override: Option<PathBuf>) -> Self {
        Self {
            ytdlp_override,
            ffmpeg_override,
        }
    }

    pub fn locate(&self, tool_type: ToolType) -> Option<PathBuf> {
        let explicit = match tool_type {
            ToolType::YtDlp => self.ytdlp_override.as_ref(),
            ToolType::Ffmpeg => self.ffmpeg_override.as_ref(),
        };
        if let Some(path) = explicit {
            if path.is_file() {
                return Some(path.clone());
            }
            debug!("Configured {} path {} does not exist", tool_type.as_str(), path.display());
        }

        if let Ok(path) = which::which(tool_type.as_str()) {
            return Some(path);
        }

        COMMON_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(tool_type.as_str()))
            .find(|p| p.is_file())
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path.as_deref().and_then(|p| Self::get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    fn get_version(path: &Path, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                let out = String::from_utf8_lossy(&output.stdout);
                // ffmpeg prints a banner; the first line carries the version
                out.lines().next().map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("ffmpeg-custom");
        std::fs::write(&fake, b"").unwrap();

        let manager = ToolManager::new(None, Some(fake.clone()));
        assert_eq!(manager.locate(ToolType::Ffmpeg), Some(fake));

        let missing = ToolManager::new(Some(dir.path().join("nope")), None);
        // Falls through to PATH lookup rather than trusting a bad override
        assert_ne!(missing.locate(ToolType::YtDlp), Some(dir.path().join("nope")));
    }

    #[test]
    fn test_names() {
        assert_eq!(ToolType::YtDlp.as_str(), "yt-dlp");
        assert_eq!(ToolType::Ffmpeg.as_str(), "ffmpeg");
    }
}
