use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::downloader::errors::EngineError;
use crate::downloader::format_selector::DownloadPlan;
use crate::downloader::models::{DownloadState, FormatCandidate, MediaInfo, ProgressEvent};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::{MediaEngine, ProgressEmitter};
use crate::downloader::utils::{run_output_with_timeout, short_name};

/// Prefix for the JSON progress dictionary we ask yt-dlp to print per update
const PROGRESS_PREFIX: &str = "vedl-progress:";
/// Prefix for post-processor hook lines
const POSTPROCESS_PREFIX: &str = "vedl-postprocess:";

/// `MediaEngine` backed by the yt-dlp executable
pub struct YtDlpEngine {
    ytdlp_path: PathBuf,
    ffmpeg_path: Option<PathBuf>,
    probe_timeout_secs: u64,
}

impl YtDlpEngine {
    pub fn new(ytdlp_path: PathBuf, ffmpeg_path: Option<PathBuf>, probe_timeout_secs: u64) -> Self {
        Self {
            ytdlp_path,
            ffmpeg_path,
            probe_timeout_secs,
        }
    }

    /// Locate yt-dlp and ffmpeg according to settings
    pub fn from_settings(settings: &Settings) -> Self {
        let tools = ToolManager::new(settings.ytdlp_path.clone(), settings.ffmpeg_path.clone());

        let ytdlp_path = tools.locate(ToolType::YtDlp).unwrap_or_else(|| {
            // Last resort: hope it's in PATH at spawn time
            warn!("yt-dlp not found; falling back to bare 'yt-dlp'");
            PathBuf::from("yt-dlp")
        });
        let ffmpeg_path = tools.locate(ToolType::Ffmpeg);
        match &ffmpeg_path {
            Some(p) => info!("ffmpeg found at {}", p.display()),
            None => warn!("ffmpeg not found; merging and audio extraction will need the direct-download path"),
        }

        Self::new(ytdlp_path, ffmpeg_path, settings.probe_timeout_secs)
    }

    pub fn ffmpeg_available(&self) -> bool {
        self.ffmpeg_path.is_some()
    }

    fn probe_args(url: &str) -> Vec<String> {
        vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--quiet".to_string(),
            url.to_string(),
        ]
    }

    /// Command line for one transfer
    fn build_args(&self, url: &str, plan: &DownloadPlan) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            plan.format_spec.clone().into(),
            "-P".into(),
            plan.output_dir.clone().into_os_string(),
            "-o".into(),
            plan.output_template.clone().into(),
            "--quiet".into(),
            "--no-warnings".into(),
            "--progress".into(),
            "--newline".into(),
            "--progress-template".into(),
            format!("download:{}%(progress)j", PROGRESS_PREFIX).into(),
            "--progress-template".into(),
            format!(
                "postprocess:{}%(progress.postprocessor)s %(progress.status)s",
                POSTPROCESS_PREFIX
            )
            .into(),
        ];

        if plan.no_playlist {
            args.push("--no-playlist".into());
        }

        if let Some(ffmpeg) = &self.ffmpeg_path {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.clone().into_os_string());
        }

        if let Some(container) = plan.merge_output_format {
            args.push("--merge-output-format".into());
            args.push(container.into());
        }

        if plan.fast_start {
            args.push("--postprocessor-args".into());
            args.push("Merger+ffmpeg:-movflags +faststart".into());
        }

        if let Some(audio) = &plan.extract_audio {
            args.push("-x".into());
            args.push("--audio-format".into());
            args.push(audio.codec.unwrap_or("best").into());
            args.push("--audio-quality".into());
            args.push(format!("{}K", audio.quality_kbps).into());
            args.push("--postprocessor-args".into());
            args.push(format!("ExtractAudio:-ar {}", audio.sample_rate).into());
        }

        if let Some(subs) = &plan.subtitles {
            args.push("--write-subs".into());
            if subs.include_auto {
                args.push("--write-auto-subs".into());
            }
            args.push("--sub-langs".into());
            args.push(subs.languages.join(",").into());
        }

        args.push(url.into());
        args
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str) -> Result<MediaInfo, EngineError> {
        debug!("[yt-dlp] probe {}", url);
        let output = run_output_with_timeout(
            self.ytdlp_path.as_os_str(),
            Self::probe_args(url),
            self.probe_timeout_secs,
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::from_stderr(&stderr, self.ffmpeg_available()));
        }

        parse_media_info(&output.stdout)
    }

    async fn download(
        &self,
        url: &str,
        plan: &DownloadPlan,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let args = self.build_args(url, plan);
        debug!("[yt-dlp] {} {:?}", self.ytdlp_path.display(), args);

        let mut child = Command::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Io("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Io("Failed to capture stderr".to_string()))?;

        // Under --quiet the post-processor hook lines arrive on stderr
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut stderr_output = String::new();
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[yt-dlp] Cancel requested, stopping transfer");
                    let _ = child.kill().await;
                    return Err(EngineError::Cancelled);
                }
                line = out_lines.next_line(), if out_open => match line? {
                    Some(line) => handle_line(&line, emitter),
                    None => out_open = false,
                },
                line = err_lines.next_line(), if err_open => match line? {
                    Some(line) => {
                        handle_line(&line, emitter);
                        stderr_output.push_str(&line);
                        stderr_output.push('\n');
                    }
                    None => err_open = false,
                },
            }
        }

        let status = child.wait().await?;

        if status.success() {
            return Ok(());
        }

        debug!("[yt-dlp] exited with {}: {}", status, stderr_output.trim());
        Err(EngineError::from_stderr(&stderr_output, self.ffmpeg_available()))
    }
}

/// One recognised output line
#[derive(Debug, PartialEq)]
enum EngineLine {
    Progress(ProgressEvent),
    PostProcess { name: String, started: bool },
}

fn parse_line(line: &str) -> Option<EngineLine> {
    lazy_static::lazy_static! {
        static ref POSTPROCESS_RE: Regex = Regex::new(r"^(\w+)\s+(started|processing|finished)$")
            .expect("static regex");
    }

    let line = line.trim();
    if let Some(json) = line.strip_prefix(PROGRESS_PREFIX) {
        return match serde_json::from_str::<ProgressEvent>(json) {
            Ok(event) => Some(EngineLine::Progress(event)),
            Err(e) => {
                debug!("Unparsed progress line ({}): {}", e, json);
                None
            }
        };
    }

    if let Some(rest) = line.strip_prefix(POSTPROCESS_PREFIX) {
        let caps = POSTPROCESS_RE.captures(rest.trim())?;
        return Some(EngineLine::PostProcess {
            name: caps[1].to_string(),
            started: &caps[2] == "started",
        });
    }

    None
}

fn handle_line(line: &str, emitter: &ProgressEmitter) {
    match parse_line(line) {
        Some(EngineLine::Progress(event)) => {
            if let ProgressEvent::Finished { filename: Some(name) } = &event {
                debug!("[yt-dlp] finished {}", short_name(name, 80));
            }
            emitter.report(&event);
        }
        Some(EngineLine::PostProcess { name, started: true }) => {
            emitter.state(DownloadState::PostProcessing);
            emitter.status(postprocess_status(&name));
        }
        Some(EngineLine::PostProcess { .. }) => {}
        None => {
            if !line.trim().is_empty() {
                debug!("[yt-dlp] {}", line);
            }
        }
    }
}

fn postprocess_status(name: &str) -> String {
    match name {
        "Merger" => "Merging video and audio...".to_string(),
        "ExtractAudio" => "Extracting audio...".to_string(),
        "VideoRemuxer" | "VideoConvertor" => "Converting container...".to_string(),
        other => format!("Post-processing ({})...", other),
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    id: String,
    title: Option<String>,
    ext: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_id: String,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<f64>,
    abr: Option<f64>,
}

/// yt-dlp omits the codec key when unsure; only an explicit "none" means absent
fn codec_present(codec: &Option<String>) -> bool {
    codec.as_deref().map_or(true, |c| c != "none")
}

fn parse_media_info(stdout: &[u8]) -> Result<MediaInfo, EngineError> {
    let text = String::from_utf8_lossy(stdout);
    let json = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| EngineError::Parse("yt-dlp returned no metadata".to_string()))?;

    let raw: RawInfo = serde_json::from_str(json)
        .map_err(|e| EngineError::Parse(format!("Invalid JSON: {}", e)))?;

    let formats = raw
        .formats
        .into_iter()
        .map(|f| FormatCandidate {
            has_audio: codec_present(&f.acodec),
            has_video: codec_present(&f.vcodec),
            id: f.format_id,
            ext: f.ext.unwrap_or_default(),
            height: f.height.filter(|h| *h > 0.0).map(|h| h as u32),
            abr: f.abr.map(|a| a as f32),
        })
        .collect();

    Ok(MediaInfo {
        id: raw.id,
        title: raw
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Video".to_string()),
        ext: raw.ext.unwrap_or_default(),
        formats,
    })
}
