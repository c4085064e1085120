use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::downloader::models::{OutputFormat, Quality};

/// Video downloader driving yt-dlp and ffmpeg
#[derive(Parser, Debug)]
#[command(name = "vedl")]
#[command(version)]
#[command(about = "Download videos with yt-dlp, falling back when ffmpeg is missing", long_about = None)]
pub struct Cli {
    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download one or more URLs
    Download(DownloadArgs),
    /// Show where yt-dlp and ffmpeg were found
    Tools,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Video page URLs
    #[arg(value_name = "URL", required = true)]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub urls: Vec<String>,

    /// Output directory (defaults to VEDL_OUTPUT_DIR or the system download dir)
    #[arg(short, long, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    #[arg(short, long, value_name = "QUALITY", default_value = "best")]
    #[arg(help = "Quality: best, 1080p, 720p, 480p, 360p, audio")]
    pub quality: Quality,

    #[arg(short, long, value_name = "FORMAT", default_value = "auto")]
    #[arg(help = "Container: auto, mp4, mkv, webm, mp3, aac")]
    pub format: OutputFormat,

    /// Also fetch English subtitles (including auto-generated)
    #[arg(long)]
    pub subs: bool,

    /// Downloads allowed to run at once (1-10)
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,
}
