pub mod config;
pub mod downloader;
pub mod ytdlp;

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, DownloadArgs};
use crate::config::Settings;
use crate::downloader::models::{DownloadEvent, DownloadOutcome, DownloadRequest, DownloadState};
use crate::downloader::session::{DownloadHandle, Session};
use crate::downloader::tools::ToolManager;
use crate::ytdlp::YtDlpEngine;

/// Entry point for the `vedl` binary
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::from_env();
    match cli.command {
        Command::Tools => {
            print_tools(&settings);
            Ok(())
        }
        Command::Download(args) => download(settings, args).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "vedownloader_lib=debug"
    } else {
        "vedownloader_lib=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_tools(settings: &Settings) {
    let tools = ToolManager::new(settings.ytdlp_path.clone(), settings.ffmpeg_path.clone());
    for tool in tools.get_all_tools() {
        match (&tool.path, tool.is_available) {
            (Some(path), true) => println!(
                "{:<8} {}  ({})",
                tool.name,
                tool.version.as_deref().unwrap_or("unknown version"),
                path.display()
            ),
            _ => println!("{:<8} not found", tool.name),
        }
    }
}

async fn download(mut settings: Settings, args: DownloadArgs) -> anyhow::Result<()> {
    if let Some(n) = args.max_concurrent {
        settings = settings.with_max_concurrent(n);
    }
    if let Some(dir) = &args.output_dir {
        settings = settings.with_output_dir(dir.clone());
    }

    let engine = Arc::new(YtDlpEngine::from_settings(&settings));
    let session = Arc::new(Session::new(engine, settings));

    let requests = args
        .urls
        .iter()
        .map(|url| {
            DownloadRequest::new(url.clone(), PathBuf::new())
                .with_quality(args.quality)
                .with_format(args.format)
                .with_subtitles(args.subs)
        })
        .collect();

    let interrupt = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling downloads");
                session.cancel_all();
            }
        })
    };

    let failures = download_all(&session, requests, MultiProgress::new()).await?;
    interrupt.abort();

    let history = session.history();
    if !history.is_empty() {
        println!("\nHistory:");
        for entry in history {
            println!(
                "  {}  {}  {}",
                entry.finished_at.format("%Y-%m-%d %H:%M:%S"),
                entry.title.as_deref().unwrap_or("-"),
                entry.url
            );
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} downloads did not complete", failures, args.urls.len());
    }
    Ok(())
}

/// Submit every request and wait for all of them. Returns how many did not
/// succeed, counting requests the session rejected up front.
async fn download_all(
    session: &Session,
    requests: Vec<DownloadRequest>,
    multi: MultiProgress,
) -> anyhow::Result<usize> {
    let style = ProgressStyle::with_template("{prefix:.bold} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .context("invalid progress template")?
        .progress_chars("=> ");

    let mut failures = 0usize;
    let mut renderers = Vec::new();
    for request in requests {
        let url = request.url.clone();
        match session.submit(request) {
            Ok(handle) => {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_prefix(short_url(handle.url()));
                renderers.push(tokio::spawn(render(handle, bar)));
            }
            Err(e) => {
                warn!("Skipping '{}': {}", url, e);
                failures += 1;
            }
        }
    }

    for renderer in renderers {
        let outcome = renderer
            .await
            .unwrap_or_else(|e| DownloadOutcome::failed(format!("Progress renderer failed: {}", e)));
        if !outcome.success() {
            failures += 1;
        }
    }
    Ok(failures)
}

/// Drive one progress bar from the download's events
async fn render(mut handle: DownloadHandle, bar: ProgressBar) -> DownloadOutcome {
    while let Some(event) = handle.next_event().await {
        match event {
            DownloadEvent::Progress(p) => bar.set_position(u64::from(p)),
            DownloadEvent::Status(status) => bar.set_message(status),
            DownloadEvent::State(DownloadState::Queued) => bar.set_message("Queued"),
            DownloadEvent::State(_) => {}
            DownloadEvent::Finished(outcome) => {
                bar.finish_with_message(outcome.message.clone());
                return outcome;
            }
        }
    }
    bar.abandon_with_message("Download task ended without reporting an outcome");
    DownloadOutcome::failed("Download task ended without reporting an outcome")
}

fn short_url(url: &str) -> String {
    let trimmed = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.");
    if trimmed.chars().count() <= 40 {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(40).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::{complete_format, media, ScriptedEngine};
    use indicatif::ProgressDrawTarget;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn scripted_session(dir: &tempfile::TempDir) -> Session {
        let engine = Arc::new(ScriptedEngine::new(Ok(media("Clip", vec![complete_format("22", 720)]))));
        Session::new(engine, Settings::default().with_output_dir(dir.path()))
    }

    #[tokio::test]
    async fn test_rejected_requests_count_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let session = scripted_session(&dir);

        let requests = vec![
            DownloadRequest::new("", dir.path()),
            DownloadRequest::new("https://example.com/a", dir.path()),
        ];
        assert_eq!(download_all(&session, requests, hidden()).await.unwrap(), 1);
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_all_rejected_is_not_success() {
        let dir = tempfile::tempdir().unwrap();
        let session = scripted_session(&dir);

        let requests = vec![DownloadRequest::new("  ", dir.path())];
        assert_eq!(download_all(&session, requests, hidden()).await.unwrap(), 1);
    }

    #[test]
    fn test_short_url() {
        assert_eq!(short_url("https://www.youtube.com/watch?v=x"), "youtube.com/watch?v=x");
        assert!(short_url(&format!("https://example.com/{}", "a".repeat(80))).ends_with("..."));
    }
}
