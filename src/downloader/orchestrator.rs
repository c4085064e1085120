// Orchestrator: one request through probe, download and the direct-download fallback

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::{EngineError, FFMPEG_INSTALL_GUIDANCE};
use super::format_selector::{DownloadPlan, FormatSelector};
use super::models::{DownloadOutcome, DownloadRequest, DownloadState, MediaInfo};
use super::traits::{MediaEngine, ProgressEmitter};

/// Runs a single request. Never runs two transfers at once.
pub struct Orchestrator {
    engine: Arc<dyn MediaEngine>,
    request: DownloadRequest,
    emitter: ProgressEmitter,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        request: DownloadRequest,
        emitter: ProgressEmitter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            request,
            emitter,
            cancel,
        }
    }

    /// Drive the request to a terminal outcome.
    ///
    /// The terminal state event and the outcome itself are left to the caller.
    pub async fn run(&self) -> DownloadOutcome {
        let url = self.request.url.as_str();

        if self.cancel.is_cancelled() {
            return self.cancelled();
        }

        self.emitter.state(DownloadState::Resolving);
        self.emitter.status("Extracting video information...");
        info!("[{}] Resolving {}", self.engine.name(), url);

        let probed = tokio::select! {
            result = self.engine.probe(url) => result,
            _ = self.cancel.cancelled() => return self.cancelled(),
        };

        let info = match probed {
            Ok(info) => info,
            Err(_) if self.cancel.is_cancelled() => return self.cancelled(),
            Err(EngineError::Cancelled) => return self.cancelled(),
            Err(e) => {
                warn!("[{}] ✗ probe failed for {}: {}", self.engine.name(), url, e);
                return self.download_error(&e);
            }
        };

        if self.cancel.is_cancelled() {
            return self.cancelled();
        }

        debug!(
            "Resolved '{}' ({} formats)",
            info.title,
            info.formats.len()
        );

        self.emitter.state(DownloadState::Downloading);
        self.emitter.status(format!("Downloading: {}", info.title));

        let plan = FormatSelector::plan(&self.request);
        info!(
            "[{}] Downloading '{}' with -f {} ({} / {})",
            self.engine.name(),
            info.title,
            plan.format_spec,
            self.request.quality,
            self.request.format
        );

        let result = self
            .engine
            .download(url, &plan, &self.emitter, &self.cancel)
            .await;

        if self.cancel.is_cancelled() {
            return self.cancelled();
        }

        match result {
            Ok(()) => self.succeeded(&info),
            Err(e) if e.is_remux_binary_missing() => self.direct_fallback(&info, e).await,
            Err(EngineError::Cancelled) => self.cancelled(),
            Err(e) => {
                warn!("[{}] ✗ download failed: {}", self.engine.name(), e);
                self.download_error(&e)
            }
        }
    }

    /// Retry with one stream that needs no merging
    async fn direct_fallback(&self, info: &MediaInfo, cause: EngineError) -> DownloadOutcome {
        warn!("ffmpeg unavailable ({}); trying direct download", cause);
        self.emitter
            .status("FFmpeg not found. Trying alternative download method...");
        self.emitter.status("Trying direct download without FFmpeg...");

        let candidate = match FormatSelector::select_direct(&info.formats, self.request.quality) {
            Some(candidate) => candidate,
            None => {
                warn!(
                    "No complete format fits {} among {} candidates",
                    self.request.quality,
                    info.formats.len()
                );
                self.emitter
                    .status("No compatible format found for direct download");
                return Self::ffmpeg_required(&cause);
            }
        };

        info!("Direct download with format {}", candidate.id);
        self.emitter
            .status(format!("Found compatible format: {}", candidate.id));

        let plan = DownloadPlan::direct(&self.request, &candidate.id);
        let result = self
            .engine
            .download(&self.request.url, &plan, &self.emitter, &self.cancel)
            .await;

        if self.cancel.is_cancelled() {
            return self.cancelled();
        }

        match result {
            Ok(()) => self.succeeded(info),
            Err(EngineError::Cancelled) => self.cancelled(),
            Err(e) => {
                warn!("Direct download failed: {}", e);
                self.emitter.status(format!("Direct download failed: {}", e));
                Self::ffmpeg_required(&cause)
            }
        }
    }

    fn succeeded(&self, info: &MediaInfo) -> DownloadOutcome {
        info!("✓ Downloaded '{}'", info.title);
        self.emitter.percent(100);
        self.emitter.status("Download complete!");
        DownloadOutcome::succeeded(&info.title)
    }

    fn download_error(&self, e: &EngineError) -> DownloadOutcome {
        let message = format!("Download error: {}", e);
        self.emitter.status(message.clone());
        DownloadOutcome::failed(message)
    }

    fn cancelled(&self) -> DownloadOutcome {
        info!("Cancelled: {}", self.request.url);
        DownloadOutcome::cancelled()
    }

    fn ffmpeg_required(cause: &EngineError) -> DownloadOutcome {
        DownloadOutcome::failed(format!("{}\n\nDetails: {}", FFMPEG_INSTALL_GUIDANCE, cause))
    }
}
