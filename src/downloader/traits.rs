// Download engine trait definition

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::errors::EngineError;
use super::format_selector::DownloadPlan;
use super::models::{DownloadEvent, DownloadState, MediaInfo, ProgressEvent};
use super::progress::{adapt, ProgressUpdate};

/// Trait for the external extraction/download engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Resolve metadata and available formats without transferring media
    async fn probe(&self, url: &str) -> Result<MediaInfo, EngineError>;

    /// Run one transfer according to `plan`, reporting through `emitter`.
    ///
    /// Implementations should stop early once `cancel` fires and return
    /// `EngineError::Cancelled`, but the caller does not rely on it.
    async fn download(
        &self,
        url: &str,
        plan: &DownloadPlan,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>;
}

/// Progress emitter helper
///
/// Pushes UI updates to the foreground. Everything sent after cancellation is
/// dropped; the terminal outcome goes through a separate path.
#[derive(Clone)]
pub struct ProgressEmitter {
    tx: UnboundedSender<DownloadEvent>,
    cancel: CancellationToken,
}

impl ProgressEmitter {
    pub fn new(tx: UnboundedSender<DownloadEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Run a raw engine event through the adapter and forward the result
    pub fn report(&self, event: &ProgressEvent) {
        for update in adapt(event) {
            match update {
                ProgressUpdate::Percent(p) => self.percent(p),
                ProgressUpdate::Status(s) => self.status(s),
            }
        }
    }

    pub fn percent(&self, percent: u8) {
        self.emit(DownloadEvent::Progress(percent.min(100)));
    }

    pub fn status(&self, status: impl Into<String>) {
        self.emit(DownloadEvent::Status(status.into()));
    }

    pub fn state(&self, state: DownloadState) {
        self.emit(DownloadEvent::State(state));
    }

    fn emit(&self, event: DownloadEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        // Receiver gone means nobody is watching; the download still runs
        let _ = self.tx.send(event);
    }
}
