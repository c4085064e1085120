// Scripted MediaEngine for orchestrator and session tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::errors::EngineError;
use super::format_selector::DownloadPlan;
use super::models::{FormatCandidate, MediaInfo, ProgressEvent};
use super::traits::{MediaEngine, ProgressEmitter};

pub fn media(title: &str, formats: Vec<FormatCandidate>) -> MediaInfo {
    MediaInfo {
        id: "abc123".to_string(),
        title: title.to_string(),
        ext: "mp4".to_string(),
        formats,
    }
}

pub fn complete_format(id: &str, height: u32) -> FormatCandidate {
    FormatCandidate {
        id: id.to_string(),
        ext: "mp4".to_string(),
        has_audio: true,
        has_video: true,
        height: Some(height),
        abr: None,
    }
}

pub fn video_only_format(id: &str, height: u32) -> FormatCandidate {
    FormatCandidate {
        id: id.to_string(),
        ext: "webm".to_string(),
        has_audio: false,
        has_video: true,
        height: Some(height),
        abr: None,
    }
}

pub fn ffmpeg_missing() -> EngineError {
    EngineError::RemuxBinaryMissing(
        "ERROR: You have requested merging of multiple formats but ffmpeg is not installed"
            .to_string(),
    )
}

#[derive(Default)]
pub struct ScriptedEngine {
    probe: Mutex<Option<Result<MediaInfo, EngineError>>>,
    downloads: Mutex<VecDeque<Result<(), EngineError>>>,
    progress: Vec<ProgressEvent>,
    probe_gate: Option<Arc<Notify>>,
    download_gate: Option<Arc<Notify>>,
    panic_on_download: bool,
    plans: Mutex<Vec<DownloadPlan>>,
}

impl ScriptedEngine {
    pub fn new(probe: Result<MediaInfo, EngineError>) -> Self {
        Self {
            probe: Mutex::new(Some(probe)),
            ..Default::default()
        }
    }

    /// Queue results for successive download calls; unqueued calls succeed
    pub fn with_downloads(self, results: Vec<Result<(), EngineError>>) -> Self {
        *self.downloads.lock().unwrap() = results.into();
        self
    }

    pub fn with_progress(mut self, events: Vec<ProgressEvent>) -> Self {
        self.progress = events;
        self
    }

    /// Probe blocks until the gate is notified
    pub fn with_probe_gate(mut self, gate: Arc<Notify>) -> Self {
        self.probe_gate = Some(gate);
        self
    }

    /// Every download blocks until the gate is notified
    pub fn with_download_gate(mut self, gate: Arc<Notify>) -> Self {
        self.download_gate = Some(gate);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_download = true;
        self
    }

    pub fn plans(&self) -> Vec<DownloadPlan> {
        self.plans.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn probe(&self, _url: &str) -> Result<MediaInfo, EngineError> {
        if let Some(gate) = &self.probe_gate {
            gate.notified().await;
        }
        self.probe
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(EngineError::Failed("no probe scripted".to_string())))
    }

    async fn download(
        &self,
        _url: &str,
        plan: &DownloadPlan,
        emitter: &ProgressEmitter,
        _cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.plans.lock().unwrap().push(plan.clone());
        if self.panic_on_download {
            panic!("engine exploded");
        }
        if let Some(gate) = &self.download_gate {
            gate.notified().await;
        }
        for event in &self.progress {
            emitter.report(event);
        }
        self.downloads.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
