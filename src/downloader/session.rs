// Session: the state a download window keeps between submissions

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::errors::RequestError;
use super::models::{DownloadEvent, DownloadOutcome, DownloadRequest, DownloadState};
use super::orchestrator::Orchestrator;
use super::traits::{MediaEngine, ProgressEmitter};
use crate::config::Settings;

/// A finished download, kept in memory for the history list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub url: String,
    pub title: Option<String>,
    pub finished_at: DateTime<Local>,
}

pub struct Session {
    engine: Arc<dyn MediaEngine>,
    settings: Settings,
    slots: Arc<Semaphore>,
    history: Arc<Mutex<Vec<HistoryEntry>>>,
    in_flight: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl Session {
    pub fn new(engine: Arc<dyn MediaEngine>, settings: Settings) -> Self {
        Self {
            engine,
            slots: Arc::new(Semaphore::new(settings.max_concurrent_downloads)),
            settings,
            history: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace settings. A new concurrency limit resizes the shared slot pool.
    ///
    /// When the limit shrinks while downloads hold slots, the surplus is
    /// reclaimed as those downloads finish, ahead of anything still queued.
    pub fn update_settings(&mut self, settings: Settings) {
        let old = self.settings.max_concurrent_downloads;
        let new = settings.max_concurrent_downloads;

        if new > old {
            self.slots.add_permits(new - old);
        } else if new < old {
            let surplus = old - new;
            let pending = surplus - self.slots.forget_permits(surplus);
            if pending > 0 {
                self.reclaim_slots(pending as u32);
            }
        }
        self.settings = settings;
    }

    fn reclaim_slots(&self, count: u32) {
        let slots = self.slots.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Ok(permits) = slots.acquire_many_owned(count).await {
                        permits.forget();
                    }
                });
            }
            // Slots can only be held by tasks on a runtime
            Err(_) => debug!("No runtime; {} slots left to reclaim", count),
        }
    }

    /// Validate and start a download in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, mut request: DownloadRequest) -> Result<DownloadHandle, RequestError> {
        request.url = request.url.trim().to_string();
        if request.url.is_empty() {
            return Err(RequestError::EmptyUrl);
        }

        if request.output_dir.as_os_str().is_empty() {
            request.output_dir = self.settings.default_output_dir.clone();
        }
        if !request.output_dir.exists() {
            std::fs::create_dir_all(&request.output_dir).map_err(|source| RequestError::OutputDir {
                path: request.output_dir.clone(),
                source,
            })?;
        }

        let cancel = CancellationToken::new();
        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.contains_key(&request.url) {
                return Err(RequestError::AlreadyInFlight(request.url));
            }
            in_flight.insert(request.url.clone(), cancel.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = ProgressEmitter::new(tx.clone(), cancel.clone());
        let url = request.url.clone();

        info!(
            "Submitting {} ({} / {}) -> {}",
            url,
            request.quality,
            request.format,
            request.output_dir.display()
        );

        let slots = self.slots.clone();
        let task_cancel = cancel.clone();
        let orchestrator = Orchestrator::new(self.engine.clone(), request, emitter.clone(), cancel.clone());
        let worker = tokio::spawn(async move {
            emitter.state(DownloadState::Queued);
            let _permit = tokio::select! {
                permit = slots.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => return DownloadOutcome::failed(e.to_string()),
                },
                _ = task_cancel.cancelled() => return DownloadOutcome::cancelled(),
            };
            orchestrator.run().await
        });

        let history = self.history.clone();
        let in_flight = self.in_flight.clone();
        let finished_url = url.clone();
        tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    error!("Download task for {} panicked: {}", finished_url, message);
                    DownloadOutcome::failed(message)
                }
                Err(e) => DownloadOutcome::failed(e.to_string()),
            };

            if outcome.success() {
                lock(&history).push(HistoryEntry {
                    url: finished_url.clone(),
                    title: outcome.title.clone(),
                    finished_at: Local::now(),
                });
            }
            lock(&in_flight).remove(&finished_url);

            info!("{}: {}", finished_url, outcome.message.lines().next().unwrap_or_default());
            let _ = tx.send(DownloadEvent::State(outcome.state()));
            let _ = tx.send(DownloadEvent::Finished(outcome));
        });

        Ok(DownloadHandle { url, events: rx, cancel })
    }

    /// Request cancellation of an in-flight URL. Returns false if unknown.
    pub fn cancel(&self, url: &str) -> bool {
        match lock(&self.in_flight).get(url.trim()) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for token in lock(&self.in_flight).values() {
            token.cancel();
        }
    }

    pub fn in_flight(&self) -> Vec<String> {
        let mut urls: Vec<String> = lock(&self.in_flight).keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        lock(&self.history).clone()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }
}

/// Foreground side of one download
pub struct DownloadHandle {
    url: String,
    events: UnboundedReceiver<DownloadEvent>,
    cancel: CancellationToken,
}

impl DownloadHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cooperative; the transfer may still run briefly
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// Non-blocking poll for UI loops
    pub fn try_next_event(&mut self) -> Option<DownloadEvent> {
        self.events.try_recv().ok()
    }

    /// Discard progress and wait for the terminal outcome
    pub async fn wait(mut self) -> DownloadOutcome {
        while let Some(event) = self.events.recv().await {
            if let DownloadEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        DownloadOutcome::failed("Download task ended without reporting an outcome")
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unexpected error in download task".to_string()
    }
}
