// Download pipeline: request models, format planning, engine seam, orchestration

pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod session;
pub mod tools;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{EngineError, RequestError};
pub use models::{DownloadEvent, DownloadOutcome, DownloadRequest, OutputFormat, Quality};
pub use session::{DownloadHandle, HistoryEntry, Session};
pub use traits::{MediaEngine, ProgressEmitter};
