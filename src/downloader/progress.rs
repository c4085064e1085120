// Maps raw engine progress events to what the progress bar and status line show

use super::models::ProgressEvent;

const MIB: f64 = 1024.0 * 1024.0;

/// Ceiling for the liveness percentage shown when the size is unknown
const UNKNOWN_SIZE_CEILING: u64 = 95;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// 0..=100
    Percent(u8),
    Status(String),
}

/// Turn one engine event into UI updates. Stateless; call once per event.
pub fn adapt(event: &ProgressEvent) -> Vec<ProgressUpdate> {
    match event {
        ProgressEvent::Downloading {
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate,
            speed,
        } => {
            let downloaded = downloaded_bytes.unwrap_or(0);
            let mut updates = Vec::with_capacity(3);

            let percent = match (total_bytes.filter(|t| *t > 0), total_bytes_estimate) {
                (Some(total), _) => Some(percent_of(downloaded, total)),
                (None, Some(estimate)) if *estimate > 0.0 => Some(percent_of_estimate(downloaded, *estimate)),
                _ => None,
            };

            match percent {
                Some(percent) => updates.push(ProgressUpdate::Percent(percent)),
                None => {
                    updates.push(ProgressUpdate::Status(format!(
                        "Downloading... ({:.2} MB downloaded)",
                        downloaded as f64 / MIB
                    )));
                    // Not a fraction: just keeps the bar moving below 100
                    let pulse = (downloaded % 100).min(UNKNOWN_SIZE_CEILING);
                    updates.push(ProgressUpdate::Percent(pulse as u8));
                }
            }

            match speed {
                Some(bps) => updates.push(ProgressUpdate::Status(format!(
                    "Downloading: {:.2} MB/s",
                    bps / MIB
                ))),
                None => updates.push(ProgressUpdate::Status("Downloading...".to_string())),
            }

            updates
        }
        ProgressEvent::Finished { .. } => vec![ProgressUpdate::Status(
            "Download finished, now processing...".to_string(),
        )],
        ProgressEvent::Error { error } => vec![ProgressUpdate::Status(format!(
            "Error: {}",
            error.as_deref().unwrap_or("Unknown error")
        ))],
    }
}

fn percent_of(downloaded: u64, total: u64) -> u8 {
    (u128::from(downloaded) * 100 / u128::from(total)).min(100) as u8
}

fn percent_of_estimate(downloaded: u64, estimate: f64) -> u8 {
    (downloaded as f64 * 100.0 / estimate).floor().clamp(0.0, 100.0) as u8
}
