//! Progress event types and broadcast channel for run telemetry.
//!
//! The agent emits `ProgressEvent`s while it works through the target dates.
//! They flow through a `tokio::sync::broadcast` channel to any subscriber
//! (CLI log stream, tests). When no subscriber exists, events are silently
//! dropped. The final [`RunReport`](crate::models::RunReport) never depends
//! on these events.

use serde::{Deserialize, Serialize};

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// Target dates were selected for this run.
    TargetsSelected { dates: Vec<String> },
    /// A tee sheet snapshot was captured.
    SnapshotCaptured { date: String, day_name: String },
    /// Fetching a tee sheet failed; the run continues.
    FetchFailed { date: String, error: String },
    /// The model produced an analysis.
    Analysed { date: String, summary: String },
    /// Analysis failed after retries; delivery is skipped for this date.
    AnalysisFailed { date: String, error: String },
    /// The Telegram message was sent.
    Delivered { date: String },
    /// The Telegram message could not be sent.
    DeliveryFailed { date: String, error: String },
    /// The run finished and produced its report.
    RunFinished { delivered: usize, failed: usize },
}

impl ProgressEventKind {
    /// One-line, human-readable rendering.
    pub fn message(&self) -> String {
        match self {
            Self::TargetsSelected { dates } if dates.is_empty() => {
                "No target dates selected.".to_string()
            }
            Self::TargetsSelected { dates } => format!("Target dates: {}.", dates.join(", ")),
            Self::SnapshotCaptured { date, day_name } => {
                format!("Fetched tee sheet for {day_name} {date}.")
            }
            Self::FetchFailed { date, error } => {
                format!("Failed to fetch tee sheet for {date}: {error}")
            }
            Self::Analysed { date, summary } => format!("Analysed tee sheet for {date}: {summary}"),
            Self::AnalysisFailed { date, error } => {
                format!("Ollama analysis failed for {date}: {error}")
            }
            Self::Delivered { date } => format!("Telegram update sent for {date}."),
            Self::DeliveryFailed { date, error } => {
                format!("Telegram send failed for {date}: {error}")
            }
            Self::RunFinished { delivered, failed } => {
                format!("Run finished — delivered: {delivered}, failed: {failed}.")
            }
        }
    }
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
///
/// A run over a handful of dates emits well under 256 events.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit a progress event, silently ignoring send errors
/// (which occur when no receivers are listening).
pub fn emit(tx: &Option<ProgressSender>, run_id: &str, seq: &mut u64, event: ProgressEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent {
            run_id: run_id.to_string(),
            seq: *seq,
            event,
        });
    }
}
