//! Shared data types flowing through a run: snapshots, analyses, outcomes and the run report.

use crate::date_window::TargetDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTML and visible text captured for one tee sheet.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub target: TargetDate,
    pub url: String,
    pub html_fragment: String,
    pub text_fragment: String,
}

impl Snapshot {
    pub fn date_iso(&self) -> String {
        self.target.iso()
    }

    pub fn day_name(&self) -> &'static str {
        self.target.day_name()
    }
}

/// One tee time parsed out of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeeTimeSlot {
    pub time: String,
    pub status: String,
    pub available_slots: Option<i64>,
    pub is_bookable: bool,
    pub notes: Option<String>,
}

/// Structured interpretation of a tee sheet produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeeSheetAnalysis {
    pub date_iso: String,
    pub day_name: String,
    /// Never empty: falls back to a deterministic sentence when the model omits it.
    pub summary: String,
    pub tee_times: Vec<TeeTimeSlot>,
    pub warnings: Vec<String>,
    pub source_url: String,
    pub model_used: String,
    pub model_raw_response: String,
}

/// Pipeline stage at which a target failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Analysis,
    Delivery,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Analysis => write!(f, "analysis"),
            Self::Delivery => write!(f, "delivery"),
        }
    }
}

/// Terminal result for one target date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Delivered {
        date: String,
    },
    Failed {
        date: String,
        stage: Stage,
        error: String,
    },
}

impl Outcome {
    pub fn date(&self) -> &str {
        match self {
            Self::Delivered { date } | Self::Failed { date, .. } => date,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// How a run ended (fatal errors never produce a report).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No target dates were selected.
    NothingToDo,
    /// Targets were selected but every fetch failed.
    NothingCaptured,
    /// At least one snapshot went through analysis and delivery.
    Completed,
}

/// A failure line in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub date: String,
    pub stage: Stage,
    pub error: String,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed at {}: {}", self.date, self.stage, self.error)
    }
}

/// The single authoritative result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Outcomes in target selection order.
    pub outcomes: Vec<Outcome>,
    pub delivered_count: usize,
    pub failed_count: usize,
    /// Delivered date identifiers, sorted.
    pub delivered_dates: Vec<String>,
    pub failures: Vec<FailureRecord>,
}

impl RunReport {
    /// Aggregate outcomes into a report.
    pub fn from_outcomes(run_id: impl Into<String>, status: RunStatus, outcomes: Vec<Outcome>) -> Self {
        let mut delivered_dates: Vec<String> = outcomes
            .iter()
            .filter(|o| o.is_delivered())
            .map(|o| o.date().to_string())
            .collect();
        delivered_dates.sort();

        let failures: Vec<FailureRecord> = outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Failed { date, stage, error } => Some(FailureRecord {
                    date: date.clone(),
                    stage: *stage,
                    error: error.clone(),
                }),
                Outcome::Delivered { .. } => None,
            })
            .collect();

        Self {
            run_id: run_id.into(),
            status,
            delivered_count: delivered_dates.len(),
            failed_count: failures.len(),
            outcomes,
            delivered_dates,
            failures,
        }
    }

    pub fn nothing_to_do(run_id: impl Into<String>) -> Self {
        Self::from_outcomes(run_id, RunStatus::NothingToDo, Vec::new())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            RunStatus::NothingToDo => {
                return write!(
                    f,
                    "No target dates fall on Friday/Saturday/Sunday in the booking window. Nothing to do."
                );
            }
            RunStatus::NothingCaptured => {
                write!(f, "No tee sheets captured successfully.")?;
            }
            RunStatus::Completed => {
                write!(
                    f,
                    "Delivery summary — succeeded: {}, failed: {}.",
                    self.delivered_count, self.failed_count
                )?;
                if !self.delivered_dates.is_empty() {
                    write!(f, "\nDelivered dates: {}.", self.delivered_dates.join(", "))?;
                }
            }
        }
        if !self.failures.is_empty() {
            write!(f, "\nFailures:")?;
            for failure in &self.failures {
                write!(f, "\n- {failure}")?;
            }
        }
        Ok(())
    }
}
