//! The `run` command: one pass of the pipeline.

use crate::config::Settings;
use chrono::NaiveDate;
use tee_time::progress::{self, ProgressReceiver};
use tee_time::{resolve_targets, AgentError, AgentResult, RunReport, TargetDate};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Exit codes reported by the binary.
pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Flags accepted by `run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// ISO date to inspect regardless of the weekday rule.
    pub force_date: Option<String>,
    /// Overrides `LOOKAHEAD_DAYS`.
    pub lookahead_days: Option<u32>,
    /// Print the report as JSON.
    pub json: bool,
}

/// Target dates for this invocation.
pub fn select_targets(
    settings: &Settings,
    options: &RunOptions,
    today: NaiveDate,
) -> AgentResult<Vec<TargetDate>> {
    let lookahead = options.lookahead_days.unwrap_or(settings.lookahead_days);
    resolve_targets(options.force_date.as_deref(), today, lookahead)
}

/// Execute the pipeline, logging progress events as they arrive.
pub async fn run(settings: &Settings, options: &RunOptions) -> AgentResult<RunReport> {
    let today = chrono::Local::now().date_naive();
    let targets = select_targets(settings, options, today)?;

    info!(
        environment = %settings.environment,
        today = %today,
        targets = ?targets.iter().map(TargetDate::iso).collect::<Vec<_>>(),
        "agent.start"
    );

    let (tx, rx) = progress::channel();
    let listener = tokio::spawn(log_progress(rx));

    let agent = settings.build_agent()?.with_progress(tx);
    let result = agent.run(&targets).await;
    // Dropping the agent drops the last sender and ends the listener
    drop(agent);
    let _ = listener.await;

    if let Err(e) = &result {
        error!(error = %e, "agent.failed");
    }
    result
}

async fn log_progress(mut rx: ProgressReceiver) {
    loop {
        match rx.recv().await {
            Ok(event) => info!(
                run_id = %event.run_id,
                seq = event.seq,
                text = %event.event.message(),
                "agent.event"
            ),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "agent.event.lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Text printed to stdout for a finished run.
pub fn render_report(report: &RunReport, json: bool) -> String {
    if json {
        serde_json::to_string_pretty(report).unwrap_or_else(|e| {
            format!("{{\"error\": true, \"message\": \"could not serialise report: {e}\"}}")
        })
    } else {
        report.to_string()
    }
}

/// Map a run result to the process exit code.
pub fn exit_code(result: &AgentResult<RunReport>) -> i32 {
    match result {
        Ok(_) => EXIT_OK,
        Err(AgentError::Configuration(_)) => EXIT_CONFIG,
        Err(_) => EXIT_FATAL,
    }
}
