//! Run orchestration: fetch every target inside one session, then analyse
//! and deliver each captured snapshot.
//!
//! Login and browser failures abort the run. Fetch, analysis and delivery
//! failures are recorded against their target and the run moves on. Outcomes
//! are reported in target selection order.

use crate::date_window::TargetDate;
use crate::error::{AgentError, AgentResult};
use crate::models::{Outcome, RunReport, RunStatus, Snapshot, Stage};
use crate::ollama::OllamaClient;
use crate::progress::{self, ProgressEventKind, ProgressSender};
use crate::renderer::Launcher;
use crate::session::{PortalConfig, SessionTimings, TeeSheetBrowser};
use crate::telegram::TelegramClient;
use std::sync::Arc;
use tracing::{error, info};

/// Collects tee sheets, summarises them and posts them to Telegram.
pub struct TeeTimeAgent {
    portal: Arc<PortalConfig>,
    launcher: Arc<dyn Launcher>,
    timings: SessionTimings,
    ollama: OllamaClient,
    telegram: TelegramClient,
    progress: Option<ProgressSender>,
}

struct RunContext {
    run_id: String,
    seq: u64,
    outcomes: Vec<Option<Outcome>>,
}

impl RunContext {
    fn record(&mut self, index: usize, outcome: Outcome) {
        if let Some(slot) = self.outcomes.get_mut(index) {
            *slot = Some(outcome);
        }
    }

    fn failed(&mut self, index: usize, date: String, stage: Stage, err: &AgentError) {
        self.record(
            index,
            Outcome::Failed {
                date,
                stage,
                error: err.to_string(),
            },
        );
    }

    fn report(&mut self, status: RunStatus) -> RunReport {
        let outcomes = std::mem::take(&mut self.outcomes).into_iter().flatten().collect();
        RunReport::from_outcomes(self.run_id.clone(), status, outcomes)
    }
}

impl TeeTimeAgent {
    pub fn new(
        portal: Arc<PortalConfig>,
        launcher: Arc<dyn Launcher>,
        ollama: OllamaClient,
        telegram: TelegramClient,
    ) -> Self {
        Self {
            portal,
            launcher,
            timings: SessionTimings::default(),
            ollama,
            telegram,
            progress: None,
        }
    }

    /// Attach a progress channel; events are emitted as the run advances.
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Run the pipeline for `targets`.
    ///
    /// Returns `Err` only for fatal errors; every per-target failure is in
    /// the report.
    pub async fn run(&self, targets: &[TargetDate]) -> AgentResult<RunReport> {
        let mut ctx = RunContext {
            run_id: uuid::Uuid::new_v4().to_string(),
            seq: 0,
            outcomes: vec![None; targets.len()],
        };

        self.emit(
            &mut ctx,
            ProgressEventKind::TargetsSelected {
                dates: targets.iter().map(TargetDate::iso).collect(),
            },
        );

        if targets.is_empty() {
            info!(run_id = %ctx.run_id, "agent.nothing_to_do");
            self.emit(&mut ctx, ProgressEventKind::RunFinished { delivered: 0, failed: 0 });
            return Ok(RunReport::nothing_to_do(ctx.run_id));
        }

        info!(run_id = %ctx.run_id, targets = targets.len(), "agent.run.start");
        let snapshots = self.acquire(&mut ctx, targets).await?;

        if snapshots.is_empty() {
            error!(run_id = %ctx.run_id, "agent.nothing_captured");
            let report = ctx.report(RunStatus::NothingCaptured);
            self.emit_finished(&mut ctx, &report);
            return Ok(report);
        }

        for (index, snapshot) in snapshots {
            self.analyse_and_deliver(&mut ctx, index, &snapshot).await;
        }

        let report = ctx.report(RunStatus::Completed);
        info!(
            run_id = %report.run_id,
            delivered = report.delivered_count,
            failed = report.failed_count,
            "agent.run.complete"
        );
        self.emit_finished(&mut ctx, &report);
        Ok(report)
    }

    /// Fetch every target with one logged-in session, closing it on every path.
    async fn acquire(
        &self,
        ctx: &mut RunContext,
        targets: &[TargetDate],
    ) -> AgentResult<Vec<(usize, Snapshot)>> {
        let mut browser = TeeSheetBrowser::new(Arc::clone(&self.portal), Arc::clone(&self.launcher))
            .with_timings(self.timings);

        if let Err(e) = browser.open().await {
            error!(run_id = %ctx.run_id, error = %e, "agent.browser_error");
            return Err(e);
        }

        let mut snapshots = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            let url = self.portal.tee_sheet_url(target);
            match browser.snapshot_for_date(target, &url).await {
                Ok(snapshot) => {
                    self.emit(
                        ctx,
                        ProgressEventKind::SnapshotCaptured {
                            date: target.iso(),
                            day_name: target.day_name().to_string(),
                        },
                    );
                    snapshots.push((index, snapshot));
                }
                Err(e) => {
                    error!(target_date = %target.iso(), error = %e, "agent.fetch_failed");
                    self.emit(
                        ctx,
                        ProgressEventKind::FetchFailed {
                            date: target.iso(),
                            error: e.to_string(),
                        },
                    );
                    ctx.failed(index, target.iso(), Stage::Fetch, &e);
                }
            }
        }

        browser.close().await;
        Ok(snapshots)
    }

    async fn analyse_and_deliver(&self, ctx: &mut RunContext, index: usize, snapshot: &Snapshot) {
        let date = snapshot.date_iso();

        let analysis = match self.ollama.analyse_snapshot(snapshot).await {
            Ok(analysis) => analysis,
            Err(e) => {
                error!(target_date = %date, error = %e, "agent.ollama_failed");
                self.emit(
                    ctx,
                    ProgressEventKind::AnalysisFailed {
                        date: date.clone(),
                        error: e.to_string(),
                    },
                );
                ctx.failed(index, date, Stage::Analysis, &e);
                return;
            }
        };
        self.emit(
            ctx,
            ProgressEventKind::Analysed {
                date: date.clone(),
                summary: analysis.summary.clone(),
            },
        );

        match self.telegram.deliver(&analysis).await {
            Ok(()) => {
                self.emit(ctx, ProgressEventKind::Delivered { date: date.clone() });
                ctx.record(index, Outcome::Delivered { date });
            }
            Err(e) => {
                error!(target_date = %date, error = %e, "agent.telegram_failed");
                self.emit(
                    ctx,
                    ProgressEventKind::DeliveryFailed {
                        date: date.clone(),
                        error: e.to_string(),
                    },
                );
                ctx.failed(index, date, Stage::Delivery, &e);
            }
        }
    }

    fn emit(&self, ctx: &mut RunContext, kind: ProgressEventKind) {
        progress::emit(&self.progress, &ctx.run_id, &mut ctx.seq, kind);
    }

    fn emit_finished(&self, ctx: &mut RunContext, report: &RunReport) {
        self.emit(
            ctx,
            ProgressEventKind::RunFinished {
                delivered: report.delivered_count,
                failed: report.failed_count,
            },
        );
    }
}
