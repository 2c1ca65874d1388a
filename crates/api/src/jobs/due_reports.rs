//! Due-report poller.
//!
//! Each tick loads enabled reports whose `next_run_at` has passed, advances
//! their schedule first and then hands them to the job tracker. Advancing
//! before running keeps a slow render from being fired twice by the next
//! tick. Runs on a single instance only.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::models::ReportDefinition;
use domain::repositories::ReportRepository;
use domain::services::{next_run_for, JobTracker};
use tracing::{debug, error, info, warn};

use super::scheduler::{Job, JobFrequency};

/// What the poller does with one due report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueAction {
    /// Fire now; the schedule moves to `next`.
    Run { next: Option<DateTime<Utc>> },
    /// Not yet inside the window; wait until `next`.
    Defer { next: Option<DateTime<Utc>> },
    /// Past the end of the window; stop polling.
    Expire,
}

/// Decide what to do with `report` at `now`.
pub fn plan(report: &ReportDefinition, now: DateTime<Utc>) -> DueAction {
    let schedule = &report.schedule;
    if schedule.end_at.is_some_and(|end| now > end) {
        return DueAction::Expire;
    }
    if let Some(start) = schedule.start_at.filter(|start| now < *start) {
        // First occurrence at or after the start of the window.
        let from = start - chrono::Duration::seconds(1);
        return DueAction::Defer {
            next: next_run_for(schedule, from).ok(),
        };
    }

    let next = match next_run_for(schedule, now) {
        Ok(next) => Some(next).filter(|n| schedule.end_at.map_or(true, |end| *n <= end)),
        Err(e) => {
            warn!(report_id = report.id, error = %e, "Stored schedule no longer parses");
            None
        }
    };
    DueAction::Run { next }
}

pub struct DueReportsJob {
    reports: Arc<dyn ReportRepository>,
    tracker: JobTracker,
    interval: Duration,
    batch_size: i64,
}

impl DueReportsJob {
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        tracker: JobTracker,
        interval: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            reports,
            tracker,
            interval,
            batch_size,
        }
    }

    /// Dispatch every due report once. Returns the spawned runs.
    pub async fn poll(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<tokio::task::JoinHandle<()>>, String> {
        let due = self
            .reports
            .find_due(now, self.batch_size)
            .await
            .map_err(|e| format!("Failed to load due reports: {}", e))?;

        let mut spawned = Vec::new();
        for report in due {
            match plan(&report, now) {
                DueAction::Expire => {
                    info!(report_id = report.id, "Schedule window ended");
                    self.reports
                        .reschedule(report.id, None)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                DueAction::Defer { next } => {
                    debug!(report_id = report.id, next_run_at = ?next, "Deferred until window opens");
                    self.reports
                        .reschedule(report.id, next)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                DueAction::Run { next } => {
                    self.reports
                        .mark_run(report.id, now, next)
                        .await
                        .map_err(|e| e.to_string())?;

                    metrics::counter!("report_poller_dispatched_total").increment(1);
                    let tracker = self.tracker.clone();
                    spawned.push(tokio::spawn(async move {
                        if let Err(e) = tracker.run_job(&report).await {
                            error!(report_id = report.id, error = %e, "Scheduled run could not be recorded");
                        }
                    }));
                }
            }
        }

        if !spawned.is_empty() {
            info!(dispatched = spawned.len(), "Dispatched due reports");
        }
        Ok(spawned)
    }
}

#[async_trait::async_trait]
impl Job for DueReportsJob {
    fn name(&self) -> &'static str {
        "due_reports"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval.as_secs())
    }

    async fn execute(&self) -> Result<(), String> {
        self.poll(Utc::now()).await.map(|_| ())
    }
}
