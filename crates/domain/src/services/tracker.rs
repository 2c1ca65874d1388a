//! Job execution tracking.
//!
//! A tracked run inserts a job row, appends status events as it progresses,
//! and closes with a terminal event followed by a separate `finished_at`
//! update. A crash between those two writes leaves a job that looks pending
//! until the staleness rule reports it as failed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use shared::pagination::{clamp_page_size, JobCursor, Page};
use tracing::{error, info, warn};

use crate::error::ReportError;
use crate::models::{
    derive_from_history, JobDetail, JobExecution, JobState, ReportDefinition, StatusCode,
    TimeRange, DEFAULT_STALE_AFTER_SECS,
};
use crate::repositories::{JobRepository, ReportRepository};
use crate::services::delivery::{DashboardSource, DeliveryService};
use crate::services::render::{Artifact, RenderDispatcher, RenderOptions};

/// Tunables of the tracker.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub render_timeout: Duration,
    pub concurrency_limit: usize,
    /// Age after which a job without a terminal event counts as failed.
    pub stale_after: chrono::Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            render_timeout: Duration::from_secs(60),
            concurrency_limit: 4,
            stale_after: chrono::Duration::seconds(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

/// Job history of one report plus its derived state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHistory {
    pub report_id: i64,
    pub state: JobState,
    #[serde(flatten)]
    pub jobs: Page<JobDetail>,
}

/// Runs reports and answers questions about their job history.
#[derive(Clone)]
pub struct JobTracker {
    reports: Arc<dyn ReportRepository>,
    jobs: Arc<dyn JobRepository>,
    dispatcher: Arc<RenderDispatcher>,
    delivery: DeliveryService,
    dashboards: Option<Arc<dyn DashboardSource>>,
    settings: TrackerSettings,
}

impl JobTracker {
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        jobs: Arc<dyn JobRepository>,
        dispatcher: Arc<RenderDispatcher>,
        delivery: DeliveryService,
        dashboards: Option<Arc<dyn DashboardSource>>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            reports,
            jobs,
            dispatcher,
            delivery,
            dashboards,
            settings,
        }
    }

    pub fn delivery(&self) -> &DeliveryService {
        &self.delivery
    }

    async fn load_report(&self, org_id: i64, report_id: i64) -> Result<ReportDefinition, ReportError> {
        self.reports
            .find_by_id(org_id, report_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("report {}", report_id)))
    }

    /// Render options for a report; the dashboard's own time range is used
    /// when the report does not override it.
    pub async fn render_options(
        &self,
        report: &ReportDefinition,
        session_key: Option<String>,
    ) -> RenderOptions {
        let time_range = match (&report.time_range, &self.dashboards) {
            (Some(range), _) => range.clone(),
            (None, Some(dashboards)) => dashboards
                .default_time_range(report.org_id, &report.dashboard_uid)
                .await
                .unwrap_or_else(|e| {
                    warn!(
                        report_id = report.id,
                        error = %e,
                        "Dashboard time range lookup failed, using default"
                    );
                    TimeRange::default()
                }),
            (None, None) => TimeRange::default(),
        };

        RenderOptions {
            org_id: report.org_id,
            user_id: report.owner_user_id,
            format: report.format,
            dashboard_uid: report.dashboard_uid.clone(),
            time_range,
            filters: report.filters.clone(),
            panel_id: report.panel_id,
            layout: report.layout,
            orientation: report.orientation,
            theme: report.theme,
            timeout: self.settings.render_timeout,
            concurrency_limit: self.settings.concurrency_limit,
            session_key,
            file_name: report.artifact_file_name(Utc::now()),
        }
    }

    /// Render a report without recording a job, for run-now and previews.
    ///
    /// The caller owns the returned artifact and should discard it.
    pub async fn execute_once(
        &self,
        org_id: i64,
        report_id: i64,
        session_key: Option<String>,
    ) -> Result<Artifact, ReportError> {
        let report = self.load_report(org_id, report_id).await?;
        let opts = self.render_options(&report, session_key).await;
        let artifact = self.dispatcher.render(opts).await?.into_result()?;
        Ok(artifact)
    }

    /// Run a report by id as a tracked job.
    pub async fn run_now(&self, org_id: i64, report_id: i64) -> Result<JobDetail, ReportError> {
        let report = self.load_report(org_id, report_id).await?;
        self.run_job(&report).await
    }

    /// Render, archive and deliver one report, recording every step.
    ///
    /// Step failures end up in the job history; only bookkeeping failures
    /// are returned as errors.
    pub async fn run_job(&self, report: &ReportDefinition) -> Result<JobDetail, ReportError> {
        let started = Instant::now();
        let job = self
            .jobs
            .insert_job(report.id, report.org_id, Utc::now())
            .await?;
        self.jobs
            .append_status(job.id, StatusCode::Started, "Rendering started", Utc::now())
            .await?;

        let outcome = self.execute_steps(report, &job).await;
        let (status, description) = match &outcome {
            Ok(()) => (StatusCode::Success, "Report delivered".to_string()),
            Err(e) => (StatusCode::Fail, e.to_string()),
        };

        self.jobs
            .append_status(job.id, status, &description, Utc::now())
            .await?;
        let elapsed_ms = started.elapsed().as_millis() as i64;
        self.jobs.finish_job(job.id, Utc::now(), elapsed_ms).await?;

        metrics::counter!("report_jobs_total", "status" => status.to_string()).increment(1);
        match &outcome {
            Ok(()) => info!(report_id = report.id, job_id = job.id, elapsed_ms, "Job succeeded"),
            Err(e) => error!(
                report_id = report.id,
                job_id = job.id,
                elapsed_ms,
                error = %e,
                "Job failed"
            ),
        }

        self.job_detail(report.org_id, job.id).await
    }

    async fn execute_steps(
        &self,
        report: &ReportDefinition,
        job: &JobExecution,
    ) -> Result<(), ReportError> {
        let opts = self.render_options(report, None).await;
        let artifact = self.dispatcher.render(opts).await?.into_result()?;
        self.jobs
            .append_status(
                job.id,
                StatusCode::Rendered,
                &format!("Rendered {} ({} bytes)", artifact.file_name, artifact.size),
                Utc::now(),
            )
            .await?;

        let result = self.archive_and_deliver(report, job, &artifact).await;
        artifact.discard().await;
        result
    }

    async fn archive_and_deliver(
        &self,
        report: &ReportDefinition,
        job: &JobExecution,
        artifact: &Artifact,
    ) -> Result<(), ReportError> {
        if let Some((key, version)) = self.delivery.archive(report, job.id, artifact).await? {
            self.jobs.attach_artifact(job.id, &key, &version).await?;
            self.jobs
                .append_status(
                    job.id,
                    StatusCode::Archived,
                    &format!("Stored as {} version {}", key, version),
                    Utc::now(),
                )
                .await?;
        }
        self.delivery.deliver(report, artifact).await?;
        Ok(())
    }

    /// Derived state of a report's most recent job.
    pub async fn report_state(&self, org_id: i64, report_id: i64) -> Result<JobState, ReportError> {
        let latest = self.jobs.latest_job(org_id, report_id).await?;
        let events = match &latest {
            Some(job) => self.jobs.list_statuses(job.id).await?,
            None => Vec::new(),
        };
        Ok(derive_from_history(
            latest.as_ref(),
            &events,
            Utc::now(),
            self.settings.stale_after,
        ))
    }

    /// Page of a report's jobs, newest first.
    ///
    /// Works for deleted reports too: history outlives its definition.
    pub async fn list_history(
        &self,
        org_id: i64,
        report_id: i64,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<ReportHistory, ReportError> {
        let cursor = cursor
            .map(JobCursor::decode)
            .transpose()
            .map_err(|e| ReportError::Validation(e.to_string()))?;
        let limit = clamp_page_size(limit);

        let rows = self
            .jobs
            .list_jobs(org_id, report_id, cursor.as_ref(), limit + 1)
            .await?;
        let mut details = Vec::with_capacity(rows.len());
        for job in rows {
            details.push(self.detail_of(job).await?);
        }

        Ok(ReportHistory {
            report_id,
            state: self.report_state(org_id, report_id).await?,
            jobs: Page::from_overfetch(details, limit, |d| {
                JobCursor::new(d.job.started_at, d.job.id)
            }),
        })
    }

    async fn detail_of(&self, job: JobExecution) -> Result<JobDetail, ReportError> {
        let events = self.jobs.list_statuses(job.id).await?;
        let state = derive_from_history(Some(&job), &events, Utc::now(), self.settings.stale_after);
        Ok(JobDetail { job, state, events })
    }

    pub async fn job_detail(&self, org_id: i64, job_id: i64) -> Result<JobDetail, ReportError> {
        let job = self
            .jobs
            .find_job(org_id, job_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("job {}", job_id)))?;
        self.detail_of(job).await
    }

    /// Flag a job as deleted; the row and its history stay.
    pub async fn delete_job(&self, org_id: i64, job_id: i64) -> Result<(), ReportError> {
        if !self.jobs.mark_deleted(org_id, job_id).await? {
            return Err(ReportError::NotFound(format!("job {}", job_id)));
        }
        info!(org_id, job_id, "Marked job deleted");
        Ok(())
    }

    pub async fn download_link(
        &self,
        org_id: i64,
        job_id: i64,
    ) -> Result<crate::models::DownloadLink, ReportError> {
        let job = self
            .jobs
            .find_job(org_id, job_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("job {}", job_id)))?;
        self.delivery.download_link(&job).await
    }
}
