//! Storage seams of the report scheduler.
//!
//! The `persistence` crate implements these traits over Postgres; the
//! in-memory versions in [`memory`] back unit tests and local development.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::pagination::JobCursor;

use crate::error::RepositoryError;
use crate::models::{
    JobExecution, JobStatusEvent, NewReport, ReportDefinition, ReportQuery, StatusCode,
    TenantQuota, UpdateReportRequest,
};

pub use memory::{InMemoryJobRepository, InMemoryReportRepository, InMemoryTenantRepository};

/// Report definitions and their schedule rows (`report_data` + `report_scheduler`).
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Insert a definition together with its schedule.
    ///
    /// Fails with [`RepositoryError::UniqueViolation`] when
    /// `(org, owner, dashboard, name)` already exists.
    async fn insert(&self, report: NewReport) -> Result<ReportDefinition, RepositoryError>;

    /// Overwrite the mutable fields of a definition.
    async fn update(
        &self,
        org_id: i64,
        id: i64,
        request: &UpdateReportRequest,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Option<ReportDefinition>, RepositoryError>;

    async fn find_by_id(
        &self,
        org_id: i64,
        id: i64,
    ) -> Result<Option<ReportDefinition>, RepositoryError>;

    async fn find_by_name(
        &self,
        org_id: i64,
        owner_user_id: i64,
        dashboard_id: i64,
        name: &str,
    ) -> Result<Option<ReportDefinition>, RepositoryError>;

    async fn find_by_dashboard_ids(
        &self,
        org_id: i64,
        dashboard_ids: &[i64],
    ) -> Result<Vec<ReportDefinition>, RepositoryError>;

    async fn search(&self, query: &ReportQuery) -> Result<Vec<ReportDefinition>, RepositoryError>;

    /// Number of definitions that exist for the org, enabled or not.
    async fn count_by_org(&self, org_id: i64) -> Result<i64, RepositoryError>;

    /// Set `enabled = true` and overwrite `next_run_at`.
    async fn enable(
        &self,
        org_id: i64,
        id: i64,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Set `enabled = false`; `next_run_at` is left as is.
    async fn disable(&self, org_id: i64, ids: &[i64]) -> Result<u64, RepositoryError>;

    /// Delete definitions and their schedules. Job history is untouched.
    async fn delete(&self, org_id: i64, ids: &[i64]) -> Result<u64, RepositoryError>;

    /// Enabled definitions whose `next_run_at` is at or before `now`, oldest first.
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReportDefinition>, RepositoryError>;

    /// Record a fire: set `last_run_at` and advance `next_run_at`.
    async fn mark_run(
        &self,
        id: i64,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;

    /// Move `next_run_at` without recording a fire; `None` stops polling.
    async fn reschedule(
        &self,
        id: i64,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;
}

/// Job executions and their status history (`job_queue` + `job_status`).
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert_job(
        &self,
        report_id: i64,
        org_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<JobExecution, RepositoryError>;

    async fn finish_job(
        &self,
        job_id: i64,
        finished_at: DateTime<Utc>,
        elapsed_ms: i64,
    ) -> Result<(), RepositoryError>;

    async fn attach_artifact(
        &self,
        job_id: i64,
        storage_key: &str,
        storage_version: &str,
    ) -> Result<(), RepositoryError>;

    async fn append_status(
        &self,
        job_id: i64,
        status: StatusCode,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<JobStatusEvent, RepositoryError>;

    /// A job of `org_id`; deleted jobs are not returned.
    async fn find_job(
        &self,
        org_id: i64,
        job_id: i64,
    ) -> Result<Option<JobExecution>, RepositoryError>;

    /// Non-deleted jobs of a report, newest first, strictly after `cursor`.
    async fn list_jobs(
        &self,
        org_id: i64,
        report_id: i64,
        cursor: Option<&JobCursor>,
        limit: i64,
    ) -> Result<Vec<JobExecution>, RepositoryError>;

    async fn latest_job(
        &self,
        org_id: i64,
        report_id: i64,
    ) -> Result<Option<JobExecution>, RepositoryError>;

    /// Status history of a job, oldest first.
    async fn list_statuses(&self, job_id: i64) -> Result<Vec<JobStatusEvent>, RepositoryError>;

    /// Flag a live job as deleted; `false` when absent or already deleted.
    async fn mark_deleted(&self, org_id: i64, job_id: i64) -> Result<bool, RepositoryError>;
}

/// Cached tenant quotas (`report_tenant_details`).
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find(&self, org_id: i64) -> Result<Option<TenantQuota>, RepositoryError>;

    async fn upsert(&self, quota: &TenantQuota) -> Result<TenantQuota, RepositoryError>;

    async fn delete(&self, org_id: i64) -> Result<bool, RepositoryError>;
}
