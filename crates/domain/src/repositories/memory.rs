//! In-memory repositories for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::pagination::JobCursor;
use tokio::sync::Mutex;

use super::{JobRepository, ReportRepository, TenantRepository};
use crate::error::RepositoryError;
use crate::models::{
    JobExecution, JobStatusEvent, NewReport, ReportDefinition, ReportQuery, StatusCode,
    TenantQuota, UpdateReportRequest,
};

/// Report store backed by a map keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryReportRepository {
    reports: Mutex<HashMap<i64, ReportDefinition>>,
    next_id: AtomicI64,
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed definition, bypassing uniqueness checks.
    pub async fn put(&self, report: ReportDefinition) {
        self.next_id.fetch_max(report.id, Ordering::SeqCst);
        self.reports.lock().await.insert(report.id, report);
    }

    pub async fn count(&self) -> usize {
        self.reports.lock().await.len()
    }
}

fn same_key(a: &ReportDefinition, org_id: i64, owner: i64, dashboard: i64, name: &str) -> bool {
    a.org_id == org_id && a.owner_user_id == owner && a.dashboard_id == dashboard && a.name == name
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn insert(&self, new: NewReport) -> Result<ReportDefinition, RepositoryError> {
        let mut reports = self.reports.lock().await;
        let req = new.request;
        if reports.values().any(|r| {
            same_key(r, new.org_id, new.owner_user_id, req.dashboard_id, &req.name)
        }) {
            return Err(RepositoryError::UniqueViolation(
                "report_data_org_user_dashboard_name".into(),
            ));
        }

        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let report = ReportDefinition {
            id,
            org_id: new.org_id,
            owner_user_id: new.owner_user_id,
            dashboard_id: req.dashboard_id,
            dashboard_uid: req.dashboard_uid,
            name: req.name,
            format: req.format,
            layout: req.layout,
            orientation: req.orientation,
            theme: req.theme,
            time_range: req.time_range,
            filters: req.filters,
            panel_id: req.panel_id,
            delivery: req.delivery,
            file_name: req.file_name,
            enabled: req.enabled,
            schedule: req.schedule,
            next_run_at: new.next_run_at,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        };
        reports.insert(id, report.clone());
        Ok(report)
    }

    async fn update(
        &self,
        org_id: i64,
        id: i64,
        req: &UpdateReportRequest,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Option<ReportDefinition>, RepositoryError> {
        let mut reports = self.reports.lock().await;
        let Some(existing) = reports.get(&id).filter(|r| r.org_id == org_id).cloned() else {
            return Ok(None);
        };
        if reports.values().any(|r| {
            r.id != id
                && same_key(r, org_id, existing.owner_user_id, existing.dashboard_id, &req.name)
        }) {
            return Err(RepositoryError::UniqueViolation(
                "report_data_org_user_dashboard_name".into(),
            ));
        }

        let report = ReportDefinition {
            name: req.name.clone(),
            format: req.format,
            layout: req.layout,
            orientation: req.orientation,
            theme: req.theme,
            time_range: req.time_range.clone(),
            filters: req.filters.clone(),
            panel_id: req.panel_id,
            delivery: req.delivery.clone(),
            file_name: req.file_name,
            enabled: req.enabled,
            schedule: req.schedule.clone(),
            next_run_at,
            updated_at: Utc::now(),
            ..existing
        };
        reports.insert(id, report.clone());
        Ok(Some(report))
    }

    async fn find_by_id(
        &self,
        org_id: i64,
        id: i64,
    ) -> Result<Option<ReportDefinition>, RepositoryError> {
        let reports = self.reports.lock().await;
        Ok(reports.get(&id).filter(|r| r.org_id == org_id).cloned())
    }

    async fn find_by_name(
        &self,
        org_id: i64,
        owner_user_id: i64,
        dashboard_id: i64,
        name: &str,
    ) -> Result<Option<ReportDefinition>, RepositoryError> {
        let reports = self.reports.lock().await;
        Ok(reports
            .values()
            .find(|r| same_key(r, org_id, owner_user_id, dashboard_id, name))
            .cloned())
    }

    async fn find_by_dashboard_ids(
        &self,
        org_id: i64,
        dashboard_ids: &[i64],
    ) -> Result<Vec<ReportDefinition>, RepositoryError> {
        let reports = self.reports.lock().await;
        let mut found: Vec<_> = reports
            .values()
            .filter(|r| r.org_id == org_id && dashboard_ids.contains(&r.dashboard_id))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    async fn search(&self, query: &ReportQuery) -> Result<Vec<ReportDefinition>, RepositoryError> {
        let reports = self.reports.lock().await;
        let mut found: Vec<_> = reports.values().filter(|r| query.matches(r)).cloned().collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn count_by_org(&self, org_id: i64) -> Result<i64, RepositoryError> {
        let reports = self.reports.lock().await;
        Ok(reports.values().filter(|r| r.org_id == org_id).count() as i64)
    }

    async fn enable(
        &self,
        org_id: i64,
        id: i64,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut reports = self.reports.lock().await;
        match reports.get_mut(&id).filter(|r| r.org_id == org_id) {
            Some(report) => {
                report.enabled = true;
                report.next_run_at = Some(next_run_at);
                report.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn disable(&self, org_id: i64, ids: &[i64]) -> Result<u64, RepositoryError> {
        let mut reports = self.reports.lock().await;
        let mut changed = 0;
        for report in reports.values_mut() {
            if report.org_id == org_id && ids.contains(&report.id) {
                report.enabled = false;
                report.updated_at = Utc::now();
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, org_id: i64, ids: &[i64]) -> Result<u64, RepositoryError> {
        let mut reports = self.reports.lock().await;
        let before = reports.len();
        reports.retain(|id, r| !(r.org_id == org_id && ids.contains(id)));
        Ok((before - reports.len()) as u64)
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReportDefinition>, RepositoryError> {
        let reports = self.reports.lock().await;
        let mut due: Vec<_> = reports
            .values()
            .filter(|r| r.enabled && r.next_run_at.map_or(false, |next| next <= now))
            .cloned()
            .collect();
        due.sort_by_key(|r| (r.next_run_at, r.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_run(
        &self,
        id: i64,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let mut reports = self.reports.lock().await;
        if let Some(report) = reports.get_mut(&id) {
            report.last_run_at = Some(last_run_at);
            report.next_run_at = next_run_at;
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: i64,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        if let Some(report) = self.reports.lock().await.get_mut(&id) {
            report.next_run_at = next_run_at;
        }
        Ok(())
    }
}

/// Job store backed by vectors; ids are assigned sequentially.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<Vec<JobExecution>>,
    statuses: Mutex<Vec<JobStatusEvent>>,
    next_job_id: AtomicI64,
    next_status_id: AtomicI64,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed job, e.g. one that started in the past.
    pub async fn put_job(&self, job: JobExecution) {
        self.next_job_id.fetch_max(job.id, Ordering::SeqCst);
        self.jobs.lock().await.push(job);
    }

    /// Every stored job, deleted ones included.
    pub async fn jobs(&self) -> Vec<JobExecution> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert_job(
        &self,
        report_id: i64,
        org_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<JobExecution, RepositoryError> {
        let job = JobExecution {
            id: self.next_job_id.fetch_add(1, Ordering::SeqCst) + 1,
            report_id,
            org_id,
            started_at,
            finished_at: None,
            elapsed_ms: None,
            storage_key: None,
            storage_version: None,
            deleted: false,
        };
        self.jobs.lock().await.push(job.clone());
        Ok(job)
    }

    async fn finish_job(
        &self,
        job_id: i64,
        finished_at: DateTime<Utc>,
        elapsed_ms: i64,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.finished_at = Some(finished_at);
            job.elapsed_ms = Some(elapsed_ms);
        }
        Ok(())
    }

    async fn attach_artifact(
        &self,
        job_id: i64,
        storage_key: &str,
        storage_version: &str,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.storage_key = Some(storage_key.to_string());
            job.storage_version = Some(storage_version.to_string());
        }
        Ok(())
    }

    async fn append_status(
        &self,
        job_id: i64,
        status: StatusCode,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<JobStatusEvent, RepositoryError> {
        let event = JobStatusEvent {
            id: self.next_status_id.fetch_add(1, Ordering::SeqCst) + 1,
            job_id,
            timestamp: at,
            status,
            description: description.to_string(),
        };
        self.statuses.lock().await.push(event.clone());
        Ok(event)
    }

    async fn find_job(
        &self,
        org_id: i64,
        job_id: i64,
    ) -> Result<Option<JobExecution>, RepositoryError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .iter()
            .find(|j| j.id == job_id && j.org_id == org_id && !j.deleted)
            .cloned())
    }

    async fn list_jobs(
        &self,
        org_id: i64,
        report_id: i64,
        cursor: Option<&JobCursor>,
        limit: i64,
    ) -> Result<Vec<JobExecution>, RepositoryError> {
        let jobs = self.jobs.lock().await;
        let mut found: Vec<_> = jobs
            .iter()
            .filter(|j| j.org_id == org_id && j.report_id == report_id && !j.deleted)
            .filter(|j| cursor.map_or(true, |c| c.precedes(j.started_at, j.id)))
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn latest_job(
        &self,
        org_id: i64,
        report_id: i64,
    ) -> Result<Option<JobExecution>, RepositoryError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .iter()
            .filter(|j| j.org_id == org_id && j.report_id == report_id && !j.deleted)
            .max_by_key(|j| (j.started_at, j.id))
            .cloned())
    }

    async fn list_statuses(&self, job_id: i64) -> Result<Vec<JobStatusEvent>, RepositoryError> {
        let statuses = self.statuses.lock().await;
        let mut found: Vec<_> = statuses.iter().filter(|s| s.job_id == job_id).cloned().collect();
        found.sort_by_key(|s| (s.timestamp, s.id));
        Ok(found)
    }

    async fn mark_deleted(&self, org_id: i64, job_id: i64) -> Result<bool, RepositoryError> {
        let mut jobs = self.jobs.lock().await;
        match jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.org_id == org_id && !j.deleted)
        {
            Some(job) => {
                job.deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Tenant quota cache backed by a map keyed by org.
#[derive(Debug, Default)]
pub struct InMemoryTenantRepository {
    quotas: Mutex<HashMap<i64, TenantQuota>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find(&self, org_id: i64) -> Result<Option<TenantQuota>, RepositoryError> {
        Ok(self.quotas.lock().await.get(&org_id).cloned())
    }

    async fn upsert(&self, quota: &TenantQuota) -> Result<TenantQuota, RepositoryError> {
        self.quotas.lock().await.insert(quota.org_id, quota.clone());
        Ok(quota.clone())
    }

    async fn delete(&self, org_id: i64) -> Result<bool, RepositoryError> {
        Ok(self.quotas.lock().await.remove(&org_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::report::fixtures::create_request;
    use chrono::Duration;

    fn new_report(name: &str, dashboard_id: i64) -> NewReport {
        NewReport {
            org_id: 1,
            owner_user_id: 10,
            request: create_request(name, dashboard_id),
            next_run_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_key() {
        let repo = InMemoryReportRepository::new();
        repo.insert(new_report("Weekly", 1)).await.unwrap();

        let err = repo.insert(new_report("Weekly", 1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueViolation(_)));

        // Same name on another dashboard is fine.
        assert!(repo.insert(new_report("Weekly", 2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_disable_keeps_next_run() {
        let repo = InMemoryReportRepository::new();
        let report = repo.insert(new_report("Weekly", 1)).await.unwrap();

        assert_eq!(repo.disable(1, &[report.id]).await.unwrap(), 1);
        let stored = repo.find_by_id(1, report.id).await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.next_run_at, report.next_run_at);
    }

    #[tokio::test]
    async fn test_find_by_id_is_org_scoped() {
        let repo = InMemoryReportRepository::new();
        let report = repo.insert(new_report("Weekly", 1)).await.unwrap();
        assert!(repo.find_by_id(2, report.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_jobs_cursor_pages_newest_first() {
        let repo = InMemoryJobRepository::new();
        let base = Utc::now() - Duration::hours(1);
        for i in 0..5 {
            repo.insert_job(7, 1, base + Duration::minutes(i)).await.unwrap();
        }

        let first = repo.list_jobs(1, 7, None, 2).await.unwrap();
        assert_eq!(first.iter().map(|j| j.id).collect::<Vec<_>>(), vec![5, 4]);

        let cursor = JobCursor::new(first[1].started_at, first[1].id);
        let second = repo.list_jobs(1, 7, Some(&cursor), 2).await.unwrap();
        assert_eq!(second.iter().map(|j| j.id).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[tokio::test]
    async fn test_deleted_jobs_hidden_from_listing_and_lookup() {
        let repo = InMemoryJobRepository::new();
        let job = repo.insert_job(7, 1, Utc::now()).await.unwrap();
        assert!(repo.find_job(1, job.id).await.unwrap().is_some());
        assert!(repo.mark_deleted(1, job.id).await.unwrap());

        assert!(repo.list_jobs(1, 7, None, 10).await.unwrap().is_empty());
        assert!(repo.find_job(1, job.id).await.unwrap().is_none());
    }
}
