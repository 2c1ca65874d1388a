//! Report definition lifecycle: create, edit, enable/disable, delete, lookup.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use validator::Validate;

use crate::error::ReportError;
use crate::models::{
    CreateReportRequest, NewReport, ReportDefinition, ReportQuery, UpdateReportRequest,
};
use crate::repositories::ReportRepository;
use crate::services::quota::QuotaGuard;
use crate::services::schedule::next_run_for;

/// Business rules around report definitions.
#[derive(Clone)]
pub struct ReportService {
    reports: Arc<dyn ReportRepository>,
    quota: QuotaGuard,
}

impl ReportService {
    pub fn new(reports: Arc<dyn ReportRepository>, quota: QuotaGuard) -> Self {
        Self { reports, quota }
    }

    /// Create a definition owned by `user_id`.
    ///
    /// Checks, in order: payload validation, schedule, quota, name uniqueness.
    pub async fn create(
        &self,
        org_id: i64,
        user_id: i64,
        request: CreateReportRequest,
    ) -> Result<ReportDefinition, ReportError> {
        request.validate()?;
        let next_run_at = next_run_for(&request.schedule, Utc::now())?;

        self.quota.check(org_id).await?;

        if self
            .reports
            .find_by_name(org_id, user_id, request.dashboard_id, &request.name)
            .await?
            .is_some()
        {
            return Err(ReportError::NameAlreadyExists);
        }

        let report = self
            .reports
            .insert(NewReport {
                org_id,
                owner_user_id: user_id,
                request,
                next_run_at: Some(next_run_at),
            })
            .await?;

        info!(
            org_id,
            report_id = report.id,
            dashboard_id = report.dashboard_id,
            next_run_at = %next_run_at,
            "Created report"
        );
        Ok(report)
    }

    /// Replace the mutable fields of a definition.
    ///
    /// The dashboard reference is fixed at creation; a request naming a
    /// different dashboard fails with [`ReportError::EditNotAllowed`] and
    /// nothing is written.
    pub async fn update(
        &self,
        org_id: i64,
        id: i64,
        mut request: UpdateReportRequest,
    ) -> Result<ReportDefinition, ReportError> {
        request.validate()?;
        let existing = self.get(org_id, id).await?;
        // Responses never carry the FTP password, so edits usually send it blank.
        request.delivery.inherit_password(&existing.delivery);

        if request.dashboard_id != existing.dashboard_id {
            return Err(ReportError::EditNotAllowed);
        }

        if request.name != existing.name {
            let clash = self
                .reports
                .find_by_name(
                    org_id,
                    existing.owner_user_id,
                    existing.dashboard_id,
                    &request.name,
                )
                .await?;
            if clash.is_some_and(|other| other.id != id) {
                return Err(ReportError::NameAlreadyExists);
            }
        }

        let next_run_at = next_run_for(&request.schedule, Utc::now())?;
        let report = self
            .reports
            .update(org_id, id, &request, Some(next_run_at))
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("report {}", id)))?;

        info!(org_id, report_id = id, next_run_at = %next_run_at, "Updated report");
        Ok(report)
    }

    /// Delete definitions and their schedules. Job history is kept.
    pub async fn delete(&self, org_id: i64, ids: &[i64]) -> Result<u64, ReportError> {
        let deleted = self.reports.delete(org_id, ids).await?;
        info!(org_id, requested = ids.len(), deleted, "Deleted reports");
        Ok(deleted)
    }

    /// Enable definitions, recomputing `next_run_at` for each.
    ///
    /// Ids not visible to the org are skipped.
    pub async fn enable(&self, org_id: i64, ids: &[i64]) -> Result<u64, ReportError> {
        let now = Utc::now();
        let mut enabled = 0;
        for &id in ids {
            let Some(report) = self.reports.find_by_id(org_id, id).await? else {
                debug!(org_id, report_id = id, "Skipping unknown report on enable");
                continue;
            };
            let next_run_at = next_run_for(&report.schedule, now)?;
            if self.reports.enable(org_id, id, next_run_at).await? {
                enabled += 1;
            }
        }
        info!(org_id, enabled, "Enabled reports");
        Ok(enabled)
    }

    /// Disable definitions. `next_run_at` is left untouched.
    pub async fn disable(&self, org_id: i64, ids: &[i64]) -> Result<u64, ReportError> {
        let disabled = self.reports.disable(org_id, ids).await?;
        info!(org_id, disabled, "Disabled reports");
        Ok(disabled)
    }

    pub async fn get(&self, org_id: i64, id: i64) -> Result<ReportDefinition, ReportError> {
        self.reports
            .find_by_id(org_id, id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("report {}", id)))
    }

    pub async fn get_by_dashboard_ids(
        &self,
        org_id: i64,
        dashboard_ids: &[i64],
    ) -> Result<Vec<ReportDefinition>, ReportError> {
        if dashboard_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .reports
            .find_by_dashboard_ids(org_id, dashboard_ids)
            .await?)
    }

    pub async fn search(&self, query: &ReportQuery) -> Result<Vec<ReportDefinition>, ReportError> {
        Ok(self.reports.search(query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::report::fixtures::create_request;
    use crate::models::QuotaDefaults;
    use crate::repositories::{InMemoryReportRepository, InMemoryTenantRepository};
    use crate::services::quota::MockTenantService;
    use crate::services::schedule::next_run_at;
    use chrono::{DateTime, Duration};

    fn service_with(subscription: &str) -> (ReportService, Arc<InMemoryReportRepository>) {
        let reports = Arc::new(InMemoryReportRepository::new());
        let quota = QuotaGuard::new(
            Arc::new(InMemoryTenantRepository::new()),
            reports.clone(),
            Arc::new(MockTenantService::new(subscription)),
            QuotaDefaults::default(),
        );
        (ReportService::new(reports.clone(), quota), reports)
    }

    fn update_from(report: &ReportDefinition) -> UpdateReportRequest {
        UpdateReportRequest {
            name: report.name.clone(),
            dashboard_id: report.dashboard_id,
            format: report.format,
            layout: report.layout,
            orientation: report.orientation,
            theme: report.theme,
            time_range: report.time_range.clone(),
            filters: report.filters.clone(),
            panel_id: report.panel_id,
            delivery: report.delivery.clone(),
            file_name: report.file_name,
            enabled: report.enabled,
            schedule: report.schedule.clone(),
        }
    }

    #[tokio::test]
    async fn test_create_computes_next_run() {
        let (service, _) = service_with("enterprise");
        let before = Utc::now();
        let report = service
            .create(1, 10, create_request("Weekly Summary", 7))
            .await
            .unwrap();

        let next = report.next_run_at.unwrap();
        assert!(next > before);
        assert_eq!(
            next,
            next_run_at("0 9 * * 1", "America/New_York", before).unwrap()
        );
        assert_eq!(report.owner_user_id, 10);
        assert!(report.last_run_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let (service, repo) = service_with("enterprise");
        service.create(1, 10, create_request("Weekly", 7)).await.unwrap();

        let err = service
            .create(1, 10, create_request("Weekly", 7))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NameAlreadyExists));
        assert_eq!(repo.count().await, 1);

        // Another owner may reuse the name.
        assert!(service.create(1, 11, create_request("Weekly", 7)).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_schedule_rejected_before_persisting() {
        let (service, repo) = service_with("enterprise");
        let mut request = create_request("Weekly", 7);
        request.schedule.cron = "99 9 * * 1".into();

        let err = service.create(1, 10, request).await.unwrap_err();
        assert!(matches!(err, ReportError::InvalidCronExpression(_)));
        assert_eq!(repo.count().await, 0);
    }

    #[tokio::test]
    async fn test_update_changing_dashboard_not_allowed() {
        let (service, repo) = service_with("enterprise");
        let report = service.create(1, 10, create_request("Weekly", 7)).await.unwrap();

        let mut request = update_from(&report);
        request.dashboard_id = 8;
        request.name = "Renamed".into();
        let err = service.update(1, report.id, request).await.unwrap_err();
        assert!(matches!(err, ReportError::EditNotAllowed));

        let stored = repo.find_by_id(1, report.id).await.unwrap().unwrap();
        assert_eq!(stored, report);
    }

    #[tokio::test]
    async fn test_update_rename_checks_uniqueness() {
        let (service, _) = service_with("enterprise");
        service.create(1, 10, create_request("Daily", 7)).await.unwrap();
        let report = service.create(1, 10, create_request("Weekly", 7)).await.unwrap();

        let mut request = update_from(&report);
        request.name = "Daily".into();
        assert!(matches!(
            service.update(1, report.id, request).await,
            Err(ReportError::NameAlreadyExists)
        ));

        let mut request = update_from(&report);
        request.name = "Weekly v2".into();
        request.schedule.cron = "0 8 * * *".into();
        let updated = service.update(1, report.id, request).await.unwrap();
        assert_eq!(updated.name, "Weekly v2");
        assert_ne!(updated.next_run_at, report.next_run_at);
    }

    #[tokio::test]
    async fn test_enable_overwrites_next_run_and_disable_keeps_it() {
        let (service, repo) = service_with("enterprise");
        let report = service.create(1, 10, create_request("Weekly", 7)).await.unwrap();

        let stale: DateTime<Utc> = Utc::now() - Duration::days(30);
        repo.mark_run(report.id, stale, Some(stale)).await.unwrap();

        assert_eq!(service.disable(1, &[report.id]).await.unwrap(), 1);
        let disabled = service.get(1, report.id).await.unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.next_run_at, Some(stale));

        assert_eq!(service.enable(1, &[report.id, 999]).await.unwrap(), 1);
        let enabled = service.get(1, report.id).await.unwrap();
        assert!(enabled.enabled);
        assert!(enabled.next_run_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_trial_quota_scenario() {
        let (service, _) = service_with("trial");
        let mut ids = Vec::new();
        for i in 0..5 {
            let report = service
                .create(1, 10, create_request(&format!("r{}", i), 7))
                .await
                .unwrap();
            ids.push(report.id);
        }

        let err = service.create(1, 10, create_request("r5", 7)).await.unwrap_err();
        assert!(matches!(err, ReportError::QuotaExceeded { limit: 5, count: 5 }));

        assert_eq!(service.delete(1, &ids[..1]).await.unwrap(), 1);
        service.create(1, 10, create_request("r5", 7)).await.unwrap();
        let all = service
            .search(&ReportQuery {
                org_id: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_get_is_org_scoped() {
        let (service, _) = service_with("enterprise");
        let report = service.create(1, 10, create_request("Weekly", 7)).await.unwrap();
        assert!(matches!(
            service.get(2, report.id).await,
            Err(ReportError::NotFound(_))
        ));
        assert_eq!(
            service.get_by_dashboard_ids(1, &[7, 8]).await.unwrap().len(),
            1
        );
        assert!(service.get_by_dashboard_ids(1, &[]).await.unwrap().is_empty());
    }
}
