//! Report definition repository (`report_data` + `report_scheduler`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use domain::error::RepositoryError;
use domain::models::{NewReport, ReportDefinition, ReportQuery, UpdateReportRequest};
use domain::repositories::ReportRepository;

use super::map_unique_violation;
use crate::entities::{ReportEntity, REPORT_COLUMNS};
use crate::metrics::QueryTimer;

/// Postgres-backed [`ReportRepository`].
#[derive(Clone)]
pub struct PgReportRepository {
    pool: PgPool,
}

impl PgReportRepository {
    /// Creates a new PgReportRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn select(filter: &str) -> String {
        format!(
            "SELECT {} FROM report_data r JOIN report_scheduler s ON s.report_id = r.id {}",
            REPORT_COLUMNS, filter
        )
    }
}

fn to_domain(rows: Vec<ReportEntity>) -> Result<Vec<ReportDefinition>, RepositoryError> {
    rows.into_iter().map(ReportDefinition::try_from).collect()
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn insert(&self, new: NewReport) -> Result<ReportDefinition, RepositoryError> {
        let timer = QueryTimer::new("insert_report");
        let req = &new.request;
        let mut tx = self.pool.begin().await?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO report_data (
                org_id, user_id, dashboard_id, dashboard_uid, name, format, layout,
                orientation, theme, time_from, time_to, filters, panel_id, delivery,
                stamp_date, stamp_time, enabled
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING id
            "#,
        )
        .bind(new.org_id)
        .bind(new.owner_user_id)
        .bind(req.dashboard_id)
        .bind(&req.dashboard_uid)
        .bind(&req.name)
        .bind(req.format.to_string())
        .bind(req.layout.to_string())
        .bind(req.orientation.to_string())
        .bind(req.theme.to_string())
        .bind(req.time_range.as_ref().map(|t| t.from.clone()))
        .bind(req.time_range.as_ref().map(|t| t.to.clone()))
        .bind(&req.filters)
        .bind(req.panel_id)
        .bind(Json(&req.delivery))
        .bind(req.file_name.stamp_date)
        .bind(req.file_name.stamp_time)
        .bind(req.enabled)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        sqlx::query(
            r#"
            INSERT INTO report_scheduler (report_id, cron, timezone, start_at, end_at, next_run_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&req.schedule.cron)
        .bind(&req.schedule.timezone)
        .bind(req.schedule.start_at)
        .bind(req.schedule.end_at)
        .bind(new.next_run_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();

        self.find_by_id(new.org_id, id)
            .await?
            .ok_or_else(|| RepositoryError::Corrupt(format!("report {} vanished after insert", id)))
    }

    async fn update(
        &self,
        org_id: i64,
        id: i64,
        req: &UpdateReportRequest,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Option<ReportDefinition>, RepositoryError> {
        let timer = QueryTimer::new("update_report");
        let mut tx = self.pool.begin().await?;

        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE report_data SET
                name = $3,
                format = $4,
                layout = $5,
                orientation = $6,
                theme = $7,
                time_from = $8,
                time_to = $9,
                filters = $10,
                panel_id = $11,
                delivery = $12,
                stamp_date = $13,
                stamp_time = $14,
                enabled = $15,
                updated_at = NOW()
            WHERE org_id = $1 AND id = $2
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(id)
        .bind(&req.name)
        .bind(req.format.to_string())
        .bind(req.layout.to_string())
        .bind(req.orientation.to_string())
        .bind(req.theme.to_string())
        .bind(req.time_range.as_ref().map(|t| t.from.clone()))
        .bind(req.time_range.as_ref().map(|t| t.to.clone()))
        .bind(&req.filters)
        .bind(req.panel_id)
        .bind(Json(&req.delivery))
        .bind(req.file_name.stamp_date)
        .bind(req.file_name.stamp_time)
        .bind(req.enabled)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        if updated.is_none() {
            timer.record();
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE report_scheduler SET
                cron = $2, timezone = $3, start_at = $4, end_at = $5, next_run_at = $6
            WHERE report_id = $1
            "#,
        )
        .bind(id)
        .bind(&req.schedule.cron)
        .bind(&req.schedule.timezone)
        .bind(req.schedule.start_at)
        .bind(req.schedule.end_at)
        .bind(next_run_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        self.find_by_id(org_id, id).await
    }

    async fn find_by_id(
        &self,
        org_id: i64,
        id: i64,
    ) -> Result<Option<ReportDefinition>, RepositoryError> {
        let timer = QueryTimer::new("find_report_by_id");
        let sql = Self::select("WHERE r.org_id = $1 AND r.id = $2");
        let row = sqlx::query_as::<_, ReportEntity>(&sql)
            .bind(org_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        timer.record();
        row.map(ReportDefinition::try_from).transpose()
    }

    async fn find_by_name(
        &self,
        org_id: i64,
        owner_user_id: i64,
        dashboard_id: i64,
        name: &str,
    ) -> Result<Option<ReportDefinition>, RepositoryError> {
        let timer = QueryTimer::new("find_report_by_name");
        let sql = Self::select(
            "WHERE r.org_id = $1 AND r.user_id = $2 AND r.dashboard_id = $3 AND r.name = $4",
        );
        let row = sqlx::query_as::<_, ReportEntity>(&sql)
            .bind(org_id)
            .bind(owner_user_id)
            .bind(dashboard_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        timer.record();
        row.map(ReportDefinition::try_from).transpose()
    }

    async fn find_by_dashboard_ids(
        &self,
        org_id: i64,
        dashboard_ids: &[i64],
    ) -> Result<Vec<ReportDefinition>, RepositoryError> {
        let timer = QueryTimer::new("find_reports_by_dashboards");
        let sql = Self::select("WHERE r.org_id = $1 AND r.dashboard_id = ANY($2) ORDER BY r.id");
        let rows = sqlx::query_as::<_, ReportEntity>(&sql)
            .bind(org_id)
            .bind(dashboard_ids)
            .fetch_all(&self.pool)
            .await?;
        timer.record();
        to_domain(rows)
    }

    async fn search(&self, query: &ReportQuery) -> Result<Vec<ReportDefinition>, RepositoryError> {
        let timer = QueryTimer::new("search_reports");
        let sql = Self::select(
            r#"
            WHERE r.org_id = $1
              AND ($2::BIGINT IS NULL OR r.user_id = $2)
              AND ($3::BIGINT IS NULL OR r.dashboard_id = $3)
              AND ($4::TEXT IS NULL OR r.name ILIKE '%' || $4 || '%')
            ORDER BY r.name, r.id
            "#,
        );
        let rows = sqlx::query_as::<_, ReportEntity>(&sql)
            .bind(query.org_id)
            .bind(query.user_id)
            .bind(query.dashboard_id)
            .bind(query.name.as_deref())
            .fetch_all(&self.pool)
            .await?;
        timer.record();
        to_domain(rows)
    }

    async fn count_by_org(&self, org_id: i64) -> Result<i64, RepositoryError> {
        let timer = QueryTimer::new("count_reports_by_org");
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM report_data WHERE org_id = $1")
            .bind(org_id)
            .fetch_one(&self.pool)
            .await?;
        timer.record();
        Ok(count.0)
    }

    async fn enable(
        &self,
        org_id: i64,
        id: i64,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let timer = QueryTimer::new("enable_report");
        let result = sqlx::query(
            r#"
            WITH r AS (
                UPDATE report_data SET enabled = TRUE, updated_at = NOW()
                WHERE org_id = $1 AND id = $2
                RETURNING id
            )
            UPDATE report_scheduler s SET next_run_at = $3
            FROM r WHERE s.report_id = r.id
            "#,
        )
        .bind(org_id)
        .bind(id)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }

    async fn disable(&self, org_id: i64, ids: &[i64]) -> Result<u64, RepositoryError> {
        let timer = QueryTimer::new("disable_reports");
        let result = sqlx::query(
            r#"
            UPDATE report_data SET enabled = FALSE, updated_at = NOW()
            WHERE org_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(org_id)
        .bind(ids)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    async fn delete(&self, org_id: i64, ids: &[i64]) -> Result<u64, RepositoryError> {
        let timer = QueryTimer::new("delete_reports");
        let result = sqlx::query("DELETE FROM report_data WHERE org_id = $1 AND id = ANY($2)")
            .bind(org_id)
            .bind(ids)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReportDefinition>, RepositoryError> {
        let timer = QueryTimer::new("find_due_reports");
        let sql = Self::select(
            "WHERE r.enabled AND s.next_run_at <= $1 ORDER BY s.next_run_at, r.id LIMIT $2",
        );
        let rows = sqlx::query_as::<_, ReportEntity>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        timer.record();
        to_domain(rows)
    }

    async fn mark_run(
        &self,
        id: i64,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let timer = QueryTimer::new("mark_report_run");
        sqlx::query(
            "UPDATE report_scheduler SET last_run_at = $2, next_run_at = $3 WHERE report_id = $1",
        )
        .bind(id)
        .bind(last_run_at)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(())
    }

    async fn reschedule(
        &self,
        id: i64,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let timer = QueryTimer::new("reschedule_report");
        sqlx::query("UPDATE report_scheduler SET next_run_at = $2 WHERE report_id = $1")
            .bind(id)
            .bind(next_run_at)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(())
    }
}
