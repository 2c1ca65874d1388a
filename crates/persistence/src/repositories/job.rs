//! Job execution repository (`job_queue` + `job_status`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::pagination::JobCursor;
use sqlx::PgPool;

use domain::error::RepositoryError;
use domain::models::{JobExecution, JobStatusEvent, StatusCode};
use domain::repositories::JobRepository;

use crate::entities::{JobEntity, JobStatusEntity};
use crate::metrics::QueryTimer;

/// Postgres-backed [`JobRepository`].
#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    /// Creates a new PgJobRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert_job(
        &self,
        report_id: i64,
        org_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<JobExecution, RepositoryError> {
        let timer = QueryTimer::new("insert_job");
        let row = sqlx::query_as::<_, JobEntity>(
            r#"
            INSERT INTO job_queue (report_id, org_id, started_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(report_id)
        .bind(org_id)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await?;
        timer.record();
        Ok(row.into())
    }

    async fn finish_job(
        &self,
        job_id: i64,
        finished_at: DateTime<Utc>,
        elapsed_ms: i64,
    ) -> Result<(), RepositoryError> {
        let timer = QueryTimer::new("finish_job");
        sqlx::query("UPDATE job_queue SET finished_at = $2, elapsed_ms = $3 WHERE id = $1")
            .bind(job_id)
            .bind(finished_at)
            .bind(elapsed_ms)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(())
    }

    async fn attach_artifact(
        &self,
        job_id: i64,
        storage_key: &str,
        storage_version: &str,
    ) -> Result<(), RepositoryError> {
        let timer = QueryTimer::new("attach_job_artifact");
        sqlx::query("UPDATE job_queue SET storage_key = $2, storage_version = $3 WHERE id = $1")
            .bind(job_id)
            .bind(storage_key)
            .bind(storage_version)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(())
    }

    async fn append_status(
        &self,
        job_id: i64,
        status: StatusCode,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<JobStatusEvent, RepositoryError> {
        let timer = QueryTimer::new("append_job_status");
        let row = sqlx::query_as::<_, JobStatusEntity>(
            r#"
            INSERT INTO job_status (job_id, created_at, status, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(at)
        .bind(status.to_string())
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        timer.record();
        row.try_into()
    }

    async fn find_job(
        &self,
        org_id: i64,
        job_id: i64,
    ) -> Result<Option<JobExecution>, RepositoryError> {
        let timer = QueryTimer::new("find_job");
        let row = sqlx::query_as::<_, JobEntity>(
            "SELECT * FROM job_queue WHERE org_id = $1 AND id = $2 AND NOT deleted",
        )
        .bind(org_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        timer.record();
        Ok(row.map(Into::into))
    }

    async fn list_jobs(
        &self,
        org_id: i64,
        report_id: i64,
        cursor: Option<&JobCursor>,
        limit: i64,
    ) -> Result<Vec<JobExecution>, RepositoryError> {
        let timer = QueryTimer::new("list_jobs");
        let rows = sqlx::query_as::<_, JobEntity>(
            r#"
            SELECT * FROM job_queue
            WHERE org_id = $1 AND report_id = $2 AND NOT deleted
              AND ($3::TIMESTAMPTZ IS NULL OR (started_at, id) < ($3, $4))
            ORDER BY started_at DESC, id DESC
            LIMIT $5
            "#,
        )
        .bind(org_id)
        .bind(report_id)
        .bind(cursor.map(|c| c.started_at))
        .bind(cursor.map(|c| c.job_id).unwrap_or(0))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        timer.record();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn latest_job(
        &self,
        org_id: i64,
        report_id: i64,
    ) -> Result<Option<JobExecution>, RepositoryError> {
        let timer = QueryTimer::new("latest_job");
        let row = sqlx::query_as::<_, JobEntity>(
            r#"
            SELECT * FROM job_queue
            WHERE org_id = $1 AND report_id = $2 AND NOT deleted
            ORDER BY started_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?;
        timer.record();
        Ok(row.map(Into::into))
    }

    async fn list_statuses(&self, job_id: i64) -> Result<Vec<JobStatusEvent>, RepositoryError> {
        let timer = QueryTimer::new("list_job_statuses");
        let rows = sqlx::query_as::<_, JobStatusEntity>(
            "SELECT * FROM job_status WHERE job_id = $1 ORDER BY created_at, id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        timer.record();
        rows.into_iter().map(JobStatusEvent::try_from).collect()
    }

    async fn mark_deleted(&self, org_id: i64, job_id: i64) -> Result<bool, RepositoryError> {
        let timer = QueryTimer::new("mark_job_deleted");
        let result = sqlx::query(
            "UPDATE job_queue SET deleted = TRUE WHERE org_id = $1 AND id = $2 AND NOT deleted",
        )
            .bind(org_id)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }
}
