//! Tenant quota repository (`report_tenant_details`).

use async_trait::async_trait;
use sqlx::PgPool;

use domain::error::RepositoryError;
use domain::models::TenantQuota;
use domain::repositories::TenantRepository;

use crate::entities::TenantEntity;
use crate::metrics::QueryTimer;

/// Postgres-backed [`TenantRepository`].
#[derive(Clone)]
pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn find(&self, org_id: i64) -> Result<Option<TenantQuota>, RepositoryError> {
        let timer = QueryTimer::new("find_tenant_quota");
        let row = sqlx::query_as::<_, TenantEntity>(
            "SELECT * FROM report_tenant_details WHERE org_id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        timer.record();
        Ok(row.map(Into::into))
    }

    async fn upsert(&self, quota: &TenantQuota) -> Result<TenantQuota, RepositoryError> {
        let timer = QueryTimer::new("upsert_tenant_quota");
        let row = sqlx::query_as::<_, TenantEntity>(
            r#"
            INSERT INTO report_tenant_details (org_id, subscription, max_reports, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (org_id) DO UPDATE SET
                subscription = EXCLUDED.subscription,
                max_reports = EXCLUDED.max_reports,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(quota.org_id)
        .bind(&quota.subscription)
        .bind(quota.max_reports)
        .bind(quota.updated_at)
        .fetch_one(&self.pool)
        .await?;
        timer.record();
        Ok(row.into())
    }

    async fn delete(&self, org_id: i64) -> Result<bool, RepositoryError> {
        let timer = QueryTimer::new("delete_tenant_quota");
        let result = sqlx::query("DELETE FROM report_tenant_details WHERE org_id = $1")
            .bind(org_id)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }
}
