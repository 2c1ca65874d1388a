//! Tenant quota entity (`report_tenant_details`).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::TenantQuota;

#[derive(Debug, Clone, FromRow)]
pub struct TenantEntity {
    pub org_id: i64,
    pub subscription: String,
    pub max_reports: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<TenantEntity> for TenantQuota {
    fn from(entity: TenantEntity) -> Self {
        Self {
            org_id: entity.org_id,
            subscription: entity.subscription,
            max_reports: entity.max_reports,
            updated_at: entity.updated_at,
        }
    }
}
