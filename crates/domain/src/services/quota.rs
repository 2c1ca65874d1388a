//! Per-tenant report quotas.
//!
//! Quotas are cached in `report_tenant_details`. On first use the tenant's
//! subscription type is fetched from the tenant-management service and a
//! default limit is stored for it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use validator::Validate;

use crate::error::{CollaboratorError, ReportError};
use crate::models::{QuotaDefaults, SubscriptionType, TenantQuota, UpdateQuotaRequest};
use crate::repositories::{ReportRepository, TenantRepository};

/// External tenant-management service.
#[async_trait]
pub trait TenantService: Send + Sync {
    /// Subscription type string of the org (e.g. `trial`, `enterprise`).
    async fn subscription_type(&self, org_id: i64) -> Result<String, CollaboratorError>;
}

/// Enforces the maximum number of report definitions per org.
#[derive(Clone)]
pub struct QuotaGuard {
    tenants: Arc<dyn TenantRepository>,
    reports: Arc<dyn ReportRepository>,
    service: Arc<dyn TenantService>,
    defaults: QuotaDefaults,
}

impl QuotaGuard {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        reports: Arc<dyn ReportRepository>,
        service: Arc<dyn TenantService>,
        defaults: QuotaDefaults,
    ) -> Self {
        Self {
            tenants,
            reports,
            service,
            defaults,
        }
    }

    /// Cached quota of the org, bootstrapping it from the tenant service.
    pub async fn quota(&self, org_id: i64) -> Result<TenantQuota, ReportError> {
        if let Some(quota) = self.tenants.find(org_id).await? {
            return Ok(quota);
        }

        let raw = self.service.subscription_type(org_id).await.map_err(|e| {
            warn!(org_id, error = %e, "Tenant service lookup failed");
            ReportError::QuotaConfigMissing(e.to_string())
        })?;
        let subscription = SubscriptionType::parse(&raw);
        let quota = TenantQuota {
            org_id,
            max_reports: self.defaults.limit_for(&subscription),
            subscription: subscription.to_string(),
            updated_at: Utc::now(),
        };

        let stored = self.tenants.upsert(&quota).await?;
        info!(
            org_id,
            subscription = %stored.subscription,
            max_reports = stored.max_reports,
            "Bootstrapped tenant quota"
        );
        Ok(stored)
    }

    /// Fail with [`ReportError::QuotaExceeded`] when the org already has as
    /// many definitions as its limit allows.
    pub async fn check(&self, org_id: i64) -> Result<(), ReportError> {
        let quota = self.quota(org_id).await?;
        let count = self.reports.count_by_org(org_id).await?;
        if count >= quota.max_reports {
            return Err(ReportError::QuotaExceeded {
                limit: quota.max_reports,
                count,
            });
        }
        Ok(())
    }

    /// Administrative override of an org's limit.
    pub async fn set_limit(
        &self,
        org_id: i64,
        request: UpdateQuotaRequest,
    ) -> Result<TenantQuota, ReportError> {
        request.validate()?;
        let quota = TenantQuota {
            org_id,
            subscription: request.subscription,
            max_reports: request.max_reports,
            updated_at: Utc::now(),
        };
        let stored = self.tenants.upsert(&quota).await?;
        info!(org_id, max_reports = stored.max_reports, "Updated tenant quota");
        Ok(stored)
    }

    /// Drop the cached quota of an offboarded org.
    pub async fn offboard(&self, org_id: i64) -> Result<(), ReportError> {
        if !self.tenants.delete(org_id).await? {
            return Err(ReportError::NotFound(format!("tenant {}", org_id)));
        }
        info!(org_id, "Removed tenant quota");
        Ok(())
    }
}

/// Tenant service stand-in for development and testing.
#[derive(Debug, Default)]
pub struct MockTenantService {
    /// Subscription returned for every org; `None` simulates an outage.
    pub subscription: Option<String>,
    calls: AtomicUsize,
}

impl MockTenantService {
    pub fn new(subscription: &str) -> Self {
        Self {
            subscription: Some(subscription.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A service that always fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantService for MockTenantService {
    async fn subscription_type(&self, _org_id: i64) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.subscription.clone().ok_or(CollaboratorError::Failed {
            service: "tenant service",
            message: "unavailable".to_string(),
        })
    }
}
