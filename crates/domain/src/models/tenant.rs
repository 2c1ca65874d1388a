//! Tenant quota domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Report limit applied to trial subscriptions.
pub const TRIAL_REPORT_LIMIT: i64 = 5;

/// Report limit applied to every non-trial subscription.
pub const LICENSED_REPORT_LIMIT: i64 = 100;

/// Subscription category of a tenant as reported by the tenant service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    Trial,
    /// Any other subscription string, kept verbatim.
    Licensed(String),
}

impl SubscriptionType {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("trial") {
            SubscriptionType::Trial
        } else {
            SubscriptionType::Licensed(raw.trim().to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionType::Trial => "trial",
            SubscriptionType::Licensed(name) => name,
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Default limits used when bootstrapping a tenant's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDefaults {
    pub trial: i64,
    pub licensed: i64,
}

impl QuotaDefaults {
    pub fn limit_for(&self, subscription: &SubscriptionType) -> i64 {
        match subscription {
            SubscriptionType::Trial => self.trial,
            SubscriptionType::Licensed(_) => self.licensed,
        }
    }
}

impl Default for QuotaDefaults {
    fn default() -> Self {
        Self {
            trial: TRIAL_REPORT_LIMIT,
            licensed: LICENSED_REPORT_LIMIT,
        }
    }
}

/// Cached per-org quota snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantQuota {
    pub org_id: i64,
    pub subscription: String,
    pub max_reports: i64,
    pub updated_at: DateTime<Utc>,
}

/// Administrative quota update.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuotaRequest {
    #[validate(length(min = 1, max = 64, message = "Subscription must be 1-64 characters"))]
    pub subscription: String,

    #[validate(range(min = 0, max = 100000, message = "maxReports must be 0-100000"))]
    pub max_reports: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_parse() {
        assert_eq!(SubscriptionType::parse("trial"), SubscriptionType::Trial);
        assert_eq!(SubscriptionType::parse(" TRIAL "), SubscriptionType::Trial);
        assert_eq!(
            SubscriptionType::parse("enterprise"),
            SubscriptionType::Licensed("enterprise".into())
        );
    }

    #[test]
    fn test_quota_defaults() {
        let defaults = QuotaDefaults::default();
        assert_eq!(defaults.limit_for(&SubscriptionType::Trial), TRIAL_REPORT_LIMIT);
        assert_eq!(
            defaults.limit_for(&SubscriptionType::Licensed("pro".into())),
            LICENSED_REPORT_LIMIT
        );
        assert_ne!(TRIAL_REPORT_LIMIT, LICENSED_REPORT_LIMIT);
    }

    #[test]
    fn test_update_quota_validation() {
        let ok = UpdateQuotaRequest {
            subscription: "pro".into(),
            max_reports: 10,
        };
        assert!(ok.validate().is_ok());

        let negative = UpdateQuotaRequest {
            subscription: "pro".into(),
            max_reports: -1,
        };
        assert!(negative.validate().is_err());
    }
}
