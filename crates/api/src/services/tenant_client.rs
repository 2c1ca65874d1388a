//! Tenant-management service clients.

use std::time::Duration;

use async_trait::async_trait;
use domain::services::TenantService;
use domain::CollaboratorError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

const SERVICE: &str = "tenant service";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantResponse {
    subscription_type: Option<String>,
}

/// Looks up `GET {base}/api/tenants/{org_id}`.
pub struct HttpTenantService {
    client: Client,
    base_url: String,
}

impl HttpTenantService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TenantService for HttpTenantService {
    async fn subscription_type(&self, org_id: i64) -> Result<String, CollaboratorError> {
        let url = format!("{}/api/tenants/{}", self.base_url, org_id);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                CollaboratorError::Timeout { service: SERVICE }
            } else {
                CollaboratorError::Failed {
                    service: SERVICE,
                    message: e.to_string(),
                }
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(CollaboratorError::Missing {
                    service: SERVICE,
                    what: format!("org {}", org_id),
                })
            }
            status if !status.is_success() => {
                return Err(CollaboratorError::Failed {
                    service: SERVICE,
                    message: format!("HTTP {}", status),
                })
            }
            _ => {}
        }

        let body: TenantResponse = response.json().await.map_err(|e| CollaboratorError::Failed {
            service: SERVICE,
            message: format!("invalid response: {}", e),
        })?;

        body.subscription_type
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CollaboratorError::Missing {
                service: SERVICE,
                what: format!("subscription type of org {}", org_id),
            })
    }
}

/// Fixed subscription for deployments without a tenant service.
pub struct StaticTenantService {
    subscription: String,
}

impl StaticTenantService {
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
        }
    }
}

#[async_trait]
impl TenantService for StaticTenantService {
    async fn subscription_type(&self, _org_id: i64) -> Result<String, CollaboratorError> {
        Ok(self.subscription.clone())
    }
}

/// Tenant service stand-in that always fails, so quota bootstrap reports
/// missing configuration instead of guessing a limit.
pub struct UnconfiguredTenantService;

#[async_trait]
impl TenantService for UnconfiguredTenantService {
    async fn subscription_type(&self, org_id: i64) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Missing {
            service: SERVICE,
            what: format!("configuration for org {}", org_id),
        })
    }
}
