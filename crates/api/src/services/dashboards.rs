//! Dashboard metadata from the Grafana HTTP API.

use async_trait::async_trait;
use domain::models::TimeRange;
use domain::services::DashboardSource;
use domain::CollaboratorError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const SERVICE: &str = "dashboard service";

#[derive(Debug, Deserialize)]
struct DashboardEnvelope {
    dashboard: DashboardBody,
}

#[derive(Debug, Deserialize)]
struct DashboardBody {
    time: Option<DashboardTime>,
}

#[derive(Debug, Deserialize)]
struct DashboardTime {
    from: String,
    to: String,
}

/// Reads `dashboard.time` from `GET {base}/api/dashboards/uid/{uid}`.
pub struct GrafanaDashboards {
    client: Client,
    base_url: String,
    api_token: String,
}

impl GrafanaDashboards {
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }
}

#[async_trait]
impl DashboardSource for GrafanaDashboards {
    async fn default_time_range(
        &self,
        org_id: i64,
        dashboard_uid: &str,
    ) -> Result<TimeRange, CollaboratorError> {
        let url = format!("{}/api/dashboards/uid/{}", self.base_url, dashboard_uid);
        let mut request = self
            .client
            .get(&url)
            .header("X-Grafana-Org-Id", org_id.to_string());
        if !self.api_token.is_empty() {
            request = request.bearer_auth(&self.api_token);
        }

        let response = request.send().await.map_err(|e| {
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
                    what: format!("dashboard {}", dashboard_uid),
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

        let envelope: DashboardEnvelope =
            response.json().await.map_err(|e| CollaboratorError::Failed {
                service: SERVICE,
                message: format!("invalid response: {}", e),
            })?;

        envelope
            .dashboard
            .time
            .map(|t| TimeRange::new(t.from, t.to))
            .ok_or_else(|| CollaboratorError::Missing {
                service: SERVICE,
                what: format!("time range of dashboard {}", dashboard_uid),
            })
    }
}
