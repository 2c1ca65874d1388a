//! HTTP client of the remote rendering service.

use async_trait::async_trait;
use domain::services::{RenderBackend, RenderRequest, RENDER_KEY_HEADER};
use domain::RenderError;
use reqwest::Client;
use tracing::debug;

/// Calls `GET {base}/render/{format}?url=...` with the render key header.
pub struct HttpRenderBackend {
    client: Client,
    base_url: String,
}

impl HttpRenderBackend {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RenderBackend for HttpRenderBackend {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut query: Vec<(&str, &str)> = vec![("url", request.target_url.as_str())];
        query.extend(request.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let timeout_secs = request.timeout.as_secs().max(1).to_string();
        query.push(("timeout", timeout_secs.as_str()));

        debug!(url = %url, target = %request.target_url, "Calling renderer");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .header(RENDER_KEY_HEADER, &request.render_key)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RenderError::Timeout(request.timeout)
                } else {
                    RenderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                RenderError::Timeout(request.timeout)
            } else {
                RenderError::Transport(e.to_string())
            }
        })?;
        Ok(bytes.to_vec())
    }
}
