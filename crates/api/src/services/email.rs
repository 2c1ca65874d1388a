//! Email delivery of rendered reports.
//!
//! Supports two providers:
//! - `console`: Logs emails instead of sending them (development)
//! - `sendgrid`: Uses the SendGrid v3 mail API, attachments base64-encoded

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use domain::services::{EmailMessage, EmailTransport};
use domain::DeliveryError;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::EmailConfig;

/// Errors that can occur during email operations.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email provider not configured: {0}")]
    NotConfigured(String),

    #[error("Email has no recipients")]
    NoRecipients,

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Provider did not answer within {0}s")]
    Timeout(u64),

    #[error("Provider returned {status}: {body}")]
    ProviderError { status: u16, body: String },
}

impl From<EmailError> for DeliveryError {
    fn from(err: EmailError) -> Self {
        DeliveryError::Email(err.to_string())
    }
}

/// Email service for report delivery.
#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
    client: Client,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn dispatch(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if message.to.is_empty() {
            return Err(EmailError::NoRecipients);
        }
        if !self.config.enabled {
            debug!(
                recipients = message.to.len(),
                subject = %message.subject,
                "Email service disabled, skipping send"
            );
            return Ok(());
        }

        match self.config.provider.as_str() {
            "console" => {
                self.send_console(message);
                Ok(())
            }
            "sendgrid" => self.send_sendgrid(message).await,
            provider => {
                error!(provider = %provider, "Unknown email provider");
                Err(EmailError::NotConfigured(provider.to_string()))
            }
        }
    }

    fn send_console(&self, message: &EmailMessage) {
        info!(
            to = ?message.to,
            reply_to = ?message.reply_to,
            subject = %message.subject,
            from = %self.config.sender_email,
            attachments = ?message
                .attachments
                .iter()
                .map(|a| format!("{} ({} bytes)", a.file_name, a.data.len()))
                .collect::<Vec<_>>(),
            "Email (console provider)"
        );
        debug!(body = %message.body, "Email body");
    }

    /// SendGrid v3 request body.
    fn sendgrid_body(&self, message: &EmailMessage) -> Value {
        let to: Vec<Value> = message.to.iter().map(|addr| json!({ "email": addr })).collect();
        let body = if message.body.trim().is_empty() {
            "Please find the scheduled report attached.".to_string()
        } else {
            message.body.clone()
        };

        let mut payload = json!({
            "personalizations": [{ "to": to }],
            "from": {
                "email": self.config.sender_email,
                "name": self.config.sender_name
            },
            "subject": message.subject,
            "content": [{ "type": "text/plain", "value": body }]
        });

        if let Some(reply_to) = &message.reply_to {
            payload["reply_to"] = json!({ "email": reply_to });
        }

        if !message.attachments.is_empty() {
            payload["attachments"] = Value::Array(
                message
                    .attachments
                    .iter()
                    .map(|a| {
                        json!({
                            "content": STANDARD.encode(&a.data),
                            "type": a.content_type,
                            "filename": a.file_name,
                            "disposition": "attachment"
                        })
                    })
                    .collect(),
            );
        }

        payload
    }

    async fn send_sendgrid(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if self.config.sendgrid_api_key.is_empty() {
            return Err(EmailError::NotConfigured("sendgrid api key".to_string()));
        }

        let response = self
            .client
            .post(&self.config.sendgrid_url)
            .bearer_auth(&self.config.sendgrid_api_key)
            .json(&self.sendgrid_body(message))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmailError::Timeout(self.config.timeout_secs)
                } else {
                    EmailError::SendFailed(format!("SendGrid request failed: {}", e))
                }
            })?;

        if response.status().is_success() {
            info!(
                recipients = message.to.len(),
                subject = %message.subject,
                "Email sent via SendGrid"
            );
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(status, error = %body, "SendGrid API error");
            Err(EmailError::ProviderError { status, body })
        }
    }
}

#[async_trait]
impl EmailTransport for EmailService {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        self.dispatch(message).await.map_err(DeliveryError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::services::Attachment;

    fn test_config(provider: &str) -> EmailConfig {
        EmailConfig {
            enabled: true,
            provider: provider.to_string(),
            sendgrid_api_key: "sg-key".to_string(),
            sender_email: "reports@example.com".to_string(),
            sender_name: "Reports".to_string(),
            ..Default::default()
        }
    }

    fn message() -> EmailMessage {
        EmailMessage {
            to: vec!["a@example.com".into(), "b@example.com".into()],
            subject: "Weekly".into(),
            body: String::new(),
            reply_to: Some("owner@example.com".into()),
            attachments: vec![Attachment {
                file_name: "weekly.pdf".into(),
                content_type: "application/pdf".into(),
                data: b"%PDF".to_vec(),
            }],
        }
    }

    #[tokio::test]
    async fn test_console_provider_succeeds() {
        let service = EmailService::new(test_config("console")).unwrap();
        assert!(service.send(&message()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_provider_fails() {
        let service = EmailService::new(test_config("pigeon")).unwrap();
        let err = service.send(&message()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Email(_)));
    }

    #[tokio::test]
    async fn test_no_recipients_rejected() {
        let service = EmailService::new(test_config("console")).unwrap();
        let mut msg = message();
        msg.to.clear();
        assert!(service.send(&msg).await.is_err());
    }

    #[test]
    fn test_sendgrid_body_attachments_and_reply_to() {
        let service = EmailService::new(test_config("sendgrid")).unwrap();
        let body = service.sendgrid_body(&message());

        assert_eq!(body["personalizations"][0]["to"].as_array().unwrap().len(), 2);
        assert_eq!(body["reply_to"]["email"], "owner@example.com");
        assert_eq!(body["attachments"][0]["filename"], "weekly.pdf");
        assert_eq!(body["attachments"][0]["content"], STANDARD.encode(b"%PDF"));
        assert_eq!(
            body["content"][0]["value"],
            "Please find the scheduled report attached."
        );
    }
}
