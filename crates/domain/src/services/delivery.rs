//! Delivery and archival of rendered artifacts.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::error::{CollaboratorError, DeliveryError, ReportError};
use crate::models::{
    DeliveryTarget, DownloadLink, EmailTarget, FtpTarget, JobExecution, ReportDefinition,
    TimeRange,
};
use crate::services::render::Artifact;

/// Lifetime of presigned download URLs.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(300);

/// File attached to an outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// An outgoing report email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait FtpClient: Send + Sync {
    /// Upload `local_path` into `target.directory` as `remote_name`.
    async fn push(
        &self,
        target: &FtpTarget,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<(), DeliveryError>;

    /// Connect and log in without transferring anything.
    async fn ping(&self, target: &FtpTarget) -> Result<(), DeliveryError>;
}

/// Versioned blob store with presigned reads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, returning the new version id.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str)
        -> Result<String, DeliveryError>;

    /// Whether `version` of `key` still exists.
    async fn exists(&self, key: &str, version: &str) -> Result<bool, DeliveryError>;

    async fn presign_get(
        &self,
        key: &str,
        version: &str,
        ttl: Duration,
    ) -> Result<String, DeliveryError>;
}

/// Dashboard metadata lookups.
#[async_trait]
pub trait DashboardSource: Send + Sync {
    /// The dashboard's own default time range.
    async fn default_time_range(
        &self,
        org_id: i64,
        dashboard_uid: &str,
    ) -> Result<TimeRange, CollaboratorError>;
}

/// Object key of an archived artifact.
pub fn storage_key(org_id: i64, report_id: i64, job_id: i64, file_name: &str) -> String {
    format!("reports/{}/{}/{}/{}", org_id, report_id, job_id, file_name)
}

/// Routes artifacts to their delivery target and archives them.
#[derive(Clone)]
pub struct DeliveryService {
    email: Option<Arc<dyn EmailTransport>>,
    ftp: Option<Arc<dyn FtpClient>>,
    store: Option<Arc<dyn ObjectStore>>,
    presign_ttl: Duration,
}

impl DeliveryService {
    pub fn new(
        email: Option<Arc<dyn EmailTransport>>,
        ftp: Option<Arc<dyn FtpClient>>,
        store: Option<Arc<dyn ObjectStore>>,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            email,
            ftp,
            store,
            presign_ttl,
        }
    }

    pub fn has_storage(&self) -> bool {
        self.store.is_some()
    }

    /// Send the artifact to the report's delivery target. Failures are
    /// returned as-is; nothing is retried here.
    pub async fn deliver(
        &self,
        report: &ReportDefinition,
        artifact: &Artifact,
    ) -> Result<(), DeliveryError> {
        match &report.delivery {
            DeliveryTarget::Email(target) => self.send_email(report, target, artifact).await,
            DeliveryTarget::Ftp(target) => {
                let ftp = self.ftp.as_ref().ok_or(DeliveryError::NotConfigured("ftp"))?;
                let path = artifact.path.as_deref().ok_or_else(|| {
                    DeliveryError::Ftp("artifact has no local file".to_string())
                })?;
                ftp.push(target, path, &artifact.file_name).await?;
                info!(
                    report_id = report.id,
                    host = %target.host,
                    directory = %target.directory,
                    "Uploaded report over FTP"
                );
                Ok(())
            }
            DeliveryTarget::Storage => Ok(()),
        }
    }

    async fn send_email(
        &self,
        report: &ReportDefinition,
        target: &EmailTarget,
        artifact: &Artifact,
    ) -> Result<(), DeliveryError> {
        let email = self
            .email
            .as_ref()
            .ok_or(DeliveryError::NotConfigured("email"))?;
        let data = artifact.read().await?;

        let subject = if target.subject.trim().is_empty() {
            format!("Report: {}", report.name)
        } else {
            target.subject.clone()
        };
        let message = EmailMessage {
            to: target.recipients.clone(),
            subject,
            body: target.message.clone(),
            reply_to: target.reply_to.clone(),
            attachments: vec![Attachment {
                file_name: artifact.file_name.clone(),
                content_type: artifact.format.content_type().to_string(),
                data,
            }],
        };

        email.send(&message).await?;
        info!(
            report_id = report.id,
            recipients = target.recipients.len(),
            "Emailed report"
        );
        Ok(())
    }

    /// Write the artifact to object storage.
    ///
    /// Returns `None` when no store is configured.
    pub async fn archive(
        &self,
        report: &ReportDefinition,
        job_id: i64,
        artifact: &Artifact,
    ) -> Result<Option<(String, String)>, DeliveryError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(None);
        };
        let key = storage_key(report.org_id, report.id, job_id, &artifact.file_name);
        let data = artifact.read().await?;
        let version = store
            .put(&key, data, artifact.format.content_type())
            .await?;
        info!(report_id = report.id, job_id, key = %key, version = %version, "Archived report");
        Ok(Some((key, version)))
    }

    /// Presigned URL for the exact archived version of a job's artifact.
    pub async fn download_link(&self, job: &JobExecution) -> Result<DownloadLink, ReportError> {
        let (Some(key), Some(version)) = (&job.storage_key, &job.storage_version) else {
            return Err(ReportError::NotInStorage);
        };
        let Some(store) = self.store.as_ref() else {
            warn!(job_id = job.id, "Object storage not configured for download");
            return Err(ReportError::NotAvailable);
        };

        if !store.exists(key, version).await? {
            info!(job_id = job.id, key = %key, version = %version, "Archived version pruned");
            return Err(ReportError::NotAvailable);
        }

        let url = store.presign_get(key, version, self.presign_ttl).await?;
        let ttl = chrono::Duration::from_std(self.presign_ttl)
            .map_err(|e| ReportError::Internal(e.to_string()))?;
        Ok(DownloadLink {
            url,
            expires_at: Utc::now() + ttl,
        })
    }

    /// Connectivity check of an FTP target.
    pub async fn ping_ftp(&self, target: &FtpTarget) -> Result<(), DeliveryError> {
        let ftp = self.ftp.as_ref().ok_or(DeliveryError::NotConfigured("ftp"))?;
        ftp.ping(target).await
    }
}

/// Email transport that records messages instead of sending them.
#[derive(Debug, Default)]
pub struct MockEmailTransport {
    pub simulate_failure: bool,
    sent: Mutex<Vec<EmailMessage>>,
}

impl MockEmailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EmailTransport for MockEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        if self.simulate_failure {
            return Err(DeliveryError::Email("simulated failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

/// FTP client that records uploads instead of transferring them.
#[derive(Debug, Default)]
pub struct MockFtpClient {
    uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
    pings: AtomicUsize,
}

impl MockFtpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(directory, file name, bytes)` of every upload.
    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FtpClient for MockFtpClient {
    async fn push(
        &self,
        target: &FtpTarget,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<(), DeliveryError> {
        let data = tokio::fs::read(local_path).await?;
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((target.directory.clone(), remote_name.to_string(), data));
        Ok(())
    }

    async fn ping(&self, _target: &FtpTarget) -> Result<(), DeliveryError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Versioned object store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    next_version: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop one version, as a retention policy would.
    pub fn prune(&self, key: &str, version: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(key.to_string(), version.to_string()))
            .is_some()
    }

    pub fn get(&self, key: &str, version: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(key.to_string(), version.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, DeliveryError> {
        let version = format!("v{}", self.next_version.fetch_add(1, Ordering::SeqCst) + 1);
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((key.to_string(), version.clone()), data);
        Ok(version)
    }

    async fn exists(&self, key: &str, version: &str) -> Result<bool, DeliveryError> {
        Ok(self.get(key, version).is_some())
    }

    async fn presign_get(
        &self,
        key: &str,
        version: &str,
        ttl: Duration,
    ) -> Result<String, DeliveryError> {
        Ok(format!(
            "memory://{}?versionId={}&expires={}",
            key,
            version,
            ttl.as_secs()
        ))
    }
}

/// Dashboard source returning one fixed time range.
#[derive(Debug, Clone)]
pub struct StaticDashboardSource {
    pub time_range: Option<TimeRange>,
}

#[async_trait]
impl DashboardSource for StaticDashboardSource {
    async fn default_time_range(
        &self,
        _org_id: i64,
        dashboard_uid: &str,
    ) -> Result<TimeRange, CollaboratorError> {
        self.time_range.clone().ok_or_else(|| CollaboratorError::Missing {
            service: "dashboards",
            what: dashboard_uid.to_string(),
        })
    }
}
