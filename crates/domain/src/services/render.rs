//! Render dispatch with fail-fast admission control.
//!
//! The dispatcher owns the in-flight counter. A call arriving while the
//! counter is at the caller's concurrency limit is not queued: it returns an
//! over-capacity placeholder immediately and the backend is never contacted.
//! The read-then-increment is not atomic as a whole, so the limit is a soft
//! cap under bursts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::models::{Orientation, ReportFormat, ReportLayout, Theme, TimeRange};

/// Header carrying the render key on requests to the backend.
pub const RENDER_KEY_HEADER: &str = "X-Render-Key";

/// Why a placeholder was returned instead of a rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderReason {
    /// No rendering backend configured.
    Unavailable,
    /// Concurrency limit reached.
    OverCapacity,
}

impl PlaceholderReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceholderReason::Unavailable => "unavailable",
            PlaceholderReason::OverCapacity => "over_capacity",
        }
    }
}

/// Inputs of one render call.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub org_id: i64,
    pub user_id: i64,
    pub format: ReportFormat,
    pub dashboard_uid: String,
    pub time_range: TimeRange,
    /// Template-variable query string appended to the dashboard URL.
    pub filters: Option<String>,
    pub panel_id: Option<i64>,
    pub layout: ReportLayout,
    pub orientation: Orientation,
    pub theme: Theme,
    /// Bound on the backend call only.
    pub timeout: Duration,
    pub concurrency_limit: usize,
    /// Long-lived key to reuse instead of minting a per-request one.
    pub session_key: Option<String>,
    pub file_name: String,
}

/// Request handed to a [`RenderBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub format: ReportFormat,
    /// Backend path, e.g. `/render/pdf`.
    pub path: String,
    /// Dashboard URL the backend loads.
    pub target_url: String,
    pub params: Vec<(String, String)>,
    pub render_key: String,
    pub timeout: Duration,
}

/// Remote renderer turning a dashboard URL into artifact bytes.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError>;
}

/// Result of a render call: a local file, or a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub format: ReportFormat,
    pub path: Option<PathBuf>,
    pub size: u64,
    pub placeholder: Option<PlaceholderReason>,
}

impl Artifact {
    fn placeholder(opts: &RenderOptions, reason: PlaceholderReason) -> Self {
        Self {
            file_name: opts.file_name.clone(),
            format: opts.format,
            path: None,
            size: 0,
            placeholder: Some(reason),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    /// Turn a placeholder into the matching error.
    pub fn into_result(self) -> Result<Artifact, RenderError> {
        match self.placeholder {
            Some(PlaceholderReason::Unavailable) => Err(RenderError::Unavailable),
            Some(PlaceholderReason::OverCapacity) => Err(RenderError::OverCapacity),
            None => Ok(self),
        }
    }

    pub async fn read(&self) -> Result<Vec<u8>, std::io::Error> {
        match &self.path {
            Some(path) => tokio::fs::read(path).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "placeholder artifact has no content",
            )),
        }
    }

    /// Remove the local file; missing files are ignored.
    pub async fn discard(&self) {
        if let Some(path) = &self.path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(path = %path.display(), error = %e, "Artifact cleanup skipped");
            }
        }
    }
}

/// A render key handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderKey {
    pub value: String,
    /// Session keys belong to the caller and are never released here.
    pub session: bool,
}

#[derive(Debug, Clone)]
struct KeyEntry {
    org_id: i64,
    user_id: i64,
    expires_at: Instant,
}

/// Short-lived render keys bound to `(org, user)`.
#[derive(Debug)]
pub struct RenderKeyStore {
    keys: Mutex<HashMap<String, KeyEntry>>,
    ttl: Duration,
}

impl RenderKeyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Mint a key, or wrap the caller's session key.
    pub fn acquire(&self, org_id: i64, user_id: i64, session_key: Option<&str>) -> RenderKey {
        if let Some(session) = session_key {
            return RenderKey {
                value: session.to_string(),
                session: true,
            };
        }

        let value = shared::crypto::generate_token("rk");
        let now = Instant::now();
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.retain(|_, entry| entry.expires_at > now);
        keys.insert(
            value.clone(),
            KeyEntry {
                org_id,
                user_id,
                expires_at: now + self.ttl,
            },
        );
        RenderKey {
            value,
            session: false,
        }
    }

    /// Owner of a live key.
    pub fn lookup(&self, key: &str) -> Option<(i64, i64)> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| (entry.org_id, entry.user_id))
    }

    pub fn release(&self, key: &RenderKey) {
        if key.session {
            return;
        }
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.value);
    }

    pub fn live_keys(&self) -> usize {
        let now = Instant::now();
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

/// Releases a render key when dropped.
struct KeyGuard<'a> {
    store: &'a RenderKeyStore,
    key: RenderKey,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.store.release(&self.key);
    }
}

/// Decrements the in-flight counter when dropped.
struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("report_render_in_flight").set(now as f64);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let now = self.counter.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("report_render_in_flight").set(now as f64);
    }
}

/// Static settings of the dispatcher.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Base URL the backend uses to load dashboards.
    pub dashboard_base_url: String,
    pub artifacts_dir: PathBuf,
    pub device_scale_factor: f32,
}

/// Admission-controlled entry point to the rendering backend.
pub struct RenderDispatcher {
    backend: Option<Arc<dyn RenderBackend>>,
    keys: Arc<RenderKeyStore>,
    in_flight: AtomicUsize,
    settings: RenderSettings,
}

impl RenderDispatcher {
    pub fn new(
        backend: Option<Arc<dyn RenderBackend>>,
        keys: Arc<RenderKeyStore>,
        settings: RenderSettings,
    ) -> Self {
        Self {
            backend,
            keys,
            in_flight: AtomicUsize::new(0),
            settings,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn keys(&self) -> &RenderKeyStore {
        &self.keys
    }

    pub async fn render_pdf(&self, opts: RenderOptions) -> Result<Artifact, RenderError> {
        self.render(RenderOptions {
            format: ReportFormat::Pdf,
            ..opts
        })
        .await
    }

    pub async fn render_csv(&self, opts: RenderOptions) -> Result<Artifact, RenderError> {
        self.render(RenderOptions {
            format: ReportFormat::Csv,
            ..opts
        })
        .await
    }

    pub async fn render_xls(&self, opts: RenderOptions) -> Result<Artifact, RenderError> {
        self.render(RenderOptions {
            format: ReportFormat::Xls,
            ..opts
        })
        .await
    }

    /// Render `opts` into a local artifact.
    ///
    /// Placeholders are `Ok` values; use [`Artifact::into_result`] to treat
    /// them as errors.
    pub async fn render(&self, opts: RenderOptions) -> Result<Artifact, RenderError> {
        let Some(backend) = self.backend.as_ref() else {
            metrics::counter!("report_render_rejected_total", "reason" => "unavailable")
                .increment(1);
            warn!(org_id = opts.org_id, "No rendering backend configured");
            return Ok(Artifact::placeholder(&opts, PlaceholderReason::Unavailable));
        };

        let current = self.in_flight.load(Ordering::SeqCst);
        if current >= opts.concurrency_limit {
            metrics::counter!("report_render_rejected_total", "reason" => "over_capacity")
                .increment(1);
            warn!(
                org_id = opts.org_id,
                in_flight = current,
                limit = opts.concurrency_limit,
                "Render rejected, over capacity"
            );
            return Ok(Artifact::placeholder(&opts, PlaceholderReason::OverCapacity));
        }

        let key = KeyGuard {
            store: &self.keys,
            key: self
                .keys
                .acquire(opts.org_id, opts.user_id, opts.session_key.as_deref()),
        };
        let _in_flight = InFlightGuard::enter(&self.in_flight);

        let request = self.build_request(&opts, &key.key.value);
        let started = Instant::now();
        let bytes = match tokio::time::timeout(opts.timeout, backend.render(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    org_id = opts.org_id,
                    format = %opts.format,
                    timeout_ms = opts.timeout.as_millis() as u64,
                    "Render timed out"
                );
                return Err(RenderError::Timeout(opts.timeout));
            }
        };

        let path = self.artifact_path(&opts.file_name);
        tokio::fs::create_dir_all(&self.settings.artifacts_dir).await?;
        tokio::fs::write(&path, &bytes).await?;

        info!(
            org_id = opts.org_id,
            format = %opts.format,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rendered artifact"
        );

        Ok(Artifact {
            file_name: opts.file_name,
            format: opts.format,
            path: Some(path),
            size: bytes.len() as u64,
            placeholder: None,
        })
    }

    fn artifact_path(&self, file_name: &str) -> PathBuf {
        let unique = shared::crypto::generate_token("a");
        Path::new(&self.settings.artifacts_dir).join(format!("{}-{}", unique, file_name))
    }

    /// Backend path, dashboard URL and format-specific parameters.
    pub fn build_request(&self, opts: &RenderOptions, render_key: &str) -> RenderRequest {
        let base = self.settings.dashboard_base_url.trim_end_matches('/');
        let mut params: Vec<(String, String)> = Vec::new();

        let target_url = match opts.format {
            ReportFormat::Pdf => {
                params.push(("theme".into(), opts.theme.to_string()));
                params.push(("layout".into(), opts.layout.to_string()));
                params.push(("orientation".into(), opts.orientation.to_string()));
                params.push((
                    "deviceScaleFactor".into(),
                    self.settings.device_scale_factor.to_string(),
                ));
                format!(
                    "{}/d/{}?orgId={}&from={}&to={}",
                    base, opts.dashboard_uid, opts.org_id, opts.time_range.from, opts.time_range.to
                )
            }
            ReportFormat::Csv | ReportFormat::Xls => {
                if let Some(panel_id) = opts.panel_id {
                    params.push(("panelId".into(), panel_id.to_string()));
                }
                params.push(("from".into(), opts.time_range.from.clone()));
                params.push(("to".into(), opts.time_range.to.clone()));
                format!(
                    "{}/d-solo/{}?orgId={}&from={}&to={}",
                    base, opts.dashboard_uid, opts.org_id, opts.time_range.from, opts.time_range.to
                )
            }
        };

        let target_url = match opts.filters.as_deref().map(str::trim) {
            Some(filters) if !filters.is_empty() => {
                format!("{}&{}", target_url, filters.trim_start_matches(|c| c == '?' || c == '&'))
            }
            _ => target_url,
        };

        RenderRequest {
            format: opts.format,
            path: format!("/render/{}", opts.format),
            target_url,
            params,
            render_key: render_key.to_string(),
            timeout: opts.timeout,
        }
    }
}

/// Backend stand-in for tests: returns fixed bytes, optionally failing,
/// stalling, or blocking until released.
#[derive(Default)]
pub struct MockRenderBackend {
    pub bytes: Vec<u8>,
    pub fail_status: Option<u16>,
    pub delay: Option<Duration>,
    gate: Option<Arc<tokio::sync::Semaphore>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<RenderRequest>>,
}

impl MockRenderBackend {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            ..Default::default()
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Default::default()
        }
    }

    pub fn slow(bytes: &[u8], delay: Duration) -> Self {
        Self {
            bytes: bytes.to_vec(),
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Calls block until permits are added to `gate`.
    pub fn gated(bytes: &[u8], gate: Arc<tokio::sync::Semaphore>) -> Self {
        Self {
            bytes: bytes.to_vec(),
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RenderBackend for MockRenderBackend {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| RenderError::Transport(e.to_string()))?;
            permit.forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.fail_status {
            return Err(RenderError::Backend {
                status,
                body: "render failed".to_string(),
            });
        }
        Ok(self.bytes.clone())
    }
}
