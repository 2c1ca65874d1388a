use anyhow::Context;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::repositories::{JobRepository, ReportRepository, TenantRepository};
use domain::services::{
    DashboardSource, DeliveryService, EmailTransport, FtpClient, JobTracker, ObjectStore,
    QuotaGuard, RenderBackend, RenderDispatcher, RenderKeyStore, ReportService, TenantService,
};
use persistence::{PgJobRepository, PgReportRepository, PgTenantRepository};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, jobs, render_keys, reports, tenants};
use crate::services::{
    EmailService, GrafanaDashboards, HttpRenderBackend, HttpTenantService, S3ObjectStore,
    StaticTenantService, TokioFtpClient, UnconfiguredTenantService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Absent when running on in-memory repositories.
    pub pool: Option<PgPool>,
    pub report_store: Arc<dyn ReportRepository>,
    pub reports: ReportService,
    pub quota: QuotaGuard,
    pub tracker: JobTracker,
    pub dispatcher: Arc<RenderDispatcher>,
}

/// Storage and collaborators the application state is assembled from.
pub struct Components {
    pub reports: Arc<dyn ReportRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub tenants: Arc<dyn TenantRepository>,
    pub tenant_service: Arc<dyn TenantService>,
    pub renderer: Option<Arc<dyn RenderBackend>>,
    pub email: Option<Arc<dyn EmailTransport>>,
    pub ftp: Option<Arc<dyn FtpClient>>,
    pub store: Option<Arc<dyn ObjectStore>>,
    pub dashboards: Option<Arc<dyn DashboardSource>>,
}

impl AppState {
    pub fn new(config: Config, pool: Option<PgPool>, parts: Components) -> Self {
        let config = Arc::new(config);

        let keys = Arc::new(RenderKeyStore::new(Duration::from_secs(
            config.renderer.render_key_ttl_secs,
        )));
        let dispatcher = Arc::new(RenderDispatcher::new(
            parts.renderer,
            keys,
            config.render_settings(),
        ));

        let quota = QuotaGuard::new(
            parts.tenants,
            parts.reports.clone(),
            parts.tenant_service,
            config.quota_defaults(),
        );
        let delivery = DeliveryService::new(
            parts.email,
            parts.ftp,
            parts.store,
            Duration::from_secs(config.storage.presign_ttl_secs),
        );
        let tracker = JobTracker::new(
            parts.reports.clone(),
            parts.jobs,
            dispatcher.clone(),
            delivery,
            parts.dashboards,
            config.tracker_settings(),
        );

        Self {
            reports: ReportService::new(parts.reports.clone(), quota.clone()),
            report_store: parts.reports,
            quota,
            tracker,
            dispatcher,
            pool,
            config,
        }
    }
}

fn tenant_service(config: &Config) -> anyhow::Result<Arc<dyn TenantService>> {
    let quota = &config.quota;
    if !quota.tenant_service_url.is_empty() {
        let client = HttpTenantService::new(
            &quota.tenant_service_url,
            Duration::from_secs(quota.tenant_service_timeout_secs),
        )
        .context("failed to build tenant service client")?;
        return Ok(Arc::new(client));
    }
    match &quota.default_subscription {
        Some(subscription) => {
            info!(subscription = %subscription, "No tenant service configured, using default subscription");
            Ok(Arc::new(StaticTenantService::new(subscription.clone())))
        }
        None => {
            warn!("No tenant service configured; report creation will fail until quotas are set");
            Ok(Arc::new(UnconfiguredTenantService))
        }
    }
}

/// Wire Postgres repositories and the network collaborators named in `config`.
pub fn create_state(config: Config, pool: PgPool) -> anyhow::Result<AppState> {
    let renderer: Option<Arc<dyn RenderBackend>> = if config.renderer.url.is_empty() {
        warn!("No rendering backend configured; renders will be rejected");
        None
    } else {
        Some(Arc::new(
            HttpRenderBackend::new(&config.renderer.url)
                .context("failed to build renderer client")?,
        ))
    };

    let store: Option<Arc<dyn ObjectStore>> = if config.storage.is_configured() {
        Some(Arc::new(
            S3ObjectStore::new(&config.storage).context("failed to build object store client")?,
        ))
    } else {
        None
    };

    let dashboards: Option<Arc<dyn DashboardSource>> = if config.grafana.url.is_empty() {
        None
    } else {
        Some(Arc::new(
            GrafanaDashboards::new(&config.grafana.url, &config.grafana.api_token)
                .context("failed to build dashboard client")?,
        ))
    };

    let email: Option<Arc<dyn EmailTransport>> = if config.email.enabled {
        Some(Arc::new(
            EmailService::new(config.email.clone()).context("failed to build email client")?,
        ))
    } else {
        None
    };

    let components = Components {
        reports: Arc::new(PgReportRepository::new(pool.clone())),
        jobs: Arc::new(PgJobRepository::new(pool.clone())),
        tenants: Arc::new(PgTenantRepository::new(pool.clone())),
        tenant_service: tenant_service(&config)?,
        renderer,
        email,
        ftp: Some(Arc::new(TokioFtpClient::default())),
        store,
        dashboards,
    };

    Ok(AppState::new(config, Some(pool), components))
}

pub fn create_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    // Caller identity comes from the auth proxy headers; see `Caller`.
    let report_routes = Router::new()
        .route(
            "/api/v1/reports",
            post(reports::create_report)
                .get(reports::list_reports)
                .delete(reports::delete_reports),
        )
        .route("/api/v1/reports/enable", post(reports::enable_reports))
        .route("/api/v1/reports/disable", post(reports::disable_reports))
        .route(
            "/api/v1/reports/dashboards",
            get(reports::reports_by_dashboards),
        )
        .route(
            "/api/v1/reports/:id",
            get(reports::get_report).put(reports::update_report),
        )
        .route("/api/v1/reports/:id/run", post(reports::run_report))
        .route(
            "/api/v1/reports/:id/jobs",
            post(jobs::run_job).get(jobs::list_jobs),
        )
        .route(
            "/api/v1/jobs/:id",
            get(jobs::get_job).delete(jobs::delete_job),
        )
        .route("/api/v1/jobs/:id/download", get(jobs::download_job));

    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/tenants/:org_id/quota",
            axum::routing::put(tenants::update_quota),
        )
        .route(
            "/api/v1/admin/tenants/:org_id",
            axum::routing::delete(tenants::offboard_tenant),
        );

    // Used by the rendering backend to resolve the key it was handed.
    let render_routes =
        Router::new().route("/api/v1/render/keys/:key", get(render_keys::lookup_key));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(public_routes)
        .merge(report_routes)
        .merge(admin_routes)
        .merge(render_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
