//! Common test utilities for integration tests.
//!
//! The router is built on in-memory repositories and mock collaborators, so
//! these tests need no database or network.

// Helpers are shared between test binaries; not every binary uses all of them.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use domain::repositories::{
    InMemoryJobRepository, InMemoryReportRepository, InMemoryTenantRepository,
};
use domain::services::{
    InMemoryObjectStore, MockEmailTransport, MockFtpClient, MockRenderBackend, MockTenantService,
    ObjectStore, RenderBackend,
};
use report_scheduler_api::app::{create_app, AppState, Components};
use report_scheduler_api::config::Config;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const ORG: i64 = 7;
pub const USER: i64 = 42;

/// Handles on the collaborators behind a test app.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub renderer: Arc<MockRenderBackend>,
    pub email: Arc<MockEmailTransport>,
    pub ftp: Arc<MockFtpClient>,
    pub store: Arc<InMemoryObjectStore>,
    pub tenants: Arc<MockTenantService>,
    // Keeps the artifacts directory alive for the test's duration.
    _artifacts: TempDir,
}

pub struct TestAppBuilder {
    subscription: MockTenantService,
    renderer: MockRenderBackend,
    with_renderer: bool,
    with_store: bool,
    overrides: Vec<(String, String)>,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            subscription: MockTenantService::new("trial"),
            renderer: MockRenderBackend::new(b"%PDF-1.7 test"),
            with_renderer: true,
            with_store: true,
            overrides: Vec::new(),
        }
    }
}

impl TestAppBuilder {
    pub fn tenant_service(mut self, service: MockTenantService) -> Self {
        self.subscription = service;
        self
    }

    pub fn renderer(mut self, backend: MockRenderBackend) -> Self {
        self.renderer = backend;
        self
    }

    pub fn without_renderer(mut self) -> Self {
        self.with_renderer = false;
        self
    }

    pub fn without_store(mut self) -> Self {
        self.with_store = false;
        self
    }

    pub fn config(mut self, key: &str, value: &str) -> Self {
        self.overrides.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> TestApp {
        let artifacts = tempfile::tempdir().unwrap();
        let dir = artifacts.path().to_string_lossy().to_string();
        let mut overrides: Vec<(&str, &str)> = vec![("renderer.artifacts_dir", dir.as_str())];
        overrides.extend(self.overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let config = Config::load_for_test(&overrides).unwrap();

        let renderer = Arc::new(self.renderer);
        let email = Arc::new(MockEmailTransport::new());
        let ftp = Arc::new(MockFtpClient::new());
        let store = Arc::new(InMemoryObjectStore::new());
        let tenants = Arc::new(self.subscription);

        let components = Components {
            reports: Arc::new(InMemoryReportRepository::new()),
            jobs: Arc::new(InMemoryJobRepository::new()),
            tenants: Arc::new(InMemoryTenantRepository::new()),
            tenant_service: tenants.clone(),
            renderer: self
                .with_renderer
                .then(|| renderer.clone() as Arc<dyn RenderBackend>),
            email: Some(email.clone()),
            ftp: Some(ftp.clone()),
            store: self
                .with_store
                .then(|| store.clone() as Arc<dyn ObjectStore>),
            dashboards: None,
        };

        let state = AppState::new(config, None, components);
        TestApp {
            router: create_app(state.clone()),
            state,
            renderer,
            email,
            ftp,
            store,
            tenants,
            _artifacts: artifacts,
        }
    }
}

pub fn test_app() -> TestApp {
    TestAppBuilder::default().build()
}

/// Minimal valid create payload.
pub fn report_body(name: &str, dashboard_id: i64) -> Value {
    json!({
        "name": name,
        "dashboardId": dashboard_id,
        "dashboardUid": format!("dash-{}", dashboard_id),
        "format": "pdf",
        "delivery": { "type": "storage" },
        "schedule": { "cron": "0 9 * * 1", "timezone": "Europe/Berlin" }
    })
}

fn with_caller(builder: axum::http::request::Builder, org: i64, user: i64) -> axum::http::request::Builder {
    builder
        .header("X-Org-Id", org.to_string())
        .header("X-User-Id", user.to_string())
}

pub fn get_request(uri: &str) -> Request<Body> {
    with_caller(Request::builder().method(Method::GET).uri(uri), ORG, USER)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    json_request_as(method, uri, body, ORG, USER)
}

pub fn json_request_as(method: Method, uri: &str, body: &Value, org: i64, user: i64) -> Request<Body> {
    with_caller(Request::builder().method(method).uri(uri), org, user)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    with_caller(Request::builder().method(method).uri(uri), ORG, USER)
        .body(Body::empty())
        .unwrap()
}

/// Send a request and return the status and JSON body (`Null` when empty).
pub async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if body.is_empty() {
        return (status, Value::Null);
    }
    let json = serde_json::from_slice(&body).unwrap_or_else(|_| {
        panic!(
            "Failed to parse response body. Status: {}, Body: {:?}",
            status,
            String::from_utf8_lossy(&body)
        )
    });
    (status, json)
}

/// Create a report and return its id.
pub async fn create_report(app: &TestApp, name: &str, dashboard_id: i64) -> i64 {
    let (status, body) = send(
        app,
        json_request(Method::POST, "/api/v1/reports", &report_body(name, dashboard_id)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    body["id"].as_i64().unwrap()
}
