//! Integration tests for report definition endpoints.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{
    create_report, get_request, json_request, json_request_as, report_body, send, test_app,
    TestAppBuilder, ORG, USER,
};
use domain::models::DeliveryTarget;
use domain::services::MockTenantService;
use serde_json::json;

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_create_report_success() {
    let app = test_app();

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/reports", &report_body("Weekly", 10)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Weekly");
    assert_eq!(body["orgId"], ORG);
    assert_eq!(body["ownerUserId"], USER);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["layout"], "simple");
    assert!(body["nextRunAt"].is_string());
}

#[tokio::test]
async fn test_create_requires_caller_headers() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/reports")
        .header("content-type", "application/json")
        .body(Body::from(report_body("Weekly", 10).to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_create_duplicate_name_conflicts() {
    let app = test_app();
    create_report(&app, "Weekly", 10).await;

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/reports", &report_body("Weekly", 10)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    // Same name on another dashboard is fine.
    create_report(&app, "Weekly", 11).await;
}

#[tokio::test]
async fn test_create_invalid_cron_rejected() {
    let app = test_app();
    let mut body = report_body("Broken", 10);
    body["schedule"]["cron"] = json!("61 * * * *");

    let (status, body) = send(&app, json_request(Method::POST, "/api/v1/reports", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_create_invalid_timezone_rejected() {
    let app = test_app();
    let mut body = report_body("Broken", 10);
    body["schedule"]["timezone"] = json!("Mars/Olympus");

    let (status, _) = send(&app, json_request(Method::POST, "/api/v1/reports", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_trial_quota_enforced() {
    let app = test_app();
    for i in 0..5 {
        create_report(&app, &format!("Report {}", i), 10).await;
    }

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/reports", &report_body("One too many", 10)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    // Quota bootstrapped once, then served from the cache.
    assert_eq!(app.tenants.calls(), 1);
}

#[tokio::test]
async fn test_tenant_service_outage_is_unavailable() {
    let app = TestAppBuilder::default()
        .tenant_service(MockTenantService::unavailable())
        .build();

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/v1/reports", &report_body("Weekly", 10)),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_admin_quota_override_allows_more_reports() {
    let app = test_app();
    let (status, body) = send(
        &app,
        json_request(
            Method::PUT,
            &format!("/api/v1/admin/tenants/{}/quota", ORG),
            &json!({ "subscription": "licensed", "maxReports": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["maxReports"], 1);

    create_report(&app, "Only", 10).await;
    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/v1/reports", &report_body("Second", 10)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.tenants.calls(), 0);
}

#[tokio::test]
async fn test_offboard_unknown_tenant_is_not_found() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/v1/admin/tenants/999")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Reads and updates
// ============================================================================

#[tokio::test]
async fn test_get_report_scoped_to_org() {
    let app = test_app();
    let id = create_report(&app, "Weekly", 10).await;

    let (status, body) = send(&app, get_request(&format!("/api/v1/reports/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);

    let other_org = Request::builder()
        .uri(format!("/api/v1/reports/{}", id))
        .header("X-Org-Id", "8")
        .header("X-User-Id", "1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, other_org).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_filters() {
    let app = test_app();
    create_report(&app, "Weekly sales", 10).await;
    create_report(&app, "Daily ops", 11).await;
    let (status, _) = send(
        &app,
        json_request_as(
            Method::POST,
            "/api/v1/reports",
            &report_body("Weekly ops", 10),
            ORG,
            USER + 1,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, get_request("/api/v1/reports?name=WEEKLY")).await;
    assert_eq!(body["reports"].as_array().unwrap().len(), 2);

    let (_, body) = send(&app, get_request("/api/v1/reports?dashboardId=11")).await;
    assert_eq!(body["reports"].as_array().unwrap().len(), 1);

    let (_, body) = send(
        &app,
        get_request(&format!("/api/v1/reports?userId={}", USER + 1)),
    )
    .await;
    assert_eq!(body["reports"][0]["name"], "Weekly ops");

    let (_, body) = send(&app, get_request("/api/v1/reports/dashboards?ids=10,11")).await;
    assert_eq!(body["reports"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_update_cannot_move_dashboard() {
    let app = test_app();
    let id = create_report(&app, "Weekly", 10).await;

    let mut body = report_body("Renamed", 99);
    body["enabled"] = json!(true);
    let (status, _) = send(
        &app,
        json_request(Method::PUT, &format!("/api/v1/reports/{}", id), &body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = send(
        &app,
        json_request(
            Method::PUT,
            &format!("/api/v1/reports/{}", id),
            &report_body("Renamed", 10),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Renamed");
}

#[tokio::test]
async fn test_enable_disable_and_delete() {
    let app = test_app();
    let a = create_report(&app, "A", 10).await;
    let b = create_report(&app, "B", 10).await;

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/reports/disable", &json!({ "ids": [a, b] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 2);

    let (_, report) = send(&app, get_request(&format!("/api/v1/reports/{}", a))).await;
    assert_eq!(report["enabled"], false);

    let (_, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/reports/enable", &json!({ "ids": [a, 9999] })),
    )
    .await;
    assert_eq!(body["affected"], 1);

    let (status, body) = send(
        &app,
        json_request(Method::DELETE, "/api/v1/reports", &json!({ "ids": [a, b] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 2);

    let (status, _) = send(&app, get_request(&format!("/api/v1/reports/{}", a))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_requires_ids() {
    let app = test_app();
    let (status, _) = send(
        &app,
        json_request(Method::DELETE, "/api/v1/reports", &json!({ "ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Delivery credentials
// ============================================================================

fn ftp_report_body(name: &str, password: &str, protocol: &str) -> serde_json::Value {
    let mut body = report_body(name, 10);
    body["delivery"] = json!({
        "type": "ftp",
        "host": "ftp.example.com",
        "port": 21,
        "username": "reports",
        "password": password,
        "protocol": protocol,
        "directory": "/weekly"
    });
    body
}

#[tokio::test]
async fn test_ftp_password_never_returned() {
    let app = test_app();

    let (status, created) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/reports",
            &ftp_report_body("Weekly", "hunter2", "ftp"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["delivery"]["host"], "ftp.example.com");
    assert!(created["delivery"].get("password").is_none());
    let id = created["id"].as_i64().unwrap();

    let responses = vec![
        send(&app, get_request(&format!("/api/v1/reports/{}", id))).await.1,
        send(&app, get_request("/api/v1/reports")).await.1,
        send(&app, get_request("/api/v1/reports/dashboards?ids=10")).await.1,
    ];
    for body in &responses {
        assert!(!body.to_string().contains("hunter2"), "leaked: {}", body);
    }

    // An edit that leaves the password blank keeps the stored one.
    let edit = ftp_report_body("Weekly renamed", "", "ftp");
    let (status, updated) = send(
        &app,
        json_request(Method::PUT, &format!("/api/v1/reports/{}", id), &edit),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!updated.to_string().contains("hunter2"));

    let stored = app
        .state
        .report_store
        .find_by_id(ORG, id)
        .await
        .unwrap()
        .unwrap();
    match stored.delivery {
        DeliveryTarget::Ftp(target) => assert_eq!(target.password, "hunter2"),
        other => panic!("unexpected delivery: {:?}", other),
    }
}

#[tokio::test]
async fn test_sftp_delivery_rejected_on_create() {
    let app = test_app();
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/reports",
            &ftp_report_body("Weekly", "secret", "sftp"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("SFTP"));
}
