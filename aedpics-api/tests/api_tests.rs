//! Integration tests for account, lookup, dashboard and notification endpoints
//!
//! Each test builds the full router over an in-memory database and drives it
//! with `oneshot` requests.

mod helpers;

use axum::http::StatusCode;
use helpers::{error_code, TestApp, TEST_PASSWORD};
use serde_json::json;

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = TestApp::new().await;

    let (status, body) = app.call("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "aedpics-api");
    assert!(body["version"].is_string());
    assert!(body["uptimeSeconds"].is_u64());
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = TestApp::new().await;

    let (status, body) = app.call("GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "UNAUTHORIZED");

    let (status, _) = app.call("GET", "/api/auth/me", Some("not-a-real-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_me_logout() {
    let app = TestApp::new().await;
    let org = app.org("서울 중구 보건소", "health_center", "11", Some("110")).await;

    let (status, user) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": "new.inspector@example.kr",
                "password": "long-enough-pw",
                "fullName": "김신규",
                "phone": "010-1234-5678",
                "organizationId": org,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["role"], "pending_approval");
    assert!(user.get("passwordHash").is_none());
    assert!(user.get("phoneEncrypted").is_none());

    let (status, login) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "NEW.INSPECTOR@example.kr", "password": "long-enough-pw" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 43);

    let (status, me) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "new.inspector@example.kr");
    assert_eq!(me["phone"], "010-1234-5678");
    assert_eq!(me["regionCode"], "11");
    assert_eq!(me["cityCode"], "110");

    let (status, _) = app.call("POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_validation_and_duplicate_email() {
    let app = TestApp::new().await;

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": "a@example.kr", "password": "short", "fullName": "짧은" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": "not-an-email", "password": "long-enough-pw", "fullName": "이메일" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let register = json!({ "email": "dup@example.kr", "password": "long-enough-pw", "fullName": "중복" });
    let (status, _) = app.call("POST", "/api/auth/register", None, Some(register.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.call("POST", "/api/auth/register", None, Some(register)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CONFLICT");
}

#[tokio::test]
async fn test_email_uniqueness_ignores_case() {
    let app = TestApp::new().await;

    let register = json!({ "email": "Kim@example.kr", "password": "long-enough-pw", "fullName": "김" });
    let (status, _) = app.call("POST", "/api/auth/register", None, Some(register)).await;
    assert_eq!(status, StatusCode::CREATED);

    let register = json!({ "email": "kim@example.kr", "password": "another-password", "fullName": "김" });
    let (status, body) = app.call("POST", "/api/auth/register", None, Some(register)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CONFLICT");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_profiles")
        .fetch_one(app.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "KIM@EXAMPLE.KR", "password": "long-enough-pw" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_input_uses_error_body() {
    let app = TestApp::new().await;
    let token = app.user("kim", "local_admin", None).await;

    let (status, body) = app
        .call("POST", "/api/auth/login", None, Some(json!({ "email": 5, "password": [] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "BAD_REQUEST");
    assert!(body["error"]["message"].is_string());

    let (status, body) = app.get("/api/devices?page=abc", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "BAD_REQUEST");
}

#[tokio::test]
async fn test_login_failures() {
    let app = TestApp::new().await;
    app.user("kim", "local_admin", None).await;
    app.user("lee", "rejected", None).await;

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "kim@example.kr", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "nobody@example.kr", "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "lee@example.kr", "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Account administration
// =============================================================================

#[tokio::test]
async fn test_approve_pending_user_flow() {
    let app = TestApp::new().await;
    let org = app.org("부산 보건소", "health_center", "26", Some("260")).await;
    let master = app.user("root", "master", None).await;
    let applicant = app.user("applicant", "pending_approval", None).await;

    let (status, pending) = app.get("/api/admin/users/pending", &master).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    // Unapproved accounts cannot use scoped features
    let (status, _) = app.get("/api/dashboard", &applicant).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = app
        .post(
            "/api/admin/users/applicant/approve",
            &master,
            json!({ "role": "local_admin", "organizationId": org }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["role"], "local_admin");
    assert_eq!(approved["approvedBy"], "root");

    // Same token now carries the new role
    let (status, me) = app.get("/api/auth/me", &applicant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "local_admin");
    assert_eq!(me["regionCode"], "26");

    let (status, _) = app
        .post("/api/admin/users/applicant/approve", &master, json!({ "role": "local_admin" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post("/api/admin/users/ghost/approve", &master, json!({ "role": "local_admin" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, notes) = app.get("/api/notifications", &applicant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notes[0]["kind"], "account_approved");

    let (status, logs) = app.get("/api/admin/audit-logs", &master).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["items"][0]["action"], "user.approve");
}

#[tokio::test]
async fn test_approval_permissions() {
    let app = TestApp::new().await;
    let center = app.user("center", "emergency_center_admin", None).await;
    let local = app.user("local", "local_admin", None).await;
    app.user("applicant", "pending_approval", None).await;

    let (status, _) = app.get("/api/admin/users/pending", &local).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Only master may grant master
    let (status, _) = app
        .post("/api/admin/users/applicant/approve", &center, json!({ "role": "master" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/api/admin/users/applicant/approve", &center, json!({ "role": "pending_approval" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/api/admin/audit-logs", &center).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, rejected) = app
        .post("/api/admin/users/applicant/reject", &center, json!({ "reason": "소속 확인 불가" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["role"], "rejected");
    assert_eq!(rejected["rejectionReason"], "소속 확인 불가");
}

// =============================================================================
// Devices and organizations
// =============================================================================

#[tokio::test]
async fn test_device_search_is_scoped() {
    let app = TestApp::new().await;
    let jung = app.org("중구 보건소", "health_center", "11", Some("110")).await;
    let seoul = app.org("서울시", "province", "11", None).await;
    let local = app.user("local", "local_admin", Some(jung)).await;
    let regional = app.user("regional", "regional_admin", Some(seoul)).await;
    let ministry = app.user("ministry", "ministry_admin", None).await;

    app.device("M-1", "SN-1", "중구청", "11", Some("110")).await;
    app.device("M-2", "SN-2", "종로구청", "11", Some("120")).await;
    app.device("M-3", "SN-3", "해운대구청", "26", Some("260")).await;

    let (_, page) = app.get("/api/devices", &local).await;
    assert_eq!(page["total"], 1);
    let (_, page) = app.get("/api/devices", &regional).await;
    assert_eq!(page["total"], 2);
    let (_, page) = app.get("/api/devices", &ministry).await;
    assert_eq!(page["total"], 3);

    // A local role needs both region and city on its organization
    let cityless = app.user("cityless", "local_admin", Some(seoul)).await;
    let (status, page) = app.get("/api/devices", &cityless).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 0);

    // Wildcards in the query are literal
    let (_, page) = app.get("/api/devices?q=SN-", &ministry).await;
    assert_eq!(page["total"], 3);
    let (_, page) = app.get("/api/devices?q=SN_", &ministry).await;
    assert_eq!(page["total"], 0);
    let (_, page) = app.get("/api/devices?q=%25", &ministry).await;
    assert_eq!(page["total"], 0);

    let (status, page) = app.get("/api/devices?q=%EC%A2%85%EB%A1%9C", &ministry).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["equipmentSerial"], "SN-2");

    let (status, _) = app.get("/api/devices/SN-3", &local).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, rows) = app.get("/api/devices/SN-1", &local).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_serials_and_import() {
    let app = TestApp::new().await;
    let master = app.user("root", "master", None).await;
    let local = app.user("local", "local_admin", None).await;

    let rows = json!([
        { "equipmentSerial": "DUP-1", "managementNumber": "M-10", "installationInstitution": "A 병원", "regionCode": "11" },
        { "equipmentSerial": "DUP-1", "managementNumber": "M-11", "installationInstitution": "A 병원 별관", "regionCode": "11" },
        { "equipmentSerial": "ONE-1", "managementNumber": "M-12", "installationInstitution": "B 의원", "regionCode": "11" },
    ]);

    let (status, _) = app.post("/api/devices/import", &local, rows.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, result) = app.post("/api/devices/import", &master, rows).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["received"], 3);
    assert_eq!(result["written"], 3);

    let (status, dups) = app.get("/api/devices/duplicates", &master).await;
    assert_eq!(status, StatusCode::OK);
    let dups = dups.as_array().unwrap();
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0]["equipmentSerial"], "DUP-1");
    assert_eq!(dups[0]["rowCount"], 2);
}

#[tokio::test]
async fn test_organization_lookup() {
    let app = TestApp::new().await;
    let token = app.user("kim", "local_admin", None).await;
    app.org("중구 보건소", "health_center", "11", Some("110")).await;
    app.org("종로구 보건소", "health_center", "11", Some("120")).await;
    app.org("서울특별시", "province", "11", None).await;

    let (status, _) = app.get("/api/organizations/search", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, found) = app.get("/api/organizations/search?q=%EB%B3%B4%EA%B1%B4%EC%86%8C", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.as_array().unwrap().len(), 2);

    let (status, found) = app.get("/api/organizations/search?q=_", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(found.as_array().unwrap().is_empty());

    let (status, centers) = app
        .get("/api/organizations/health-centers?regionCode=11&cityCode=120", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(centers.as_array().unwrap().len(), 1);
    assert_eq!(centers[0]["name"], "종로구 보건소");
}

// =============================================================================
// Dashboard and public statistics
// =============================================================================

#[tokio::test]
async fn test_public_stats_without_auth() {
    let app = TestApp::new().await;
    app.device("M-1", "SN-1", "중구청", "11", Some("110")).await;
    app.target("T-1", "중구청", "11", Some("110")).await;

    let (status, stats) = app.call("GET", "/api/stats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalDevices"], 1);
    assert_eq!(stats["totalInspections"], 0);
    assert_eq!(stats["targetInstitutions"], 1);
    assert_eq!(stats["confirmedTargets"], 0);
}

#[tokio::test]
async fn test_dashboard_shape() {
    let app = TestApp::new().await;
    let master = app.user("root", "master", None).await;
    app.device("M-1", "SN-1", "중구청", "11", Some("110")).await;

    let (status, summary) = app.get("/api/dashboard", &master).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["totalDevices"], 1);
    assert_eq!(summary["hourlyToday"].as_array().unwrap().len(), 24);
    assert_eq!(summary["daily"].as_array().unwrap().len(), 30);
    assert_eq!(summary["pendingApprovals"], 0);
}

// =============================================================================
// Push subscriptions and notifications
// =============================================================================

#[tokio::test]
async fn test_vapid_key_and_subscriptions() {
    let app = TestApp::new().await;
    let token = app.user("kim", "local_admin", None).await;

    let (status, key) = app.call("GET", "/api/push/vapid-public-key", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(key["publicKey"], "BTestVapidPublicKey");

    let subscription = json!({
        "endpoint": "https://push.example.com/send/abc",
        "keys": { "p256dh": "BPubKey", "auth": "authsecret" },
    });
    let (status, body) = app.post("/api/push/subscribe", &token, subscription.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscriptionCount"], 1);

    // Same endpoint again is an update, not a second subscription
    let (_, body) = app.post("/api/push/subscribe", &token, subscription).await;
    assert_eq!(body["subscriptionCount"], 1);

    let (status, _) = app
        .post("/api/push/subscribe", &token, json!({ "endpoint": "https://push.example.com/x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/api/push/unsubscribe", &token, json!({ "endpoint": "https://push.example.com/send/abc" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscriptionCount"], 0);
}

#[tokio::test]
async fn test_vapid_key_unavailable_when_not_configured() {
    let config = aedpics_common::config::ServiceConfig {
        vapid_public_key: None,
        ..helpers::test_config()
    };
    let app = TestApp::with_config(config).await;

    let (status, body) = app.call("GET", "/api/push/vapid-public-key", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "UNAVAILABLE");
}

#[tokio::test]
async fn test_notifications_read_flow() {
    let app = TestApp::new().await;
    let token = app.user("kim", "local_admin", None).await;
    let other = app.user("park", "local_admin", None).await;

    for title in ["첫 번째", "두 번째"] {
        aedpics_api::db::notifications::insert(
            app.pool(),
            aedpics_api::db::notifications::NewNotification {
                recipient_id: "kim",
                kind: "schedule_assigned",
                title: title.to_string(),
                body: "본문".to_string(),
                link: None,
            },
        )
        .await
        .unwrap();
    }

    let (status, list) = app.get("/api/notifications?unreadOnly=true", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);
    let first_id = list[0]["id"].as_str().unwrap().to_string();

    // Another user's notification is invisible
    let (status, _) = app
        .call("POST", &format!("/api/notifications/{}/read", first_id), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call("POST", &format!("/api/notifications/{}/read", first_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = app.get("/api/notifications?unreadOnly=true", &token).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, body) = app.call("POST", "/api/notifications/read-all", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    let (_, list) = app.get("/api/notifications", &token).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_notification_bus_delivers_to_stream_subscribers() {
    let app = TestApp::new().await;
    app.user("kim", "local_admin", None).await;
    let mut rx = app.state.notifier.subscribe();

    app.state
        .notifier
        .notify(
            app.pool(),
            aedpics_api::db::notifications::NewNotification {
                recipient_id: "kim",
                kind: "inspection_approved",
                title: "승인".to_string(),
                body: "본문".to_string(),
                link: None,
            },
        )
        .await;

    let delivered = rx.recv().await.unwrap();
    assert_eq!(delivered.recipient_id, "kim");
    assert_eq!(delivered.kind, "inspection_approved");
}
