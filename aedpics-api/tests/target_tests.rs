//! Integration tests for target-list confirmation and device matching

mod helpers;

use axum::http::StatusCode;
use helpers::TestApp;
use serde_json::json;

struct Fixture {
    app: TestApp,
    admin: String,
    inspector: String,
}

async fn fixture() -> Fixture {
    let app = TestApp::new().await;
    let jung = app.org("중구 보건소", "health_center", "11", Some("110")).await;
    let admin = app.user("admin", "local_admin", Some(jung)).await;
    let inspector = app.user("inspector", "temporary_inspector", Some(jung)).await;

    app.target("T-1", "(주)중구청", "11", Some("110")).await;
    app.target("T-2", "종로구청", "11", Some("120")).await;

    app.device("M-1", "SN-1", "중구청", "11", Some("110")).await;
    app.device("M-2", "SN-2", "중구 청", "11", Some("110")).await;
    app.device("M-3", "SN-3", "중구청사", "11", Some("110")).await;
    app.device("M-4", "SN-4", "중구청", "26", Some("260")).await;

    Fixture { app, admin, inspector }
}

#[tokio::test]
async fn test_list_targets_in_scope() {
    let f = fixture().await;

    let (status, page) = f.app.get("/api/targets", &f.admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["targetKey"], "T-1");
    assert_eq!(page["items"][0]["deviceCount"], 0);
    assert!(page["items"][0].get("normalizedName").is_none());

    let (status, _) = f.app.get("/api/targets/T-2", &f.admin).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = f.app.get("/api/targets/NOPE", &f.admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_confirm_only_supported_year() {
    let f = fixture().await;

    let (status, body) = f.app.post("/api/targets/T-1/confirm", &f.admin, json!({ "year": 2025 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "아직 지원되지 않는 연도입니다");

    let (status, body) = f.app.post("/api/targets/T-1/confirm", &f.admin, json!({ "year": "2025" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = f.app.post("/api/targets/T-1/confirm", &f.inspector, json!({ "year": 2024 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, target) = f.app.post("/api/targets/T-1/confirm", &f.admin, json!({ "year": 2024 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(target["confirmed2024"], true);
    assert_eq!(target["confirmedBy"], "admin");

    let (_, page) = f.app.get("/api/targets?confirmed=true", &f.admin).await;
    assert_eq!(page["total"], 1);

    let (status, target) = f
        .app
        .call("DELETE", "/api/targets/T-1/confirm?year=2024", Some(&f.admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(target["confirmed2024"], false);
    assert!(target["confirmedBy"].is_null());

    let (_, page) = f.app.get("/api/targets?confirmed=true", &f.admin).await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn test_candidates_ranked_by_normalized_name() {
    let f = fixture().await;

    let (status, candidates) = f.app.get("/api/targets/T-1/candidates", &f.admin).await;
    assert_eq!(status, StatusCode::OK);
    let candidates = candidates.as_array().unwrap();

    // Other regions never appear
    let serials: Vec<&str> = candidates
        .iter()
        .map(|c| c["device"]["equipmentSerial"].as_str().unwrap())
        .collect();
    assert_eq!(serials, vec!["SN-1", "SN-2", "SN-3"]);
    assert_eq!(candidates[0]["distance"], 0);
    assert_eq!(candidates[0]["similarity"], 1.0);
    assert_eq!(candidates[2]["distance"], 1);
    assert_eq!(candidates[0]["alreadyMapped"], false);

    let (_, limited) = f.app.get("/api/targets/T-1/candidates?limit=1", &f.admin).await;
    assert_eq!(limited.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_auto_match_is_idempotent() {
    let f = fixture().await;

    let (status, result) = f.app.call("POST", "/api/targets/T-1/auto-match", Some(&f.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["added"], 2);
    assert_eq!(result["mappings"].as_array().unwrap().len(), 2);
    assert_eq!(result["mappings"][0]["matchedBy"], "auto");

    let (_, result) = f.app.call("POST", "/api/targets/T-1/auto-match", Some(&f.admin), None).await;
    assert_eq!(result["added"], 0);

    let (_, candidates) = f.app.get("/api/targets/T-1/candidates", &f.admin).await;
    assert_eq!(candidates[0]["alreadyMapped"], true);
    assert_eq!(candidates[2]["alreadyMapped"], false);

    let (_, page) = f.app.get("/api/targets", &f.admin).await;
    assert_eq!(page["items"][0]["deviceCount"], 2);
}

#[tokio::test]
async fn test_manual_map_verify_unmap() {
    let f = fixture().await;

    let (status, mapping) = f
        .app
        .post("/api/targets/T-1/devices", &f.admin, json!({ "equipmentSerial": "SN-3" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(mapping["matchedBy"], "manual");
    assert_eq!(mapping["matchedUser"], "admin");

    let (status, _) = f
        .app
        .post("/api/targets/T-1/devices", &f.admin, json!({ "equipmentSerial": "SN-3" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = f
        .app
        .post("/api/targets/T-1/devices", &f.admin, json!({ "equipmentSerial": "NO-SUCH" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, mappings) = f
        .app
        .call("POST", "/api/targets/T-1/devices/SN-3/verify", Some(&f.admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mappings[0]["matchedBy"], "verified");

    let (status, detail) = f.app.get("/api/targets/T-1", &f.admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["target"]["targetKey"], "T-1");
    assert_eq!(detail["mappings"].as_array().unwrap().len(), 1);
    assert_eq!(detail["devices"][0]["managementNumber"], "M-3");

    let (status, _) = f
        .app
        .call("DELETE", "/api/targets/T-1/devices/SN-3", Some(&f.admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = f
        .app
        .call("DELETE", "/api/targets/T-1/devices/SN-3", Some(&f.admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = f
        .app
        .call("POST", "/api/targets/T-1/devices/SN-3/verify", Some(&f.admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_auto_match_normalizes_unprocessed_target() {
    let f = fixture().await;
    // Loaded straight into the table without a TNMS name
    sqlx::query(
        "INSERT INTO target_list_2025 (target_key, institution_name, region_code, city_code)
         VALUES ('T-3', '(주)중구청', '11', '110')",
    )
    .execute(f.app.pool())
    .await
    .unwrap();

    let (_, candidates) = f.app.get("/api/targets/T-3/candidates", &f.admin).await;
    assert_eq!(candidates.as_array().unwrap().len(), 3);

    let (status, result) = f.app.call("POST", "/api/targets/T-3/auto-match", Some(&f.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["added"], 2);

    let stored: String = sqlx::query_scalar("SELECT normalized_name FROM target_list_2025 WHERE target_key = 'T-3'")
        .fetch_one(f.app.pool())
        .await
        .unwrap();
    assert_eq!(stored, "중구청");
}
