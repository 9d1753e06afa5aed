//! Test Helper Utilities
//!
//! In-memory application with seeding helpers shared by the integration tests

#![allow(dead_code)]

use aedpics_api::auth::{password::hash_password, token};
use aedpics_api::db::auth_sessions;
use aedpics_api::{build_router, AppState};
use aedpics_common::config::ServiceConfig;
use aedpics_common::time::now;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use object_store::memory::InMemory;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "correct-horse-1";

/// Argon2 is slow in debug builds; every seeded user shares one hash
fn test_password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(TEST_PASSWORD).unwrap())
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ServiceConfig) -> Self {
        // One connection keeps the in-memory database alive and shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        aedpics_common::db::init_schema(&pool).await.unwrap();

        let state = AppState::new(pool, Arc::new(InMemory::new()), config);
        let router = build_router(state.clone());
        Self { state, router }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.state.db
    }

    pub async fn org(&self, name: &str, org_type: &str, region: &str, city: Option<&str>) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO organizations (name, org_type, region_code, city_code) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(org_type)
        .bind(region)
        .bind(city)
        .fetch_one(self.pool())
        .await
        .unwrap()
    }

    /// Insert a user with [`TEST_PASSWORD`] and return a live bearer token
    pub async fn user(&self, id: &str, role: &str, org_id: Option<i64>) -> String {
        sqlx::query(
            "INSERT INTO user_profiles (id, email, password_hash, full_name, role, organization_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
        )
        .bind(id)
        .bind(format!("{}@example.kr", id))
        .bind(test_password_hash())
        .bind(format!("사용자 {}", id))
        .bind(role)
        .bind(org_id)
        .execute(self.pool())
        .await
        .unwrap();

        self.token_for(id).await
    }

    pub async fn token_for(&self, user_id: &str) -> String {
        let raw = token::generate_token();
        auth_sessions::create(self.pool(), &token::hash_token(&raw), user_id, now() + Duration::hours(1))
            .await
            .unwrap();
        raw
    }

    pub async fn device(&self, management_number: &str, serial: &str, institution: &str, region: &str, city: Option<&str>) {
        sqlx::query(
            "INSERT INTO aed_data
                (equipment_serial, management_number, installation_institution, institution_normalized,
                 region_code, city_code, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, '2025-01-01T00:00:00Z')",
        )
        .bind(serial)
        .bind(management_number)
        .bind(institution)
        .bind(aedpics_common::tnms::normalize(institution))
        .bind(region)
        .bind(city)
        .execute(self.pool())
        .await
        .unwrap();
    }

    pub async fn target(&self, key: &str, name: &str, region: &str, city: Option<&str>) {
        sqlx::query(
            "INSERT INTO target_list_2025 (target_key, institution_name, normalized_name, region_code, city_code)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(name)
        .bind(aedpics_common::tnms::normalize(name))
        .bind(region)
        .bind(city)
        .execute(self.pool())
        .await
        .unwrap();
    }

    /// Send one request and return the status with the JSON body (Null when empty)
    pub async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call("GET", uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call("POST", uri, Some(token), Some(body)).await
    }
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        phone_encryption_key: "integration-test-key".to_string(),
        vapid_public_key: Some("BTestVapidPublicKey".to_string()),
        user_cache_ttl_secs: 0,
        ..ServiceConfig::default()
    }
}

/// Error code from a `{"error": {...}}` body
pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}
