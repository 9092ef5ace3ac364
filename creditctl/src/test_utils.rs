//! Test utilities for integration testing (available with `test-utils` feature).

use std::sync::Arc;

use axum_test::TestServer;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;

use crate::{
    AppState, Config, build_router,
    db::{
        DbPool,
        models::{Account, NewAccount},
    },
    ledger::{ConsumeRequest, Decision},
    types::AccountId,
};

pub const TEST_SERVICE_KEY: &str = "test-service-key";

pub fn create_test_config() -> Config {
    Config {
        service_api_key: Some(TEST_SERVICE_KEY.to_string()),
        ..Config::default()
    }
}

/// In-memory SQLite pool with migrations applied. A single connection is
/// enough for handler tests; the gate's own concurrency tests build their own
/// file-backed pools.
pub async fn create_sqlite_test_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    sqlx::migrate!("./migrations/sqlite")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Full application router on an in-memory database, ready for axum-test.
pub async fn create_test_app() -> (TestServer, Arc<DbPool>) {
    let db = Arc::new(DbPool::from_sqlite(create_sqlite_test_pool().await));
    let state = AppState::builder()
        .db(db.clone())
        .config(create_test_config())
        .build();
    let server = TestServer::new(build_router(state)).expect("Failed to create test server");
    (server, db)
}

pub fn auth_headers() -> (String, String) {
    (
        "authorization".to_string(),
        format!("Bearer {TEST_SERVICE_KEY}"),
    )
}

pub async fn create_account(db: &DbPool, tier: &str, topup_credits: i64) -> Account {
    db.accounts()
        .create(&NewAccount {
            name: None,
            tier: tier.to_string(),
            topup_credits,
        })
        .await
        .expect("Failed to create account")
}

/// Run one counted gate call directly against the storage layer.
pub async fn consume_one(
    db: &DbPool,
    account_id: AccountId,
    dedup_key: &str,
    base_limit: i64,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Decision {
    db.ledger()
        .consume(&ConsumeRequest {
            account_id,
            dedup_key: dedup_key.to_string(),
            request_id: format!("req-{dedup_key}"),
            tier: "free".to_string(),
            base_limit,
            period_start,
            period_end,
            video_id: None,
            counted: true,
        })
        .await
        .expect("Gate call failed")
}
