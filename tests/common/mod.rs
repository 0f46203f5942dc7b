//! Test utilities and fixtures for payrec integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use payrec::config::Config;
pub use payrec::db::{init_audit_db, init_db, queries, AppState};
pub use payrec::models::*;
pub use payrec::util::hash_token;

pub const USER_TOKEN: &str = "test_user_token";
pub const ADMIN_TOKEN: &str = "test_admin_token";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an in-memory test audit database with schema initialized
pub fn setup_test_audit_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory audit database");
    init_audit_db(&conn).expect("Failed to initialize audit schema");
    conn
}

/// Test configuration with both webhook secrets set and production off.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: ":memory:".to_string(),
        audit_database_path: ":memory:".to_string(),
        production: false,
        sepay_api_key: Some("sepay_test_key".to_string()),
        casso_webhook_secret: Some("casso_test_secret".to_string()),
        bank_code: "970422".to_string(),
        bank_account_number: "0359123456".to_string(),
        bank_account_name: "PAYREC TEST".to_string(),
        notify_webhook_url: None,
        max_pending_intents: 5,
        intent_ttl_minutes: 15,
        sweep_interval_secs: 60,
        webhook_retention_days: 90,
    }
}

/// Create an AppState for testing with in-memory databases.
///
/// Pools are capped at one connection so every checkout sees the same
/// in-memory database.
pub fn create_test_app_state() -> AppState {
    create_test_app_state_with(test_config())
}

pub fn create_test_app_state_with(config: Config) -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let audit_manager = SqliteConnectionManager::memory();
    let audit_pool = Pool::builder().max_size(1).build(audit_manager).unwrap();
    {
        let conn = audit_pool.get().unwrap();
        init_audit_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        audit: audit_pool,
        http_client: reqwest::Client::new(),
        config: Arc::new(config),
    }
}

/// Full application router, the same composition as main.rs.
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .merge(payrec::handlers::payments::router())
        .merge(payrec::handlers::webhooks::router())
        .merge(payrec::handlers::admin::router())
        .with_state(state)
}

/// Create a test user with a known bearer token.
pub fn create_test_user(conn: &Connection, email: &str, role: UserRole, token: &str) -> User {
    queries::create_user(
        conn,
        email,
        &format!("Test {}", email),
        role,
        &hash_token(token),
    )
    .expect("Failed to create test user")
}

/// Seed the standard user + admin pair into a state's database.
pub fn seed_users(state: &AppState) -> (User, User) {
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "user@example.com", UserRole::User, USER_TOKEN);
    let admin = create_test_user(&conn, "admin@example.com", UserRole::Admin, ADMIN_TOKEN);
    (user, admin)
}

/// Insert a pending payment intent directly, bypassing the HTTP layer.
pub fn create_test_intent(
    conn: &Connection,
    user_id: &str,
    plan: PlanCode,
    transfer_code: &str,
    expires_at: i64,
) -> PaymentIntent {
    let now = chrono::Utc::now().timestamp();
    let intent = PaymentIntent {
        id: payrec::util::EntityType::PaymentIntent.gen_id(),
        user_id: user_id.to_string(),
        plan,
        amount: plan.price_vnd(),
        currency: "VND".to_string(),
        transfer_code: transfer_code.to_string(),
        status: IntentStatus::Pending,
        qr_payload: QrPayload {
            bank_code: "970422".to_string(),
            account_number: "0359123456".to_string(),
            account_name: "PAYREC TEST".to_string(),
            description: transfer_code.to_string(),
            qr_code_url: "https://img.vietqr.io/image/test.png".to_string(),
        },
        transaction_id: None,
        metadata: None,
        created_at: now,
        expires_at,
        paid_at: None,
        cancelled_at: None,
    };
    queries::insert_payment_intent(conn, &intent).expect("Failed to insert test intent");
    intent
}

/// A normalized incoming bank transaction carrying the given description.
pub fn bank_tx(provider_tx_id: &str, amount: i64, description: &str) -> BankTransaction {
    BankTransaction {
        provider_tx_id: provider_tx_id.to_string(),
        provider: "sepay",
        direction: TransferDirection::Incoming,
        amount,
        currency: "VND".to_string(),
        description: description.to_string(),
        bank_code: Some("MBBank".to_string()),
        sender_name: None,
        sender_account: None,
        raw: serde_json::json!({ "test": true }),
    }
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a future timestamp (minutes from now)
pub fn future_timestamp(minutes: i64) -> i64 {
    now() + minutes * 60
}

/// Get a past timestamp (minutes ago)
pub fn past_timestamp(minutes: i64) -> i64 {
    now() - minutes * 60
}
