mod schema;
pub mod from_row;
pub mod queries;

pub use schema::{init_audit_db, init_db};

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding database pools and configuration
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (users, payment intents, transactions)
    pub db: DbPool,
    /// Audit database pool (webhook attempts + audit events, separate file
    /// to isolate append-only growth)
    pub audit: DbPool,
    /// Shared client for the outbound confirmation webhook
    pub http_client: reqwest::Client,
    pub config: Arc<Config>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
