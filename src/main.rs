use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use payrec::config::Config;
use payrec::db::{create_pool, init_audit_db, init_db, queries, AppState};
use payrec::handlers;
use payrec::models::UserRole;
use payrec::sweeper::spawn_expiry_sweeper;
use payrec::util::hash_token;

#[derive(Parser, Debug)]
#[command(name = "payrec", about = "Bank-transfer payment reconciliation service")]
struct Cli {
    /// Seed development fixtures (a user and an admin with known tokens)
    #[arg(long)]
    seed: bool,

    /// Delete database files on shutdown (dev only)
    #[arg(long)]
    ephemeral: bool,
}

/// Insert a dev user and admin with well-known bearer tokens.
/// Safe to run repeatedly; existing rows are left alone.
fn seed_dev_data(state: &AppState) {
    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Seed skipped, no db connection: {}", e);
            return;
        }
    };

    let fixtures = [
        ("dev@example.com", "Dev User", UserRole::User, "dev_user_token"),
        ("admin@example.com", "Dev Admin", UserRole::Admin, "dev_admin_token"),
    ];
    for (email, name, role, token) in fixtures {
        match queries::create_user(&conn, email, name, role, &hash_token(token)) {
            Ok(user) => tracing::info!("Seeded {} ({}) with token '{}'", email, user.id, token),
            Err(_) => tracing::debug!("Seed user {} already exists", email),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "payrec=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if !config.production {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    // Create database connection pools
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    // Initialize database schemas
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        http_client: reqwest::Client::new(),
        config: Arc::new(config.clone()),
    };

    // Purge old webhook attempts on startup (0 = never purge)
    if config.webhook_retention_days > 0 {
        let conn = state
            .audit
            .get()
            .expect("Failed to get audit connection for purge");
        match queries::purge_old_webhook_attempts(&conn, config.webhook_retention_days) {
            Ok(count) if count > 0 => {
                tracing::info!(
                    "Purged {} webhook attempts older than {} days",
                    count,
                    config.webhook_retention_days
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to purge old webhook attempts: {}", e);
            }
        }
    }

    // Seed dev data if --seed flag is passed (only outside production)
    if cli.seed {
        if config.production {
            tracing::warn!("--seed flag ignored in production");
        } else {
            seed_dev_data(&state);
        }
    }

    // Start the background expiry sweeper
    spawn_expiry_sweeper(state.clone());

    // Build the application router
    let app = Router::new()
        // User-facing payment endpoints (bearer auth) + public pricing
        .merge(handlers::payments::router())
        // Webhook endpoints (provider-specific auth)
        .merge(handlers::webhooks::router())
        // Operator endpoints (admin bearer auth)
        .merge(handlers::admin::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && !config.production;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("payrec server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    // Cleanup on exit if ephemeral mode
    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
