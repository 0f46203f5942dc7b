//! Background expiry sweeper.
//!
//! Lapsed pending intents already read as expired through the lazy status
//! view; the sweeper persists that transition so the pending cap and the
//! unmatched listings stay accurate without every reader re-deriving it.

use std::time::Duration;

use crate::db::{queries, AppState};

/// Spawns a background task that periodically expires lapsed pending intents.
///
/// The UPDATE is guarded on `status = 'pending'`, so a sweep can never
/// clobber an intent a concurrent webhook just flipped to paid, and
/// running it twice is harmless.
pub fn spawn_expiry_sweeper(state: AppState) {
    let interval = Duration::from_secs(state.config.sweep_interval_secs);

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => {
                    let now = chrono::Utc::now().timestamp();
                    match queries::sweep_expired_intents(&conn, now) {
                        Ok(count) => {
                            if count > 0 {
                                tracing::debug!("Expired {} lapsed payment intents", count);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Failed to sweep expired intents: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to get db connection for sweeper: {}", e);
                }
            }
        }
    });

    tracing::info!(
        "Expiry sweeper started (runs every {}s)",
        interval.as_secs()
    );
}
