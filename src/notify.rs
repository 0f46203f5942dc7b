//! Payment-confirmation webhook support.
//!
//! When configured via `NOTIFY_WEBHOOK_URL`, payrec emits an event after a
//! payment is matched and credited. Downstream systems (email, in-app
//! notifications) hang off this hook; payrec itself stays lean.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;

/// Retry delays in milliseconds for confirmation webhooks.
/// Quick retries (100ms, 200ms) to avoid holding the webhook response.
const NOTIFY_RETRY_DELAYS: &[u64] = &[100, 200];

/// Payment confirmation payload (owned version for async spawning).
#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmedEvent {
    /// Event type: always "payment_confirmed"
    pub event: &'static str,
    pub intent_id: String,
    pub user_id: String,
    /// Ledger transaction id (serves as idempotency key downstream)
    pub transaction_id: String,
    /// Unix timestamp
    pub timestamp: i64,
}

impl PaymentConfirmedEvent {
    pub fn new(intent_id: String, user_id: String, transaction_id: String) -> Self {
        Self {
            event: "payment_confirmed",
            intent_id,
            user_id,
            transaction_id,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Spawn a fire-and-forget payment confirmation.
///
/// If no webhook URL is configured, this is a no-op. The event is sent in
/// a background task and failures don't affect the caller. Panics in the
/// spawned task are logged rather than silently swallowed.
pub fn spawn_payment_confirmation(
    client: Client,
    notify_url: Option<String>,
    event: PaymentConfirmedEvent,
) {
    if let Some(url) = notify_url {
        let intent_id = event.intent_id.clone();
        tokio::spawn(
            AssertUnwindSafe(async move {
                send_confirmation(&client, &url, &event).await;
            })
            .catch_unwind()
            .map(move |result| {
                if let Err(panic) = result {
                    let panic_msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        "Confirmation task panicked for intent '{}': {}",
                        intent_id,
                        panic_msg
                    );
                }
            }),
        );
    }
}

/// Send a confirmation event to the configured webhook URL.
///
/// This is fire-and-forget - failures are logged but don't affect the
/// reconciliation that already happened.
async fn send_confirmation(client: &Client, url: &str, event: &PaymentConfirmedEvent) {
    for (attempt, delay_ms) in std::iter::once(&0u64)
        .chain(NOTIFY_RETRY_DELAYS.iter())
        .enumerate()
    {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client
            .post(url)
            .json(event)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                if attempt > 0 {
                    tracing::debug!("Confirmation webhook succeeded after {} retries", attempt);
                }
                return;
            }
            Ok(resp) => {
                tracing::debug!("Confirmation webhook returned {}", resp.status());
            }
            Err(e) => {
                tracing::debug!("Confirmation webhook failed: {}", e);
            }
        }
    }

    tracing::warn!(
        "Confirmation webhook failed after {} attempts for intent {}",
        NOTIFY_RETRY_DELAYS.len() + 1,
        event.intent_id
    );
}
