//! Common webhook handling infrastructure for bank transaction providers.
//!
//! This module provides a trait-based approach to unify SePay and Casso
//! webhook handlers: providers differ only in how deliveries are
//! authenticated and how payloads map to `BankTransaction`; everything
//! after that is shared.

use std::time::Instant;

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::config::Config;
use crate::db::{queries, AppState};
use crate::models::{AttemptStatus, BankTransaction, SignatureStatus};
use crate::notify::{spawn_payment_confirmation, PaymentConfirmedEvent};
use crate::reconcile::{self, Outcome};

/// Outcome of checking a delivery's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Credential configured and the delivery carried the right one.
    Verified,
    /// Credential configured but missing or wrong on the delivery.
    Invalid,
    /// No credential configured for this provider.
    NotConfigured,
}

/// Trait for bank transaction provider webhook handling.
///
/// Implementors provide provider-specific authentication and payload
/// parsing, while the common handler owns attempt logging, the credential
/// policy, and running transactions through the reconciliation engine.
pub trait WebhookProvider: Send + Sync {
    /// Provider name for logging and database storage (e.g., "sepay", "casso")
    fn provider_name(&self) -> &'static str;

    /// Check the delivery's credentials against the configured secret.
    fn verify(&self, config: &Config, headers: &HeaderMap, body: &[u8]) -> VerifyOutcome;

    /// Parse the webhook payload into normalized bank transactions.
    fn parse(&self, body: &[u8]) -> Result<Vec<BankTransaction>, &'static str>;
}

/// Generic webhook handler that delegates to provider-specific implementations.
///
/// Credential policy: a configured secret that fails to verify is always a
/// 401 and the engine never runs. A missing secret is a 401 in production;
/// outside production the delivery proceeds with the signature recorded as
/// skipped, so local development works without provider credentials.
///
/// Every delivery gets an attempt row in the audit database, written
/// `pending` before processing and finalized after, including rejected and
/// malformed ones.
pub async fn handle_webhook<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let headers_json = headers_to_json(&headers);
    let body_text = String::from_utf8_lossy(&body).into_owned();

    let audit_conn = match state.audit.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Audit DB connection error: {}", e);
            return internal_error();
        }
    };

    let signature_status = match provider.verify(&state.config, &headers, &body) {
        VerifyOutcome::Verified => SignatureStatus::Verified,
        VerifyOutcome::Invalid => {
            record_rejected_attempt(
                &audit_conn,
                provider.provider_name(),
                &headers_json,
                &body_text,
                SignatureStatus::Invalid,
                "invalid credentials",
                started,
            );
            return unauthorized();
        }
        VerifyOutcome::NotConfigured => {
            if state.config.production {
                record_rejected_attempt(
                    &audit_conn,
                    provider.provider_name(),
                    &headers_json,
                    &body_text,
                    SignatureStatus::Skipped,
                    "no credential configured",
                    started,
                );
                return unauthorized();
            }
            tracing::warn!(
                "{} webhook accepted without credential check (no secret configured)",
                provider.provider_name()
            );
            SignatureStatus::Skipped
        }
    };

    let attempt_id = match queries::insert_webhook_attempt(
        &audit_conn,
        provider.provider_name(),
        &headers_json,
        &body_text,
        signature_status,
    ) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to record webhook attempt: {}", e);
            return internal_error();
        }
    };

    let transactions = match provider.parse(&body) {
        Ok(txs) => txs,
        Err(msg) => {
            finalize(
                &audit_conn,
                &attempt_id,
                AttemptStatus::Failed,
                None,
                Some(msg),
                started,
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": msg })),
            )
                .into_response();
        }
    };

    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            finalize(
                &audit_conn,
                &attempt_id,
                AttemptStatus::Failed,
                None,
                Some("database unavailable"),
                started,
            );
            return internal_error();
        }
    };

    let mut results = Vec::with_capacity(transactions.len());
    let mut any_unmatched = false;

    for tx in &transactions {
        match reconcile::process_transaction(&conn, &audit_conn, tx) {
            Ok(outcome) => {
                if matches!(outcome, Outcome::Unmatched | Outcome::IntentNotFound) {
                    any_unmatched = true;
                }
                if let Outcome::Success {
                    ref intent_id,
                    ref user_id,
                    ref transaction_id,
                } = outcome
                {
                    spawn_payment_confirmation(
                        state.http_client.clone(),
                        state.config.notify_webhook_url.clone(),
                        PaymentConfirmedEvent::new(
                            intent_id.clone(),
                            user_id.clone(),
                            transaction_id.clone(),
                        ),
                    );
                }
                results.push(result_entry(tx, &outcome));
            }
            Err(e) => {
                tracing::error!(
                    "Reconciliation failed for {} transaction {}: {}",
                    provider.provider_name(),
                    tx.provider_tx_id,
                    e
                );
                finalize(
                    &audit_conn,
                    &attempt_id,
                    AttemptStatus::Failed,
                    Some(&serde_json::Value::Array(results)),
                    Some("processing error"),
                    started,
                );
                return internal_error();
            }
        }
    }

    let attempt_status = if any_unmatched {
        AttemptStatus::Unmatched
    } else {
        AttemptStatus::Processed
    };
    let results_json = serde_json::Value::Array(results);
    finalize(
        &audit_conn,
        &attempt_id,
        attempt_status,
        Some(&results_json),
        None,
        started,
    );

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "processed",
            "results": results_json,
        })),
    )
        .into_response()
}

fn result_entry(tx: &BankTransaction, outcome: &Outcome) -> serde_json::Value {
    let mut entry = serde_json::json!({
        "provider_tx_id": tx.provider_tx_id,
        "status": outcome.as_ref(),
    });
    if let Outcome::Success {
        intent_id,
        transaction_id,
        ..
    } = outcome
    {
        entry["intent_id"] = serde_json::json!(intent_id);
        entry["transaction_id"] = serde_json::json!(transaction_id);
    }
    entry
}

/// Attempt row for a delivery that never reached the engine.
fn record_rejected_attempt(
    audit_conn: &rusqlite::Connection,
    provider: &str,
    headers_json: &serde_json::Value,
    body_text: &str,
    signature_status: SignatureStatus,
    error: &str,
    started: Instant,
) {
    match queries::insert_webhook_attempt(
        audit_conn,
        provider,
        headers_json,
        body_text,
        signature_status,
    ) {
        Ok(id) => finalize(
            audit_conn,
            &id,
            AttemptStatus::Failed,
            None,
            Some(error),
            started,
        ),
        Err(e) => tracing::error!("Failed to record rejected webhook attempt: {}", e),
    }
}

fn finalize(
    audit_conn: &rusqlite::Connection,
    attempt_id: &str,
    status: AttemptStatus,
    results: Option<&serde_json::Value>,
    error: Option<&str>,
    started: Instant,
) {
    let elapsed_ms = started.elapsed().as_millis() as i64;
    if let Err(e) = queries::finalize_webhook_attempt(
        audit_conn,
        attempt_id,
        status,
        results,
        error,
        elapsed_ms,
    ) {
        tracing::warn!("Failed to finalize webhook attempt {}: {}", attempt_id, e);
    }
}

fn headers_to_json(headers: &HeaderMap) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                serde_json::Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect();
    serde_json::Value::Object(map)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal server error" })),
    )
        .into_response()
}
