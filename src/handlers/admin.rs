//! Operator endpoints: unmatched-transaction review, manual matching, and
//! the webhook delivery log.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AdminUser;
use crate::credit;
use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{Json, Query};
use crate::models::{AuditAction, IntentStatus};
use crate::util::extract_request_info;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/transactions/unmatched", get(list_unmatched))
        .route("/admin/transactions/match", post(manual_match))
        .route("/admin/webhooks/attempts", get(list_attempts))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn list_unmatched(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let conn = state.db.get()?;
    let transactions = queries::list_unmatched_transactions(&conn, limit)?;
    Ok(Json(serde_json::json!({ "transactions": transactions })))
}

#[derive(Debug, Deserialize)]
struct ManualMatchRequest {
    transaction_id: String,
    intent_id: String,
}

/// Link a reviewed transaction to an intent and credit the account.
///
/// Uses the same pending-guarded flip and crediting code as the automatic
/// path, so a webhook racing an operator still results in exactly one
/// credit.
async fn manual_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    AdminUser(admin): AdminUser,
    Json(req): Json<ManualMatchRequest>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;

    let transaction = queries::get_transaction(&conn, &req.transaction_id)?
        .or_not_found("transaction not found")?;
    let intent = queries::get_payment_intent(&conn, &req.intent_id)?
        .or_not_found("payment intent not found")?;

    if intent.status == IntentStatus::Paid {
        return Err(AppError::Conflict(
            "payment intent is already paid".to_string(),
        ));
    }

    // Flip the intent first: if the CAS loses to a concurrent automatic
    // settlement the ledger row is never touched, so a 409 leaves no
    // half-linked state behind.
    let now = Utc::now().timestamp();
    if !queries::try_force_intent_paid(&conn, &intent.id, &transaction.id, now)? {
        return Err(AppError::Conflict(
            "payment intent was settled concurrently".to_string(),
        ));
    }

    queries::mark_transaction_matched(&conn, &transaction.id, &intent.id, &intent.user_id)?;

    let audit_conn = state.audit.get()?;
    credit::apply_plan(&conn, &audit_conn, &intent.user_id, intent.plan, &intent.id)?;

    let (ip, user_agent) = extract_request_info(&headers);
    if let Err(e) = queries::create_audit_event(
        &audit_conn,
        Some(&admin.id),
        AuditAction::ManualMatch,
        Some(&serde_json::json!({
            "transaction_id": transaction.id,
            "intent_id": intent.id,
            "target_user_id": intent.user_id,
        })),
        ip.as_deref(),
        user_agent.as_deref(),
    ) {
        tracing::warn!("Failed to write manual match audit event: {}", e);
    }

    tracing::info!(
        transaction_id = %transaction.id,
        intent_id = %intent.id,
        admin_id = %admin.id,
        "transaction manually matched"
    );

    let transaction = queries::get_transaction(&conn, &transaction.id)?;
    let intent = queries::get_payment_intent(&conn, &intent.id)?;
    Ok(Json(serde_json::json!({
        "transaction": transaction,
        "intent": intent,
    })))
}

async fn list_attempts(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let audit_conn = state.audit.get()?;
    let attempts = queries::list_webhook_attempts(&audit_conn, limit)?;
    Ok(Json(serde_json::json!({ "attempts": attempts })))
}
