//! User-facing payment endpoints: intent creation, status polling,
//! payment history, and the public pricing catalogue.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::code;
use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{Json, Path, Query};
use crate::models::{
    pricing_catalogue, AuditAction, IntentStatus, PaymentIntent, PlanCode, QrPayload,
};
use crate::util::{extract_request_info, EntityType};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/intents", post(create_intent))
        .route("/payments/intents/{id}", get(get_intent))
        .route("/payments/intents/{id}/cancel", post(cancel_intent))
        .route("/payments/history", get(history))
        .route("/payments/pricing", get(pricing))
}

#[derive(Debug, Deserialize)]
struct CreateIntentRequest {
    plan: String,
}

async fn create_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateIntentRequest>,
) -> Result<Response> {
    let plan: PlanCode = req
        .plan
        .parse()
        .map_err(|_| AppError::BadRequest(format!("unknown plan '{}'", req.plan)))?;

    let conn = state.db.get()?;
    let now = Utc::now().timestamp();

    let pending = queries::count_active_pending_intents(&conn, &user.id, now)?;
    if pending >= state.config.max_pending_intents {
        return Err(AppError::TooManyRequests(format!(
            "you already have {} pending payment requests; complete or let them expire first",
            pending
        )));
    }

    let transfer_code = code::generate_transfer_code(&conn)?;
    let amount = plan.price_vnd();
    let description = format!("{} {}", transfer_code, plan.as_ref());
    let qr_code_url = vietqr_url(&state, amount, &transfer_code)?;

    let intent = PaymentIntent {
        id: EntityType::PaymentIntent.gen_id(),
        user_id: user.id.clone(),
        plan,
        amount,
        currency: "VND".to_string(),
        transfer_code: transfer_code.clone(),
        status: IntentStatus::Pending,
        qr_payload: QrPayload {
            bank_code: state.config.bank_code.clone(),
            account_number: state.config.bank_account_number.clone(),
            account_name: state.config.bank_account_name.clone(),
            description,
            qr_code_url,
        },
        transaction_id: None,
        metadata: None,
        created_at: now,
        expires_at: now + state.config.intent_ttl_minutes * 60,
        paid_at: None,
        cancelled_at: None,
    };
    queries::insert_payment_intent(&conn, &intent)?;

    let (ip, user_agent) = extract_request_info(&headers);
    match state.audit.get() {
        Ok(audit_conn) => {
            if let Err(e) = queries::create_audit_event(
                &audit_conn,
                Some(&user.id),
                AuditAction::PaymentIntentCreated,
                Some(&serde_json::json!({
                    "intent_id": intent.id,
                    "plan": plan,
                    "amount": amount,
                })),
                ip.as_deref(),
                user_agent.as_deref(),
            ) {
                tracing::warn!("Failed to write intent audit event: {}", e);
            }
        }
        Err(e) => tracing::warn!("Audit DB unavailable: {}", e),
    }

    tracing::info!(
        intent_id = %intent.id,
        user_id = %user.id,
        plan = plan.as_ref(),
        "payment intent created"
    );

    Ok((StatusCode::CREATED, Json(intent_view(&intent, now))).into_response())
}

async fn get_intent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Response> {
    let conn = state.db.get()?;
    let intent = queries::get_payment_intent(&conn, &id)?
        .filter(|i| i.user_id == user.id)
        .or_not_found("payment intent not found")?;

    let now = Utc::now().timestamp();
    // Status can flip at any second; never let clients cache it.
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(intent_view(&intent, now)),
    )
        .into_response())
}

/// Cancel a pending intent. The pending guard means a concurrent payment
/// or sweep wins the race; the caller gets a conflict instead of a
/// clobbered settlement.
async fn cancel_intent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let intent = queries::get_payment_intent(&conn, &id)?
        .filter(|i| i.user_id == user.id)
        .or_not_found("payment intent not found")?;

    let now = Utc::now().timestamp();
    if !queries::try_cancel_intent(&conn, &intent.id, now)? {
        return Err(AppError::Conflict(
            "payment intent is no longer pending".to_string(),
        ));
    }

    tracing::info!(intent_id = %intent.id, user_id = %user.id, "payment intent cancelled");

    let intent = queries::get_payment_intent(&conn, &intent.id)?
        .or_not_found("payment intent not found")?;
    Ok(Json(serde_json::json!({ "intent": intent_view(&intent, now) })))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

async fn history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let conn = state.db.get()?;
    let transactions = queries::list_user_transactions(&conn, &user.id, limit, offset)?;

    Ok(Json(serde_json::json!({
        "page": page,
        "limit": limit,
        "transactions": transactions,
    })))
}

async fn pricing() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "pricing": pricing_catalogue() }))
}

/// Client view of an intent: persisted fields plus the lazily derived
/// status and countdown.
fn intent_view(intent: &PaymentIntent, now: i64) -> serde_json::Value {
    serde_json::json!({
        "id": intent.id,
        "plan": intent.plan,
        "amount": intent.amount,
        "currency": intent.currency,
        "transfer_code": intent.transfer_code,
        "status": intent.client_status(now),
        "qr_payload": intent.qr_payload,
        "created_at": intent.created_at,
        "expires_at": intent.expires_at,
        "remaining_seconds": intent.remaining_seconds(now),
        "paid_at": intent.paid_at,
    })
}

/// Build the VietQR image URL for the payer-facing QR code.
fn vietqr_url(state: &AppState, amount: i64, transfer_code: &str) -> Result<String> {
    let base = format!(
        "https://img.vietqr.io/image/{}-{}-compact2.png",
        state.config.bank_code, state.config.bank_account_number
    );
    let url = reqwest::Url::parse_with_params(
        &base,
        &[
            ("amount", amount.to_string()),
            ("addInfo", transfer_code.to_string()),
            ("accountName", state.config.bank_account_name.clone()),
        ],
    )
    .map_err(|e| AppError::Internal(format!("failed to build VietQR URL: {}", e)))?;
    Ok(url.to_string())
}
