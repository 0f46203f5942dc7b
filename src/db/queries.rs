use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::*;
use crate::util::EntityType;

use super::from_row::{
    query_all, query_one, INTENT_COLS, TRANSACTION_COLS, USER_COLS, WEBHOOK_ATTEMPT_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Users ============

pub fn create_user(
    conn: &Connection,
    email: &str,
    name: &str,
    role: UserRole,
    api_token_hash: &str,
) -> Result<User> {
    let id = EntityType::User.gen_id();
    let ts = now();
    conn.execute(
        "INSERT INTO users (id, email, name, role, plan, credits, api_token_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'free', 0, ?5, ?6, ?6)",
        params![&id, email, name, role.as_ref(), api_token_hash, ts],
    )?;
    Ok(User {
        id,
        email: email.to_string(),
        name: name.to_string(),
        role,
        plan: UserPlan::Free,
        credits: 0,
        plan_started_at: None,
        next_billing_date: None,
        last_payment_intent_id: None,
        api_token_hash: api_token_hash.to_string(),
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_token_hash(conn: &Connection, token_hash: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE api_token_hash = ?1", USER_COLS),
        &[&token_hash],
    )
}

/// Flip a user onto the pro plan and move their billing date forward.
pub fn upgrade_user_plan(
    conn: &Connection,
    user_id: &str,
    next_billing_date: i64,
    intent_id: &str,
) -> Result<()> {
    let ts = now();
    conn.execute(
        "UPDATE users SET plan = 'pro', plan_started_at = COALESCE(plan_started_at, ?1),
         next_billing_date = ?2, last_payment_intent_id = ?3, updated_at = ?1
         WHERE id = ?4",
        params![ts, next_billing_date, intent_id, user_id],
    )?;
    Ok(())
}

/// Add credits to a user's balance.
pub fn add_user_credits(
    conn: &Connection,
    user_id: &str,
    credits: i64,
    intent_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE users SET credits = credits + ?1, last_payment_intent_id = ?2, updated_at = ?3
         WHERE id = ?4",
        params![credits, intent_id, now(), user_id],
    )?;
    Ok(())
}

// ============ Payment Intents ============

pub fn transfer_code_exists(conn: &Connection, code: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM payment_intents WHERE transfer_code = ?1")?;
    Ok(stmt.exists(params![code])?)
}

/// Count a user's pending intents that have not yet passed their expiry.
/// Lapsed-but-unswept intents do not count against the cap.
pub fn count_active_pending_intents(conn: &Connection, user_id: &str, now: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM payment_intents
         WHERE user_id = ?1 AND status = 'pending' AND expires_at > ?2",
        params![user_id, now],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn insert_payment_intent(conn: &Connection, intent: &PaymentIntent) -> Result<()> {
    conn.execute(
        "INSERT INTO payment_intents (id, user_id, plan, amount, currency, transfer_code, status,
            qr_payload, transaction_id, metadata, created_at, expires_at, paid_at, cancelled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            &intent.id,
            &intent.user_id,
            intent.plan.as_ref(),
            intent.amount,
            &intent.currency,
            &intent.transfer_code,
            intent.status.as_ref(),
            serde_json::to_string(&intent.qr_payload)?,
            &intent.transaction_id,
            intent.metadata.as_ref().map(|m| m.to_string()),
            intent.created_at,
            intent.expires_at,
            intent.paid_at,
            intent.cancelled_at,
        ],
    )?;
    Ok(())
}

pub fn get_payment_intent(conn: &Connection, id: &str) -> Result<Option<PaymentIntent>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payment_intents WHERE id = ?1", INTENT_COLS),
        &[&id],
    )
}

pub fn get_intent_by_code(conn: &Connection, transfer_code: &str) -> Result<Option<PaymentIntent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_intents WHERE transfer_code = ?1",
            INTENT_COLS
        ),
        &[&transfer_code],
    )
}

/// Atomically flip an intent from a payable state to paid, linking the
/// winning transaction. Returns whether this call won the flip.
///
/// Compare-and-swap on the payable status set so that concurrent webhook
/// deliveries for the same intent credit the account exactly once.
/// Underpaid/failed/overpaid intents stay payable (a retried transfer can
/// still settle them); expired and cancelled never flip automatically.
pub fn try_mark_intent_paid(
    conn: &Connection,
    intent_id: &str,
    transaction_id: &str,
    paid_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents SET status = 'paid', paid_at = ?1, transaction_id = ?2
         WHERE id = ?3 AND status IN ('pending', 'underpaid', 'failed', 'overpaid')",
        params![paid_at, transaction_id, intent_id],
    )?;
    Ok(affected > 0)
}

/// Manual reconciliation flip: pays an intent out of any non-paid state
/// (an operator matching an expired intent is the normal case). The
/// not-paid guard still makes a concurrent automatic flip lose or win
/// cleanly. Returns whether this call won.
pub fn try_force_intent_paid(
    conn: &Connection,
    intent_id: &str,
    transaction_id: &str,
    paid_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents SET status = 'paid', paid_at = ?1, transaction_id = ?2
         WHERE id = ?3 AND status != 'paid'",
        params![paid_at, transaction_id, intent_id],
    )?;
    Ok(affected > 0)
}

/// Move a pending intent into a non-paid settled state (expired, underpaid).
/// Guarded on `status = 'pending'`; returns false when some other path
/// already moved the intent.
pub fn try_settle_intent(
    conn: &Connection,
    intent_id: &str,
    status: IntentStatus,
    metadata: Option<&serde_json::Value>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents SET status = ?1, metadata = COALESCE(?2, metadata)
         WHERE id = ?3 AND status = 'pending'",
        params![
            status.as_ref(),
            metadata.map(|m| m.to_string()),
            intent_id
        ],
    )?;
    Ok(affected > 0)
}

/// User-driven cancellation; valid only while pending.
pub fn try_cancel_intent(conn: &Connection, intent_id: &str, cancelled_at: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_intents SET status = 'cancelled', cancelled_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        params![cancelled_at, intent_id],
    )?;
    Ok(affected > 0)
}

/// Bulk-expire pending intents past their expiry. Returns rows changed.
/// The pending guard makes this idempotent and unable to clobber a paid flip.
pub fn sweep_expired_intents(conn: &Connection, now: i64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE payment_intents SET status = 'expired'
         WHERE status = 'pending' AND expires_at < ?1",
        params![now],
    )?;
    Ok(affected)
}

// ============ Transactions ============

pub fn transaction_exists(conn: &Connection, provider_tx_id: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM transactions WHERE provider_tx_id = ?1")?;
    Ok(stmt.exists(params![provider_tx_id])?)
}

/// Insert a ledger row, returning false if `provider_tx_id` was already
/// recorded. INSERT OR IGNORE on the unique constraint is the idempotency
/// guarantee; callers treat 0 affected rows as a duplicate delivery.
pub fn try_insert_transaction(conn: &Connection, tx: &TransactionRecord) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO transactions (id, provider_tx_id, intent_id, user_id, amount,
            currency, transfer_code, description, status, provider, raw_payload, bank_code,
            sender_name, sender_account, metadata, received_at, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            &tx.id,
            &tx.provider_tx_id,
            &tx.intent_id,
            &tx.user_id,
            tx.amount,
            &tx.currency,
            &tx.transfer_code,
            &tx.description,
            tx.status.as_ref(),
            &tx.provider,
            tx.raw_payload.to_string(),
            &tx.bank_code,
            &tx.sender_name,
            &tx.sender_account,
            tx.metadata.as_ref().map(|m| m.to_string()),
            tx.received_at,
            tx.processed_at,
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Option<TransactionRecord>> {
    query_one(
        conn,
        &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLS),
        &[&id],
    )
}

pub fn set_transaction_status(
    conn: &Connection,
    id: &str,
    status: TransactionStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE transactions SET status = ?1, processed_at = ?2 WHERE id = ?3",
        params![status.as_ref(), now(), id],
    )?;
    Ok(())
}

/// Link a transaction to an intent and mark it matched. Used by both the
/// automatic path (after the intent CAS) and manual reconciliation.
pub fn mark_transaction_matched(
    conn: &Connection,
    id: &str,
    intent_id: &str,
    user_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE transactions SET status = 'matched', intent_id = ?1, user_id = ?2, processed_at = ?3
         WHERE id = ?4",
        params![intent_id, user_id, now(), id],
    )?;
    Ok(())
}

/// Transactions awaiting operator attention, newest first.
pub fn list_unmatched_transactions(
    conn: &Connection,
    limit: i64,
) -> Result<Vec<TransactionRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM transactions
             WHERE status IN ('unmatched', 'amount_mismatch', 'manual_review')
             ORDER BY received_at DESC LIMIT ?1",
            TRANSACTION_COLS
        ),
        &[&limit],
    )
}

/// A user's matched payments, newest first, paginated.
pub fn list_user_transactions(
    conn: &Connection,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<TransactionRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM transactions
             WHERE user_id = ?1 AND status = 'matched'
             ORDER BY received_at DESC LIMIT ?2 OFFSET ?3",
            TRANSACTION_COLS
        ),
        &[&user_id, &limit, &offset],
    )
}

// ============ Webhook Attempts (audit DB) ============

/// Record an inbound webhook delivery before processing starts.
/// Returns the new attempt id.
pub fn insert_webhook_attempt(
    conn: &Connection,
    provider: &str,
    headers: &serde_json::Value,
    body: &str,
    signature_status: SignatureStatus,
) -> Result<String> {
    let id = EntityType::WebhookAttempt.gen_id();
    conn.execute(
        "INSERT INTO webhook_attempts (id, provider, headers, body, signature_status,
            processing_status, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        params![
            &id,
            provider,
            headers.to_string(),
            body,
            signature_status.as_ref(),
            now()
        ],
    )?;
    Ok(id)
}

pub fn finalize_webhook_attempt(
    conn: &Connection,
    id: &str,
    processing_status: AttemptStatus,
    results: Option<&serde_json::Value>,
    error: Option<&str>,
    response_time_ms: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE webhook_attempts SET processing_status = ?1, results = ?2, error = ?3,
            response_time_ms = ?4
         WHERE id = ?5",
        params![
            processing_status.as_ref(),
            results.map(|r| r.to_string()),
            error,
            response_time_ms,
            id
        ],
    )?;
    Ok(())
}

pub fn list_webhook_attempts(conn: &Connection, limit: i64) -> Result<Vec<WebhookAttempt>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_attempts ORDER BY received_at DESC LIMIT ?1",
            WEBHOOK_ATTEMPT_COLS
        ),
        &[&limit],
    )
}

/// Purge old webhook attempts beyond the retention period.
/// Returns the number of deleted records. Called on startup.
pub fn purge_old_webhook_attempts(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_attempts WHERE received_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Audit Events (audit DB) ============

pub fn create_audit_event(
    conn: &Connection,
    user_id: Option<&str>,
    action: AuditAction,
    metadata: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<AuditEvent> {
    let id = EntityType::AuditEvent.gen_id();
    let timestamp = now();
    conn.execute(
        "INSERT INTO audit_events (id, timestamp, user_id, action, metadata, ip_address, user_agent, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'success')",
        params![
            &id,
            timestamp,
            user_id,
            action.as_ref(),
            metadata.map(|m| m.to_string()),
            ip_address,
            user_agent
        ],
    )?;
    Ok(AuditEvent {
        id,
        timestamp,
        user_id: user_id.map(String::from),
        action,
        metadata: metadata.cloned(),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
        status: "success".to_string(),
    })
}
