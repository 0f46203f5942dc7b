//! Account crediting: the single place user balances change.
//!
//! Called exactly once per matched transaction; the caller's
//! compare-and-set on the intent enforces that. Keeping all balance
//! mutations here means the reconciliation and manual-match paths cannot
//! drift apart.

use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{AuditAction, PlanCode};

const SECONDS_PER_DAY: i64 = 86400;

/// Apply a paid plan to the user account.
///
/// Subscription plans flip the user to pro and push the billing date
/// forward by the plan cadence; a renewal before the current period ends
/// extends from the existing billing date rather than from now. Credit
/// packs add their fixed quantity.
///
/// Audit write failures are logged and swallowed; the credit itself
/// already happened and must not be rolled back over a logging problem.
pub fn apply_plan(
    conn: &Connection,
    audit_conn: &Connection,
    user_id: &str,
    plan: PlanCode,
    intent_id: &str,
) -> Result<()> {
    let now = Utc::now().timestamp();

    if let Some(period_days) = plan.billing_period_days() {
        let base = queries::get_user(conn, user_id)?
            .and_then(|u| u.next_billing_date)
            .filter(|&d| d > now)
            .unwrap_or(now);
        let next_billing = base + period_days * SECONDS_PER_DAY;
        queries::upgrade_user_plan(conn, user_id, next_billing, intent_id)?;

        record_audit(
            audit_conn,
            user_id,
            AuditAction::PlanUpgraded,
            serde_json::json!({
                "plan": plan,
                "intent_id": intent_id,
                "next_billing_date": next_billing,
            }),
        );
    } else if let Some(credits) = plan.credits() {
        queries::add_user_credits(conn, user_id, credits, intent_id)?;

        record_audit(
            audit_conn,
            user_id,
            AuditAction::PaymentCompleted,
            serde_json::json!({
                "plan": plan,
                "intent_id": intent_id,
                "credits_added": credits,
            }),
        );
    }

    Ok(())
}

fn record_audit(
    audit_conn: &Connection,
    user_id: &str,
    action: AuditAction,
    metadata: serde_json::Value,
) {
    if let Err(e) =
        queries::create_audit_event(audit_conn, Some(user_id), action, Some(&metadata), None, None)
    {
        tracing::warn!("failed to write audit event {}: {}", action.as_ref(), e);
    }
}
