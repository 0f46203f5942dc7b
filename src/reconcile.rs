//! The reconciliation engine: matches observed bank transactions against
//! pending payment intents and settles both sides.
//!
//! Every decision here is backed by a database-level guarantee rather than
//! in-process state: the transactions unique constraint makes processing
//! idempotent, and the intent's pending-guarded updates make the
//! pending-to-paid flip (and therefore crediting) happen at most once,
//! regardless of concurrent webhook deliveries.

use chrono::Utc;
use rusqlite::Connection;
use strum::AsRefStr;

use crate::code;
use crate::credit;
use crate::db::queries;
use crate::error::Result;
use crate::models::{
    BankTransaction, IntentStatus, PaymentIntent, TransactionRecord, TransactionStatus,
    TransferDirection,
};
use crate::util::EntityType;

/// What became of one bank transaction.
#[derive(Debug, Clone, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    /// Matched a pending intent; the account was credited.
    Success {
        intent_id: String,
        user_id: String,
        transaction_id: String,
    },
    /// This provider transaction id was already processed.
    Duplicate,
    /// No transfer code, or no intent carries it. Recorded for manual review.
    Unmatched,
    /// A code was present but no intent carries it.
    IntentNotFound,
    /// The intent was already settled by an earlier transaction.
    AlreadyPaid,
    /// The intent lapsed before the money arrived.
    Expired,
    /// The transfer amount fell short of the intent amount.
    Underpaid,
    /// Outgoing transfer; not ours to reconcile.
    Ignored,
}

/// Run one bank transaction through the full matching pipeline.
///
/// Order matters: the idempotency check precedes everything that writes,
/// and every ledger insert goes through the unique-constraint-backed
/// `try_insert_transaction` so a concurrent duplicate loses cleanly.
pub fn process_transaction(
    conn: &Connection,
    audit_conn: &Connection,
    tx: &BankTransaction,
) -> Result<Outcome> {
    if tx.direction != TransferDirection::Incoming {
        return Ok(Outcome::Ignored);
    }

    // Fast path; the authoritative check is the insert below.
    if queries::transaction_exists(conn, &tx.provider_tx_id)? {
        return Ok(Outcome::Duplicate);
    }

    let transfer_code = match code::parse_transfer_code(&tx.description) {
        Some(c) => c,
        None => {
            let record = ledger_row(
                tx,
                None,
                TransactionStatus::Unmatched,
                Some(serde_json::json!({ "reason": "no_transfer_code" })),
            );
            if !queries::try_insert_transaction(conn, &record)? {
                return Ok(Outcome::Duplicate);
            }
            return Ok(Outcome::Unmatched);
        }
    };

    let intent = match queries::get_intent_by_code(conn, &transfer_code)? {
        Some(i) => i,
        None => {
            let record = ledger_row(
                tx,
                Some(&transfer_code),
                TransactionStatus::Unmatched,
                Some(serde_json::json!({ "reason": "intent_not_found" })),
            );
            if !queries::try_insert_transaction(conn, &record)? {
                return Ok(Outcome::Duplicate);
            }
            return Ok(Outcome::IntentNotFound);
        }
    };

    let now = Utc::now().timestamp();

    match intent.status {
        // Underpaid/failed/overpaid are retryable: a fresh sufficient
        // transaction within the window still settles the intent.
        IntentStatus::Pending
        | IntentStatus::Underpaid
        | IntentStatus::Failed
        | IntentStatus::Overpaid => {}
        // Settled by an earlier transaction; the attempt log keeps the
        // evidence, the ledger does not need a second row.
        IntentStatus::Paid => return Ok(Outcome::AlreadyPaid),
        IntentStatus::Expired => {
            return record_late_arrival(conn, tx, &intent, &transfer_code);
        }
        IntentStatus::Cancelled => {
            let record = ledger_row_for_intent(
                tx,
                &intent,
                TransactionStatus::Unmatched,
                Some(serde_json::json!({
                    "reason": "intent_not_payable",
                    "intent_status": intent.status,
                })),
            );
            if !queries::try_insert_transaction(conn, &record)? {
                return Ok(Outcome::Duplicate);
            }
            return Ok(Outcome::Unmatched);
        }
    }

    if now >= intent.expires_at {
        queries::try_settle_intent(conn, &intent.id, IntentStatus::Expired, None)?;
        return record_late_arrival(conn, tx, &intent, &transfer_code);
    }

    if tx.amount < intent.amount {
        let mismatch = serde_json::json!({
            "reason": "underpaid",
            "expected_amount": intent.amount,
            "received_amount": tx.amount,
        });
        queries::try_settle_intent(conn, &intent.id, IntentStatus::Underpaid, Some(&mismatch))?;
        let record = ledger_row_for_intent(
            tx,
            &intent,
            TransactionStatus::AmountMismatch,
            Some(mismatch),
        );
        if !queries::try_insert_transaction(conn, &record)? {
            return Ok(Outcome::Duplicate);
        }
        return Ok(Outcome::Underpaid);
    }

    // Overpayment is accepted as a full match, flagged for visibility.
    let metadata = if tx.amount > intent.amount {
        Some(serde_json::json!({
            "overpaid": true,
            "expected_amount": intent.amount,
            "received_amount": tx.amount,
        }))
    } else {
        None
    };

    let record = ledger_row_for_intent(tx, &intent, TransactionStatus::Matched, metadata);
    if !queries::try_insert_transaction(conn, &record)? {
        return Ok(Outcome::Duplicate);
    }

    if !queries::try_mark_intent_paid(conn, &intent.id, &record.id, now)? {
        // Lost the flip to a concurrent delivery. The ledger row stays,
        // downgraded so an operator can see what happened; no credit.
        queries::set_transaction_status(conn, &record.id, TransactionStatus::ManualReview)?;
        return Ok(Outcome::AlreadyPaid);
    }

    credit::apply_plan(conn, audit_conn, &intent.user_id, intent.plan, &intent.id)?;

    tracing::info!(
        intent_id = %intent.id,
        transaction_id = %record.id,
        amount = tx.amount,
        "payment matched and credited"
    );

    Ok(Outcome::Success {
        intent_id: intent.id,
        user_id: intent.user_id,
        transaction_id: record.id,
    })
}

/// Money that arrived after the intent lapsed is kept for manual review.
fn record_late_arrival(
    conn: &Connection,
    tx: &BankTransaction,
    intent: &PaymentIntent,
    transfer_code: &str,
) -> Result<Outcome> {
    let record = TransactionRecord {
        transfer_code: Some(transfer_code.to_string()),
        ..ledger_row_for_intent(
            tx,
            intent,
            TransactionStatus::Unmatched,
            Some(serde_json::json!({
                "reason": "intent_expired",
                "intent_id": intent.id,
            })),
        )
    };
    if !queries::try_insert_transaction(conn, &record)? {
        return Ok(Outcome::Duplicate);
    }
    Ok(Outcome::Expired)
}

fn ledger_row(
    tx: &BankTransaction,
    transfer_code: Option<&str>,
    status: TransactionStatus,
    metadata: Option<serde_json::Value>,
) -> TransactionRecord {
    TransactionRecord {
        id: EntityType::Transaction.gen_id(),
        provider_tx_id: tx.provider_tx_id.clone(),
        intent_id: None,
        user_id: None,
        amount: tx.amount,
        currency: tx.currency.clone(),
        transfer_code: transfer_code.map(String::from),
        description: tx.description.clone(),
        status,
        provider: tx.provider.to_string(),
        raw_payload: tx.raw.clone(),
        bank_code: tx.bank_code.clone(),
        sender_name: tx.sender_name.clone(),
        sender_account: tx.sender_account.clone(),
        metadata,
        received_at: Utc::now().timestamp(),
        processed_at: Some(Utc::now().timestamp()),
    }
}

fn ledger_row_for_intent(
    tx: &BankTransaction,
    intent: &PaymentIntent,
    status: TransactionStatus,
    metadata: Option<serde_json::Value>,
) -> TransactionRecord {
    TransactionRecord {
        intent_id: Some(intent.id.clone()),
        user_id: Some(intent.user_id.clone()),
        ..ledger_row(tx, Some(&intent.transfer_code), status, metadata)
    }
}
