//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! This module provides a `FromRow` trait that models can implement to
//! define how they are constructed from database rows, plus helper functions
//! for common query patterns.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when database
/// contains invalid enum values (from corruption, migration errors, etc.).
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse a JSON text column, converting parse errors to rusqlite errors.
fn parse_json<T: serde::de::DeserializeOwned>(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw).map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

fn parse_json_opt(row: &Row, col: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(col)?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

/// Trait for constructing a type from a database row.
///
/// Implementing this trait allows using the `query_one` and `query_all`
/// helper functions, reducing repetitive row mapping closures.
pub trait FromRow: Sized {
    /// Construct an instance from a database row.
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, role, plan, credits, plan_started_at, next_billing_date, last_payment_intent_id, api_token_hash, created_at, updated_at";

pub const INTENT_COLS: &str = "id, user_id, plan, amount, currency, transfer_code, status, qr_payload, transaction_id, metadata, created_at, expires_at, paid_at, cancelled_at";

pub const TRANSACTION_COLS: &str = "id, provider_tx_id, intent_id, user_id, amount, currency, transfer_code, description, status, provider, raw_payload, bank_code, sender_name, sender_account, metadata, received_at, processed_at";

pub const WEBHOOK_ATTEMPT_COLS: &str = "id, provider, headers, body, signature_status, processing_status, results, error, response_time_ms, received_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            role: parse_enum(row, 3, "role")?,
            plan: parse_enum(row, 4, "plan")?,
            credits: row.get(5)?,
            plan_started_at: row.get(6)?,
            next_billing_date: row.get(7)?,
            last_payment_intent_id: row.get(8)?,
            api_token_hash: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for PaymentIntent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentIntent {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            transfer_code: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            qr_payload: parse_json(row, 7, "qr_payload")?,
            transaction_id: row.get(8)?,
            metadata: parse_json_opt(row, 9)?,
            created_at: row.get(10)?,
            expires_at: row.get(11)?,
            paid_at: row.get(12)?,
            cancelled_at: row.get(13)?,
        })
    }
}

impl FromRow for TransactionRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TransactionRecord {
            id: row.get(0)?,
            provider_tx_id: row.get(1)?,
            intent_id: row.get(2)?,
            user_id: row.get(3)?,
            amount: row.get(4)?,
            currency: row.get(5)?,
            transfer_code: row.get(6)?,
            description: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            provider: row.get(9)?,
            raw_payload: parse_json(row, 10, "raw_payload")?,
            bank_code: row.get(11)?,
            sender_name: row.get(12)?,
            sender_account: row.get(13)?,
            metadata: parse_json_opt(row, 14)?,
            received_at: row.get(15)?,
            processed_at: row.get(16)?,
        })
    }
}

impl FromRow for WebhookAttempt {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookAttempt {
            id: row.get(0)?,
            provider: row.get(1)?,
            headers: parse_json(row, 2, "headers")?,
            body: row.get(3)?,
            signature_status: parse_enum(row, 4, "signature_status")?,
            processing_status: parse_enum(row, 5, "processing_status")?,
            results: parse_json_opt(row, 6)?,
            error: row.get(7)?,
            response_time_ms: row.get(8)?,
            received_at: row.get(9)?,
        })
    }
}
