use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionStatus {
    Matched,
    Unmatched,
    AmountMismatch,
    ManualReview,
    Refunded,
}

/// Ledger record of an observed bank transfer.
///
/// `provider_tx_id` is the idempotency key: one row per bank-side
/// transaction, regardless of how many webhook deliveries carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub provider_tx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_code: Option<String>,
    /// Raw bank transfer description, kept verbatim for manual review.
    pub description: String,
    pub status: TransactionStatus,
    pub provider: String,
    pub raw_payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub received_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<i64>,
}

/// Direction of a bank transfer relative to our account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Incoming,
    Outgoing,
}

/// A single bank transaction, normalized from a provider payload.
///
/// Providers differ in payload shape; each provider module maps its wire
/// format into this struct before the reconciliation engine sees it.
#[derive(Debug, Clone)]
pub struct BankTransaction {
    /// Provider-scoped transaction id, prefixed with the provider name to
    /// keep ids from different providers from colliding.
    pub provider_tx_id: String,
    pub provider: &'static str,
    pub direction: TransferDirection,
    /// Absolute amount in whole VND.
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub bank_code: Option<String>,
    pub sender_name: Option<String>,
    pub sender_account: Option<String>,
    pub raw: serde_json::Value,
}
