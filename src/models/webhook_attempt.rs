use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SignatureStatus {
    Verified,
    Invalid,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Processed,
    Unmatched,
    Failed,
}

/// One HTTP webhook delivery, recorded append-only in the audit database.
///
/// Never deduplicated: retried deliveries of the same bank transaction each
/// get their own row. The row is inserted `pending` before processing and
/// finalized after, so a crash mid-processing still leaves a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAttempt {
    pub id: String,
    pub provider: String,
    pub headers: serde_json::Value,
    pub body: String,
    pub signature_status: SignatureStatus,
    pub processing_status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<i64>,
    pub received_at: i64,
}
