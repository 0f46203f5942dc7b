use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::PlanCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Paid,
    Expired,
    Failed,
    Underpaid,
    Overpaid,
    Cancelled,
}

/// Bank transfer details shown to the payer, stored as JSON on the intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrPayload {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    /// Transfer description the payer must keep intact (carries the code).
    pub description: String,
    pub qr_code_url: String,
}

/// A pending payment awaiting a matching bank transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub user_id: String,
    pub plan: PlanCode,
    pub amount: i64,
    pub currency: String,
    pub transfer_code: String,
    pub status: IntentStatus,
    pub qr_payload: QrPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
}

impl PaymentIntent {
    /// Status as seen by clients: a pending intent past its expiry reads as
    /// expired even before the sweeper persists the transition.
    pub fn client_status(&self, now: i64) -> IntentStatus {
        client_status(self.status, self.expires_at, now)
    }

    pub fn remaining_seconds(&self, now: i64) -> i64 {
        if self.status == IntentStatus::Pending {
            (self.expires_at - now).max(0)
        } else {
            0
        }
    }
}

/// Lazy expiry view. Pure so the read path never writes.
pub fn client_status(status: IntentStatus, expires_at: i64, now: i64) -> IntentStatus {
    if status == IntentStatus::Pending && now >= expires_at {
        IntentStatus::Expired
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_status_lazy_expiry() {
        let exp = 1_000;
        assert_eq!(
            client_status(IntentStatus::Pending, exp, 999),
            IntentStatus::Pending
        );
        assert_eq!(
            client_status(IntentStatus::Pending, exp, 1_000),
            IntentStatus::Expired
        );
        assert_eq!(
            client_status(IntentStatus::Pending, exp, 5_000),
            IntentStatus::Expired
        );
    }

    #[test]
    fn test_client_status_preserves_terminal_states() {
        let exp = 1_000;
        // A paid intent never reads as expired, no matter the clock.
        assert_eq!(
            client_status(IntentStatus::Paid, exp, 5_000),
            IntentStatus::Paid
        );
        assert_eq!(
            client_status(IntentStatus::Underpaid, exp, 5_000),
            IntentStatus::Underpaid
        );
        assert_eq!(
            client_status(IntentStatus::Cancelled, exp, 5_000),
            IntentStatus::Cancelled
        );
    }
}
