//! SePay webhook handler.
//!
//! SePay authenticates deliveries with a static API key in the
//! Authorization header (`Apikey <key>`) and sends one transaction per
//! delivery.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::db::AppState;
use crate::models::{BankTransaction, TransferDirection};

use super::common::{handle_webhook, VerifyOutcome, WebhookProvider};

pub struct SePay;

/// SePay delivery payload (single transaction).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SePayPayload {
    id: i64,
    /// Bank short name, e.g. "MBBank"
    gateway: Option<String>,
    /// "in" for money arriving, "out" for money leaving
    transfer_type: String,
    transfer_amount: i64,
    /// Raw transfer description (carries the transfer code)
    content: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    account_number: Option<String>,
}

impl WebhookProvider for SePay {
    fn provider_name(&self) -> &'static str {
        "sepay"
    }

    fn verify(&self, config: &Config, headers: &HeaderMap, _body: &[u8]) -> VerifyOutcome {
        let Some(expected) = config.sepay_api_key.as_deref() else {
            return VerifyOutcome::NotConfigured;
        };

        let presented = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Apikey "))
            .map(str::trim);

        match presented {
            Some(key) if key.as_bytes().ct_eq(expected.as_bytes()).into() => {
                VerifyOutcome::Verified
            }
            _ => VerifyOutcome::Invalid,
        }
    }

    fn parse(&self, body: &[u8]) -> Result<Vec<BankTransaction>, &'static str> {
        let raw: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| "invalid JSON payload")?;
        let payload: SePayPayload =
            serde_json::from_value(raw.clone()).map_err(|_| "unrecognized SePay payload")?;

        let direction = match payload.transfer_type.as_str() {
            "in" => TransferDirection::Incoming,
            _ => TransferDirection::Outgoing,
        };

        let description = payload
            .content
            .or(payload.description)
            .unwrap_or_default();

        Ok(vec![BankTransaction {
            provider_tx_id: format!("sepay_{}", payload.id),
            provider: "sepay",
            direction,
            amount: payload.transfer_amount.abs(),
            currency: "VND".to_string(),
            description,
            bank_code: payload.gateway,
            sender_name: None,
            sender_account: payload.account_number,
            raw,
        }])
    }
}

pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    handle_webhook(&SePay, &state, headers, body).await
}
