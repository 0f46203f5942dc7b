//! Casso webhook handler.
//!
//! Casso V2 signs deliveries with `x-casso-signature: t=<ts>,v1=<hex>`
//! where the signature is an HMAC over `"{ts}.{body}"`. V1 integrations
//! send the plain secure token in the same header; both are accepted
//! against the one configured secret. Payloads carry either an array of
//! transactions (V1) or a single object (V2) under `data`.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::db::AppState;
use crate::models::{BankTransaction, TransferDirection};

use super::common::{handle_webhook, VerifyOutcome, WebhookProvider};

type HmacSha256 = Hmac<Sha256>;

pub struct Casso;

/// One Casso transaction. Negative amounts are outgoing transfers.
#[derive(Debug, Deserialize)]
struct CassoTx {
    #[serde(default)]
    id: Option<serde_json::Value>,
    /// Bank-side transaction id
    #[serde(default)]
    tid: Option<String>,
    #[serde(default)]
    description: Option<String>,
    amount: i64,
    #[serde(default, rename = "bankSubAccId")]
    bank_sub_acc_id: Option<String>,
    #[serde(default, rename = "corresponsiveName")]
    corresponsive_name: Option<String>,
    #[serde(default, rename = "corresponsiveAccount")]
    corresponsive_account: Option<String>,
}

impl CassoTx {
    /// Bank-side id preferred; the numeric row id is the fallback.
    fn provider_tx_id(&self) -> Option<String> {
        if let Some(tid) = self.tid.as_ref().filter(|t| !t.is_empty()) {
            return Some(format!("casso_{}", tid));
        }
        match &self.id {
            Some(serde_json::Value::Number(n)) => Some(format!("casso_{}", n)),
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(format!("casso_{}", s)),
            _ => None,
        }
    }
}

/// Split `t=<ts>,v1=<hex>` into its parts. Returns None for the V1
/// plain-token format.
fn parse_signature_header(header: &str) -> Option<(&str, &str)> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = Some(v);
        }
    }
    timestamp.zip(signature)
}

impl WebhookProvider for Casso {
    fn provider_name(&self) -> &'static str {
        "casso"
    }

    fn verify(&self, config: &Config, headers: &HeaderMap, body: &[u8]) -> VerifyOutcome {
        let Some(secret) = config.casso_webhook_secret.as_deref() else {
            return VerifyOutcome::NotConfigured;
        };

        let Some(header) = headers
            .get("x-casso-signature")
            .and_then(|v| v.to_str().ok())
        else {
            return VerifyOutcome::Invalid;
        };

        if let Some((timestamp, signature)) = parse_signature_header(header) {
            let Ok(expected_sig) = hex::decode(signature) else {
                return VerifyOutcome::Invalid;
            };
            let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
                Ok(m) => m,
                Err(_) => return VerifyOutcome::Invalid,
            };
            mac.update(timestamp.as_bytes());
            mac.update(b".");
            mac.update(body);
            let computed = mac.finalize().into_bytes();

            if computed.ct_eq(&expected_sig).into() {
                return VerifyOutcome::Verified;
            }
            return VerifyOutcome::Invalid;
        }

        // V1 secure-token: header carries the raw secret.
        if header.as_bytes().ct_eq(secret.as_bytes()).into() {
            VerifyOutcome::Verified
        } else {
            VerifyOutcome::Invalid
        }
    }

    fn parse(&self, body: &[u8]) -> Result<Vec<BankTransaction>, &'static str> {
        let payload: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| "unrecognized Casso payload")?;

        // `data` is an array of transactions (V1) or a single object (V2).
        let items: Vec<serde_json::Value> = match payload.get("data") {
            Some(serde_json::Value::Array(items)) => items.clone(),
            Some(obj @ serde_json::Value::Object(_)) => vec![obj.clone()],
            _ => return Err("unrecognized Casso payload"),
        };

        let mut transactions = Vec::with_capacity(items.len());
        for raw in items {
            let item: CassoTx = serde_json::from_value(raw.clone())
                .map_err(|_| "unrecognized Casso transaction")?;
            let Some(provider_tx_id) = item.provider_tx_id() else {
                return Err("Casso transaction missing id");
            };
            let direction = if item.amount < 0 {
                TransferDirection::Outgoing
            } else {
                TransferDirection::Incoming
            };
            transactions.push(BankTransaction {
                provider_tx_id,
                provider: "casso",
                direction,
                amount: item.amount.abs(),
                currency: "VND".to_string(),
                description: item.description.unwrap_or_default(),
                bank_code: item.bank_sub_acc_id,
                sender_name: item.corresponsive_name,
                sender_account: item.corresponsive_account,
                raw,
            });
        }
        Ok(transactions)
    }
}

pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    handle_webhook(&Casso, &state, headers, body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_secret(secret: Option<&str>) -> Config {
        let mut config = Config::from_env();
        config.casso_webhook_secret = secret.map(String::from);
        config
    }

    fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_verify_v2_hmac() {
        let secret = "whsec_test";
        let body = br#"{"data":[]}"#;
        let sig = sign(secret, "1700000000", body);

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-casso-signature",
            format!("t=1700000000,v1={}", sig).parse().unwrap(),
        );
        assert_eq!(
            Casso.verify(&config_with_secret(Some(secret)), &headers, body),
            VerifyOutcome::Verified
        );

        // Tampered body fails.
        assert_eq!(
            Casso.verify(&config_with_secret(Some(secret)), &headers, b"{}"),
            VerifyOutcome::Invalid
        );
    }

    #[test]
    fn test_verify_v1_plain_token() {
        let mut headers = HeaderMap::new();
        headers.insert("x-casso-signature", "whsec_test".parse().unwrap());
        assert_eq!(
            Casso.verify(&config_with_secret(Some("whsec_test")), &headers, b"{}"),
            VerifyOutcome::Verified
        );
        assert_eq!(
            Casso.verify(&config_with_secret(Some("different")), &headers, b"{}"),
            VerifyOutcome::Invalid
        );
    }

    #[test]
    fn test_verify_unconfigured_and_missing_header() {
        let headers = HeaderMap::new();
        assert_eq!(
            Casso.verify(&config_with_secret(None), &headers, b"{}"),
            VerifyOutcome::NotConfigured
        );
        assert_eq!(
            Casso.verify(&config_with_secret(Some("s")), &headers, b"{}"),
            VerifyOutcome::Invalid
        );
    }

    #[test]
    fn test_parse_v1_array() {
        let body = serde_json::json!({
            "error": 0,
            "data": [
                {"id": 1, "tid": "FT001", "description": "PAYR-AB12CD", "amount": 99000,
                 "corresponsiveName": "NGUYEN VAN A", "cusumBalance": 1234567},
                {"id": 2, "tid": "FT002", "description": "payout", "amount": -50000}
            ]
        });
        let txs = Casso.parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].provider_tx_id, "casso_FT001");
        assert_eq!(txs[0].direction, TransferDirection::Incoming);
        assert_eq!(txs[0].sender_name.as_deref(), Some("NGUYEN VAN A"));
        assert_eq!(txs[1].direction, TransferDirection::Outgoing);
        assert_eq!(txs[1].amount, 50000);

        // The raw payload is kept verbatim, fields we do not model included.
        assert_eq!(txs[0].raw["corresponsiveName"], "NGUYEN VAN A");
        assert_eq!(txs[0].raw["cusumBalance"], 1234567);
    }

    #[test]
    fn test_parse_v2_single_object() {
        let body = serde_json::json!({
            "data": {"id": 7, "description": "PAYR-AB12CD", "amount": 49000}
        });
        let txs = Casso.parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].provider_tx_id, "casso_7");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Casso.parse(b"[]").is_err());
        assert!(Casso.parse(b"not json").is_err());
    }
}
