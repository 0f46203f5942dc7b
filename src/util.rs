//! Shared utility functions for the payrec service.

use axum::http::HeaderMap;
use uuid::Uuid;

/// Entity types that have prefixed IDs.
///
/// Format: `pr_{entity}_{uuid_simple}` (32 hex chars, no hyphens). The
/// brand prefix keeps our IDs distinguishable from bank-side reference
/// codes in logs and support tickets.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    User,
    PaymentIntent,
    Transaction,
    WebhookAttempt,
    AuditEvent,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::User => "pr_usr",
            Self::PaymentIntent => "pr_pi",
            Self::Transaction => "pr_txn",
            Self::WebhookAttempt => "pr_wh",
            Self::AuditEvent => "pr_aud",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`,
/// and extracts the `user-agent` header for audit logging.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// SHA-256 hex digest of an API token, as stored in `users.api_token_hash`.
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let id = EntityType::PaymentIntent.gen_id();
        assert!(id.starts_with("pr_pi_"));
        // pr_pi_ (6 chars) + 32 hex chars
        assert_eq!(id.len(), 38);
    }

    #[test]
    fn test_ids_are_unique() {
        let id1 = EntityType::Transaction.gen_id();
        let id2 = EntityType::Transaction.gen_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Bearer tok_abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), Some("tok_abc"));

        headers.insert("Authorization", "Basic tok_abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("Authorization", "Bearer ".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
