use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserPlan {
    Free,
    Pro,
}

/// Account state mutated by the crediting service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub plan: UserPlan,
    pub credits: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_billing_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_payment_intent_id: Option<String>,
    /// SHA-256 hex of the bearer token. Never serialized.
    #[serde(skip_serializing)]
    pub api_token_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
