//! Bearer-token authentication extractors.
//!
//! Account provisioning and token issuance live elsewhere; this service
//! only resolves a presented token to a stored user row. Tokens are looked
//! up by their SHA-256 hash, so raw tokens never touch the database.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::db::{queries, AppState};
use crate::error::AppError;
use crate::models::User;
use crate::util::{extract_bearer_token, hash_token};

/// Extractor for any authenticated user.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let conn = state.db.get()?;
        let user = queries::get_user_by_token_hash(&conn, &hash_token(token))?
            .ok_or(AppError::Unauthorized)?;
        Ok(AuthUser(user))
    }
}

/// Extractor for admin-only endpoints.
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}
