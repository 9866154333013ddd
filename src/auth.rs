use crate::errors::AppError;
use crate::handlers::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use std::sync::Arc;

pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The signed-in dashboard user, taken from the request headers.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub email: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authorize(&parts.headers, state.config.api_token.as_deref())
    }
}

/// Checks the bearer token (when one is configured) and reads the user email.
pub fn authorize(headers: &HeaderMap, api_token: Option<&str>) -> Result<SessionUser, AppError> {
    if let Some(expected) = api_token {
        let token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        if !constant_time_compare(token.trim(), expected) {
            tracing::warn!("Invalid API token received");
            return Err(AppError::Unauthorized("Invalid API token".to_string()));
        }
    }

    let email = headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing X-User-Email header".to_string()))?;

    Ok(SessionUser {
        email: email.to_string(),
    })
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
