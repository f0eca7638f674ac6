//! Admin authentication
//!
//! The admin routes expose creator ids, raw collections, and write access to
//! rate-limit counters. They sit behind a single shared token.

use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use raffle_core::{AuthConfig, AuthMode, Error, Result};
use std::sync::Arc;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Who may use the admin routes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminGate {
    /// `auth.mode = "none"`: every caller is admin.
    Open,
    Token(String),
    /// Token mode without a configured token.
    Locked,
}

impl AdminGate {
    /// Expects the env fallback to have been applied already
    /// (`RaffleConfig::with_env_token`).
    pub fn from_config(config: &AuthConfig) -> Self {
        match (&config.mode, config.token.as_deref().map(str::trim)) {
            (AuthMode::None, _) => AdminGate::Open,
            (AuthMode::Token, Some(token)) if !token.is_empty() => AdminGate::Token(token.to_string()),
            (AuthMode::Token, _) => AdminGate::Locked,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, AdminGate::Locked)
    }

    pub fn authorize(&self, headers: &HeaderMap) -> Result<()> {
        let expected = match self {
            AdminGate::Open => return Ok(()),
            AdminGate::Locked => return Err(Error::unauthorized("admin token not configured")),
            AdminGate::Token(expected) => expected,
        };
        let provided = token_from_headers(headers).ok_or_else(|| Error::unauthorized("admin token required"))?;
        if !tokens_match(expected.as_bytes(), provided.as_bytes()) {
            return Err(Error::unauthorized("invalid admin token"));
        }
        Ok(())
    }
}

/// Compares every byte regardless of where the first mismatch is.
fn tokens_match(expected: &[u8], provided: &[u8]) -> bool {
    expected.len() == provided.len()
        && expected
            .iter()
            .zip(provided)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// `Authorization: Bearer <t>` wins over `x-admin-token: <t>`.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok()))
        .map(str::trim)
}

/// Middleware guarding the admin routes.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    if let Err(e) = state.auth.authorize(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "Admin auth rejected: {}", e);
        return Err(e.into());
    }
    Ok(next.run(request).await)
}
