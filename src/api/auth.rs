//! JWT auth for the dashboard.
//!
//! - Dashboard submits a password to `/api/auth/login`
//! - Server returns a session JWT valid for `JWT_TTL_DAYS`
//! - When `DEV_MODE=false`, protected endpoints require `Authorization: Bearer <jwt>`
//!
//! The same HS256 secret signs the short-lived `state` of the ClickUp OAuth
//! handshake. Every token carries a `purpose` claim, so a session token is
//! never accepted as a handshake state and the reverse.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::routes::AppState;
use super::types::{LoginRequest, LoginResponse};
use crate::config::{AuthConfig, AuthMode};

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Purpose {
    Session,
    ClickupOauth,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id.
    sub: String,
    #[serde(default)]
    usr: String,
    purpose: Purpose,
    /// Only set on handshake states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<String>,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
}

impl AuthUser {
    fn named(name: &str) -> Self {
        Self {
            id: name.to_string(),
            username: name.to_string(),
        }
    }
}

#[derive(Debug, Error)]
enum AuthError {
    #[error("Username required")]
    MissingUsername,
    #[error("Invalid username or password")]
    BadCredentials,
    #[error("Invalid password")]
    BadPassword,
    #[error("Missing Authorization header")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid user")]
    UnknownUser,
    #[error("JWT_SECRET not configured")]
    NoSecret,
    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::NoSecret | AuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        (status, self.to_string()).into_response()
    }
}

/// Compare secrets without an early exit on the first differing byte.
fn secrets_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn sign(secret: &str, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
    jsonwebtoken::encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn verify(secret: &str, token: &str, purpose: Purpose) -> anyhow::Result<Claims> {
    let claims = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?
    .claims;
    if claims.purpose != purpose {
        anyhow::bail!("token was issued for {:?}, not {:?}", claims.purpose, purpose);
    }
    if claims.sub.trim().is_empty() {
        anyhow::bail!("token carries no user");
    }
    Ok(claims)
}

fn issue_session(
    secret: &str,
    ttl_days: i64,
    user: &AuthUser,
) -> Result<(String, i64), AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        usr: user.username.clone(),
        purpose: Purpose::Session,
        jti: None,
        iat: now.timestamp(),
        exp: (now + Duration::days(ttl_days.max(1))).timestamp(),
    };
    Ok((sign(secret, &claims)?, claims.exp))
}

/// Sign an OAuth `state` naming the user the resulting token belongs to.
pub fn issue_oauth_state(secret: &str, user_id: &str) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        usr: String::new(),
        purpose: Purpose::ClickupOauth,
        jti: Some(Uuid::new_v4().to_string()),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(OAUTH_STATE_TTL_MINUTES)).timestamp(),
    };
    Ok(sign(secret, &claims)?)
}

/// Verify an OAuth `state` and return the user id it was issued for.
pub fn verify_oauth_state(secret: &str, state: &str) -> anyhow::Result<String> {
    Ok(verify(secret, state, Purpose::ClickupOauth)?.sub)
}

/// Check a login request against the configured accounts.
fn authenticate(
    auth: &AuthConfig,
    mode: AuthMode,
    req: &LoginRequest,
) -> Result<AuthUser, AuthError> {
    let password = req.password.trim();
    if mode != AuthMode::MultiUser {
        let expected = auth.dashboard_password.as_deref().unwrap_or("");
        if expected.is_empty() || !secrets_match(password, expected) {
            return Err(AuthError::BadPassword);
        }
        return Ok(AuthUser::named("default"));
    }

    let username = req.username.as_deref().unwrap_or("").trim();
    if username.is_empty() {
        return Err(AuthError::MissingUsername);
    }
    let Some(account) = auth.users.iter().find(|u| u.username.trim() == username) else {
        // Unknown users cost the same comparison as known ones.
        let _ = secrets_match(password, "unknown-user-placeholder");
        return Err(AuthError::BadCredentials);
    };
    let expected = account.password.trim();
    if expected.is_empty() || !secrets_match(password, expected) {
        return Err(AuthError::BadCredentials);
    }
    Ok(AuthUser {
        id: account.id.clone(),
        username: account.username.clone(),
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the session user for a protected request.
fn session_user(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
    let auth = &state.config.auth;
    let secret = auth.jwt_secret.as_deref().ok_or(AuthError::NoSecret)?;
    let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
    let claims = verify(secret, token, Purpose::Session).map_err(|_| AuthError::InvalidToken)?;

    match auth.auth_mode(state.config.dev_mode) {
        // Accounts removed from config lose access immediately.
        AuthMode::MultiUser => auth
            .users
            .iter()
            .find(|u| u.id == claims.sub)
            .map(|u| AuthUser {
                id: u.id.clone(),
                username: u.username.clone(),
            })
            .ok_or(AuthError::UnknownUser),
        AuthMode::SingleTenant => Ok(AuthUser {
            id: claims.sub,
            username: claims.usr,
        }),
        AuthMode::Disabled => Ok(AuthUser::named("default")),
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Response> {
    let auth = &state.config.auth;
    let user = authenticate(auth, auth.auth_mode(state.config.dev_mode), &req)
        .map_err(IntoResponse::into_response)?;
    let secret = auth
        .jwt_secret
        .as_deref()
        .ok_or_else(|| AuthError::NoSecret.into_response())?;
    let (token, exp) =
        issue_session(secret, auth.jwt_ttl_days, &user).map_err(IntoResponse::into_response)?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(LoginResponse { token, exp }))
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let user = if state.config.dev_mode {
        AuthUser::named("dev")
    } else {
        match session_user(&state, req.headers()) {
            Ok(user) => user,
            Err(e) => {
                tracing::debug!(error = %e, path = %req.uri().path(), "Rejected request");
                return e.into_response();
            }
        }
    };
    req.extensions_mut().insert(user);
    next.run(req).await
}
