//! Connecting a user's ClickUp account.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::{Json, Redirect},
};
use serde::Deserialize;

use super::auth::{self, AuthUser};
use super::routes::AppState;
use super::types::UrlResponse;

fn redirect_uri(state: &AppState) -> String {
    format!("{}/api/clickup/callback", state.config.public_url)
}

fn dashboard(state: &AppState, query: &str) -> Redirect {
    Redirect::to(&format!(
        "{}/dashboard?clickup_status={}",
        state.config.public_url, query
    ))
}

/// Authorize URL the dashboard sends the user to.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UrlResponse>, (StatusCode, String)> {
    let oauth_state = auth::issue_oauth_state(&state.state_secret, &user.id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let url = state
        .oauth
        .authorize_url(&redirect_uri(&state), &oauth_state)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(UrlResponse { url }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

/// ClickUp redirects here with `code` and the `state` issued by [`connect`].
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let (Some(code), Some(oauth_state)) = (
        query.code.filter(|c| !c.is_empty()),
        query.state.filter(|s| !s.is_empty()),
    ) else {
        tracing::warn!("ClickUp callback without code or state");
        return dashboard(&state, "error&reason=invalid_request");
    };

    let user_id = match auth::verify_oauth_state(&state.state_secret, &oauth_state) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected ClickUp callback state");
            return dashboard(&state, "error&reason=invalid_state");
        }
    };

    let token = match state.oauth.exchange_code(&code).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "ClickUp token exchange failed");
            return dashboard(&state, "error&reason=token_exchange_failed");
        }
    };

    if let Err(e) = state.profiles.set_access_token(&user_id, &token).await {
        tracing::error!(user_id = %user_id, error = %e, "Failed to store ClickUp token");
        return dashboard(&state, "error&reason=token_exchange_failed");
    }

    tracing::info!(user_id = %user_id, "ClickUp account connected");
    dashboard(&state, "success")
}
