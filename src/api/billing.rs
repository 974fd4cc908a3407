//! Subscription checkout and customer portal endpoints.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::{Json, Redirect},
};
use serde::Deserialize;

use super::auth::AuthUser;
use super::routes::AppState;
use super::types::{PortalRequest, UrlResponse};
use crate::billing::BillingPortal;

type ApiError = (StatusCode, String);

fn billing(state: &AppState) -> Result<&Arc<dyn BillingPortal>, ApiError> {
    state.billing.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Billing is not configured".to_string(),
        )
    })
}

fn dashboard_url(state: &AppState, status: &str) -> String {
    format!("{}/dashboard?billing_status={}", state.config.public_url, status)
}

/// Start a subscription checkout for the signed-in user.
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UrlResponse>, ApiError> {
    let billing = billing(&state)?;
    // Stripe substitutes the session id into the success URL.
    let success_url = format!(
        "{}/api/billing/checkout/complete?session_id={{CHECKOUT_SESSION_ID}}",
        state.config.public_url
    );
    let cancel_url = dashboard_url(&state, "cancelled");

    let url = billing
        .create_checkout_session(&user.id, &success_url, &cancel_url)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Checkout session failed");
            (
                StatusCode::BAD_GATEWAY,
                "Failed to start checkout".to_string(),
            )
        })?;
    Ok(Json(UrlResponse { url }))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutCompleteQuery {
    #[serde(default)]
    session_id: Option<String>,
}

/// Stripe redirects the browser here after checkout.
///
/// The session is read back from Stripe; its `client_reference_id` names the
/// user whose profile is upgraded.
pub async fn checkout_complete(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckoutCompleteQuery>,
) -> Redirect {
    let Some(session_id) = query.session_id.filter(|s| !s.trim().is_empty()) else {
        return Redirect::to(&dashboard_url(&state, "error"));
    };
    let Ok(billing) = billing(&state) else {
        return Redirect::to(&dashboard_url(&state, "error"));
    };

    let session = match billing.retrieve_checkout_session(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Failed to read checkout session");
            return Redirect::to(&dashboard_url(&state, "error"));
        }
    };

    let user_id = match session.client_reference_id.as_deref() {
        Some(id) if session.is_paid() => id,
        _ => {
            tracing::warn!(
                session_id = %session_id,
                status = ?session.status,
                payment_status = ?session.payment_status,
                "Checkout not completed"
            );
            return Redirect::to(&dashboard_url(&state, "error"));
        }
    };

    if let Err(e) = state
        .profiles
        .set_subscription(user_id, billing.plan_name(), session.customer.as_deref())
        .await
    {
        tracing::error!(user_id, error = %e, "Failed to record subscription");
        return Redirect::to(&dashboard_url(&state, "error"));
    }

    tracing::info!(user_id, plan = billing.plan_name(), "Subscription activated");
    Redirect::to(&dashboard_url(&state, "success"))
}

/// Open the Stripe customer portal for the signed-in user.
pub async fn portal(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<PortalRequest>>,
) -> Result<Json<UrlResponse>, ApiError> {
    let billing = billing(&state)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let profile = state
        .profiles
        .get(&user.id)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Failed to load profile");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load profile".to_string(),
            )
        })?
        .unwrap_or_default();

    let customer_id = profile
        .stripe_customer_id
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "No billing account for this user".to_string(),
            )
        })?;

    let return_url = request
        .return_url
        .unwrap_or_else(|| format!("{}/dashboard", state.config.public_url));

    let url = billing
        .create_portal_session(&customer_id, &return_url)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Billing portal session failed");
            (
                StatusCode::BAD_GATEWAY,
                "Failed to open billing portal".to_string(),
            )
        })?;
    Ok(Json(UrlResponse { url }))
}
