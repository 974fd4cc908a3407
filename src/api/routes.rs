//! HTTP route handlers.

use std::sync::Arc;

use axum::middleware;
use axum::{
    extract::{DefaultBodyLimit, Extension, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::billing::{BillingPortal, StripeBillingPortal};
use crate::clickup::oauth::OAuthClient;
use crate::clickup::ClickUpClient;
use crate::config::{AuthMode, Config};
use crate::llm::OpenRouterClient;
use crate::materialize::Materializer;
use crate::profile::{FileProfileStore, SharedProfileStore, SupabaseProfileStore};
use crate::structure::{LlmTaskStructurer, TaskStructurer};

use super::auth::{self, AuthUser};
use super::billing as billing_api;
use super::clickup as clickup_api;
use super::documents;
use super::materialize as materialize_api;
use super::types::*;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub profiles: SharedProfileStore,
    pub materializer: Materializer,
    pub structurer: Arc<dyn TaskStructurer>,
    pub oauth: OAuthClient,
    /// `None` when `STRIPE_SECRET_KEY` is unset.
    pub billing: Option<Arc<dyn BillingPortal>>,
    /// Signs OAuth `state`: `JWT_SECRET`, or a per-process key in dev mode.
    pub state_secret: String,
}

impl AppState {
    /// Wire the production collaborators described by `config`.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let profiles: SharedProfileStore = match &config.supabase {
            Some(supabase) => {
                tracing::info!("Using Supabase profile store at {}", supabase.url);
                Arc::new(SupabaseProfileStore::new(
                    &supabase.url,
                    &supabase.service_role_key,
                ))
            }
            None => {
                tracing::info!(
                    "Using file profile store in {}",
                    config.working_dir.display()
                );
                Arc::new(FileProfileStore::new(&config.working_dir).await?)
            }
        };

        let materializer = Materializer::new(
            Arc::new(ClickUpClient::new(&config.clickup.api_url)?),
            Arc::clone(&profiles),
            config.duplicate_names,
        );
        let structurer: Arc<dyn TaskStructurer> = Arc::new(LlmTaskStructurer::new(
            Arc::new(OpenRouterClient::from_config(&config.llm)),
            config.llm.default_model.clone(),
        ));
        let billing = config.billing.as_ref().map(|billing| {
            Arc::new(StripeBillingPortal::new(billing)) as Arc<dyn BillingPortal>
        });
        if billing.is_none() {
            tracing::info!("Billing disabled (no STRIPE_SECRET_KEY)");
        }

        Ok(Self {
            oauth: OAuthClient::new(&config.clickup),
            state_secret: state_secret(&config),
            config,
            profiles,
            materializer,
            structurer,
            billing,
        })
    }
}

fn state_secret(config: &Config) -> String {
    config
        .auth
        .jwt_secret
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(auth::login))
        // The provider redirects the browser here without our session token.
        .route("/api/clickup/callback", get(clickup_api::callback))
        .route(
            "/api/billing/checkout/complete",
            get(billing_api::checkout_complete),
        );

    let upload_route = Router::new()
        .route("/api/documents/extract", post(documents::extract))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    let protected_routes = Router::new()
        .route("/api/me", get(me))
        .route("/api/clickup/connect", get(clickup_api::connect))
        .merge(upload_route)
        .route("/api/materialize", post(materialize_api::materialize))
        .route("/api/billing/checkout", post(billing_api::checkout))
        .route("/api/billing/portal", post(billing_api::portal))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::from_config(config).await?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests");
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let auth_mode = match state.config.auth.auth_mode(state.config.dev_mode) {
        AuthMode::Disabled => "disabled",
        AuthMode::SingleTenant => "single_tenant",
        AuthMode::MultiUser => "multi_user",
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dev_mode: state.config.dev_mode,
        auth_required: state.config.auth.auth_required(state.config.dev_mode),
        auth_mode: auth_mode.to_string(),
        billing_enabled: state.billing.is_some(),
    })
}

/// The signed-in user and their workspace connection.
async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>, (StatusCode, String)> {
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

    Ok(Json(MeResponse {
        clickup_connected: profile.credential().is_some(),
        plan: profile.plan().to_string(),
        id: user.id,
        username: user.username,
    }))
}
