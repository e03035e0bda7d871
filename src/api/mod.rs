use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::state::SharedState;

pub mod actions;
pub mod auth;
pub mod csrf;
mod error;
pub mod flash;
mod observability;
mod pages;
mod provider;
mod recovery;
mod types;
mod verification;

pub use error::ApiError;
pub use types::*;

use tokio::sync::RwLock;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }
}

pub async fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    Ok(Arc::new(AppState {
        shared,
        prometheus_handle,
    }))
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    create_app_state(shared, prometheus_handle).await
}

pub async fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, secure_cookies, session_expiry_minutes) = {
        let config = state.config().read().await;
        (
            config.server.cors_allowed_origins.clone(),
            config.server.secure_cookies,
            config.server.session_expiry_minutes,
        )
    };

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            session_expiry_minutes,
        )));

    // Follow actions sit behind the AJAX/CSRF guard; everything else only
    // needs the session itself.
    let action_routes = Router::new()
        .route(
            "/api/action/user/{user_id}/follow",
            post(actions::follow_user).delete(actions::unfollow_user),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            actions::action_guard,
        ));

    let app_router = Router::new()
        .route("/", get(pages::home))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/connect/spotify", get(provider::connect))
        .route("/connect/spotify", delete(provider::disconnect))
        .route("/connect/spotify/check", get(provider::callback))
        .route("/verify/email", get(verification::verify_email))
        .route("/verify/email/resend", get(verification::resend_verification))
        .route("/health/live", get(observability::health_live))
        .route("/health/ready", get(observability::health_ready))
        .route("/metrics", get(observability::get_metrics))
        .merge(action_routes)
        .route("/{username}", get(pages::profile))
        // The recovery layer must sit inside the session layer so it can
        // still read the session while seeing the handler's response.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            recovery::recover_bad_grant,
        ))
        .layer(session_layer)
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    app_router
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}
