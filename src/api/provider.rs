//! Spotify account linking: authorize redirect, OAuth callback, disconnect.

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
};
use std::sync::Arc;
use tower_sessions::Session;
use uuid::Uuid;

use super::{ApiError, ApiResponse, AppState, MessageResponse, OAuthCallbackQuery, auth, flash};
use crate::clients::spotify::{self, PROVIDER};

const OAUTH_STATE_KEY: &str = "spotify_auth_state";

/// GET /connect/spotify
/// Start the authorization-code flow by redirecting to the provider.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let user = auth::require_user(&state, &session).await?;

    if !state.shared.spotify.enabled() {
        return Err(ApiError::internal("Spotify is not configured"));
    }

    if state
        .store()
        .get_connection(user.id, PROVIDER)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load connection: {e}")))?
        .is_some()
    {
        flash::push(&session, "info", "Your Spotify account is already connected").await?;
        return Ok(Redirect::to("/").into_response());
    }

    let oauth_state = Uuid::new_v4().to_string();
    session
        .insert(OAUTH_STATE_KEY, &oauth_state)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let provider_session = state.shared.spotify.session();
    let url = provider_session.authorize_url(state.shared.spotify.scopes(), &oauth_state);

    Ok(Redirect::to(&url).into_response())
}

/// GET /connect/spotify/check
/// OAuth callback. Validates state, exchanges the code, resolves the provider
/// account and records the connection. All outcomes land on `/` with a flash.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = auth::require_user(&state, &session).await?;

    // A user with a live connection never reaches the exchange; they have to
    // disconnect first.
    if state
        .store()
        .get_connection(user.id, PROVIDER)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load connection: {e}")))?
        .is_some()
    {
        flash::push(&session, "info", "Your Spotify account is already connected").await?;
        return Ok(Redirect::to("/"));
    }

    let expected_state = session
        .remove::<String>(OAUTH_STATE_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    // State must match what this session started with; otherwise the
    // callback was forged or replayed.
    match (&expected_state, &query.state) {
        (Some(expected), Some(got)) if expected == got => {}
        _ => return Err(ApiError::validation("Invalid OAuth state")),
    }

    if query.error.is_some() {
        flash::push(&session, "error", "Spotify access was denied").await?;
        return Ok(Redirect::to("/"));
    }

    let Some(code) = query.code.as_deref() else {
        return Err(ApiError::validation("Missing authorization code"));
    };

    let provider_session = state.shared.spotify.session();
    if let Err(e) = provider_session.request_access_token(code).await {
        tracing::warn!("Spotify code exchange failed: {e}");
        flash::push(&session, "error", "Could not connect your Spotify account").await?;
        return Ok(Redirect::to("/"));
    }

    let (Some(access_token), Some(refresh_token)) = (
        provider_session.access_token().await,
        provider_session.refresh_token().await,
    ) else {
        flash::push(&session, "error", "Could not connect your Spotify account").await?;
        return Ok(Redirect::to("/"));
    };

    let config = state.shared.config().await;
    let provider_user_id = match spotify::fetch_provider_user_id(
        state.shared.spotify.http(),
        &config.spotify.api_base_url,
        &access_token,
    )
    .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Spotify identity lookup failed: {e}");
            flash::push(&session, "error", "Could not connect your Spotify account").await?;
            return Ok(Redirect::to("/"));
        }
    };

    if state
        .store()
        .connection_exists_for_other_user(PROVIDER, &provider_user_id, user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to check connections: {e}")))?
    {
        flash::push(
            &session,
            "error",
            "This Spotify account is already connected to another user",
        )
        .await?;
        return Ok(Redirect::to("/"));
    }

    state
        .store()
        .create_connection(
            user.id,
            PROVIDER,
            &access_token,
            &refresh_token,
            &provider_user_id,
        )
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create connection: {e}")))?;
    flash::push(&session, "success", "Your Spotify account is now connected").await?;

    tracing::info!(user_id = user.id, provider_user_id, "Spotify account linked");

    Ok(Redirect::to("/"))
}

/// DELETE /connect/spotify
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user = auth::require_user(&state, &session).await?;

    let removed = state
        .store()
        .delete_connection(user.id, PROVIDER)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to delete connection: {e}")))?;

    if !removed {
        return Err(ApiError::NotFound(
            "No Spotify connection to remove".to_string(),
        ));
    }

    tracing::info!(user_id = user.id, "Spotify account disconnected");

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Spotify account disconnected".to_string(),
    })))
}
