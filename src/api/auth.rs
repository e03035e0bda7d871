use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, LoginRequest, LoginResponse, UserDto, csrf};
use crate::db::User;

pub const SESSION_USER_KEY: &str = "user_id";

// ============================================================================
// Handlers
// ============================================================================

/// POST /login
/// Authenticate with email and password; issues the session and a CSRF token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if payload.email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let user = state
        .store()
        .verify_user_password(&payload.email, &payload.password)
        .await
        .map_err(|e| ApiError::internal(format!("Authentication error: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    session
        .insert(SESSION_USER_KEY, user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    let csrf_token = csrf::rotate(&session).await?;

    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(ApiResponse::success(LoginResponse {
        user: UserDto {
            id: user.id,
            username: user.username,
            is_verified: user.is_verified,
        },
        csrf_token,
    })))
}

/// POST /logout
/// Invalidate the current session
pub async fn logout(session: Session) -> Result<impl IntoResponse, ApiError> {
    session
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to end session: {e}")))?;
    Ok((StatusCode::OK, "Logged out"))
}

// ============================================================================
// Helpers
// ============================================================================

/// The logged-in user behind the session, if any. A session pointing at a
/// deleted user reads as logged out.
pub async fn current_user(
    state: &Arc<AppState>,
    session: &Session,
) -> Result<Option<User>, ApiError> {
    let Some(user_id) = session
        .get::<i32>(SESSION_USER_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
    else {
        return Ok(None);
    };

    state
        .store()
        .get_user(user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))
}

/// Like [`current_user`], but an anonymous session is an error.
pub async fn require_user(
    state: &Arc<AppState>,
    session: &Session,
) -> Result<User, ApiError> {
    current_user(state, session)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))
}
