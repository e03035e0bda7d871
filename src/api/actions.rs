//! AJAX action endpoints and the guard that fronts them.

use axum::{
    Json,
    extract::{Path, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, MessageResponse, auth, csrf};

// ============================================================================
// Middleware
// ============================================================================

/// Guard for `/api/action/*`. Checks run in a fixed order so a caller always
/// sees the most fundamental failure first:
/// 1. authenticated session, else 401
/// 2. `X-Requested-With: XMLHttpRequest`, else 400
/// 3. valid `X-CSRF-Token`, else 403
///
/// After the guard passes, the token is rotated and the new value attached to
/// the response as `X-CSRF-Token`, whatever the handler outcome.
pub async fn action_guard(
    State(state): State<Arc<AppState>>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = auth::require_user(&state, &session).await?;
    tracing::Span::current().record("user_id", user.id);

    let is_ajax = request
        .headers()
        .get("x-requested-with")
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    if !is_ajax {
        return Err(ApiError::validation("Actions must be requested over AJAX"));
    }

    let presented = request
        .headers()
        .get(csrf::CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !csrf::validate(&session, &presented).await? {
        return Err(ApiError::Forbidden("Invalid CSRF token".to_string()));
    }

    let mut response = next.run(request).await;

    let fresh = csrf::rotate(&session).await?;
    if let Ok(value) = HeaderValue::from_str(&fresh) {
        response.headers_mut().insert("x-csrf-token", value);
    }

    Ok(response)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/action/user/{user_id}/follow
pub async fn follow_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(user_id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let follower = auth::require_user(&state, &session).await?;

    if follower.id == user_id {
        return Err(ApiError::validation("You cannot follow yourself"));
    }

    let target = state
        .store()
        .get_user(user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))?
        .ok_or_else(|| ApiError::not_found("User", user_id))?;

    let created = state
        .store()
        .follow(follower.id, target.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to follow: {e}")))?;

    if !created {
        return Err(ApiError::validation("You already follow this user"));
    }

    tracing::info!(
        follower_id = follower.id,
        followed_id = target.id,
        "Follow created"
    );

    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("You are now following {}", target.username),
    })))
}

/// DELETE /api/action/user/{user_id}/follow
pub async fn unfollow_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(user_id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let follower = auth::require_user(&state, &session).await?;

    let target = state
        .store()
        .get_user(user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))?
        .ok_or_else(|| ApiError::not_found("User", user_id))?;

    let removed = state
        .store()
        .unfollow(follower.id, target.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to unfollow: {e}")))?;

    if !removed {
        return Err(ApiError::validation("You don't follow this user"));
    }

    tracing::info!(
        follower_id = follower.id,
        followed_id = target.id,
        "Follow removed"
    );

    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("You no longer follow {}", target.username),
    })))
}
