use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, MessageResponse, VerifyQuery, auth};
use crate::services::VerificationError;

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::CooldownActive | VerificationError::InvalidLink => {
                ApiError::validation(err.to_string())
            }
            VerificationError::Other(e) => ApiError::internal(e.to_string()),
        }
    }
}

/// GET /verify/email?id&expires&signature
/// Confirms the address behind a signed link. Works without a session so the
/// link can be opened from any mail client.
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .shared
        .email_verifier
        .confirm(query.id, query.expires, &query.signature)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Your email address has been verified".to_string(),
    })))
}

/// GET /verify/email/resend
pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user = auth::require_user(&state, &session).await?;

    if user.is_verified {
        return Err(ApiError::validation("Your email is already verified"));
    }

    state.shared.email_verifier.resend(&user).await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "A new verification email has been sent".to_string(),
    })))
}
