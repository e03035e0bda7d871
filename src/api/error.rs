use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::clients::spotify::SpotifyError;

/// Marker attached to error responses for a revoked provider grant. The
/// recovery middleware watches for it and turns the failure into a
/// disconnect-and-redirect instead of a bare 502.
#[derive(Debug, Clone)]
pub struct BadGrantMarker {
    pub provider: String,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    ExternalApiError { service: String, message: String },

    ValidationError(String),

    InternalError(String),

    Unauthorized(String),

    Forbidden(String),

    BadOAuthGrant { provider: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::ExternalApiError { service, message } => {
                write!(f, "{} error: {}", service, message)
            }
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::BadOAuthGrant { provider } => {
                write!(f, "{} rejected the stored grant", provider)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::ExternalApiError { service, message } => {
                tracing::warn!("{} API error: {}", service, message);
                (
                    StatusCode::BAD_GATEWAY,
                    format!("{} service is unavailable", service),
                )
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::BadOAuthGrant { provider } => {
                tracing::warn!("{} grant is no longer valid", provider);
                (
                    StatusCode::BAD_GATEWAY,
                    format!("The {} connection is no longer valid", provider),
                )
            }
        };

        let body = ApiResponse::<()>::error(error_message);
        let mut response = (status, Json(body)).into_response();

        if let ApiError::BadOAuthGrant { provider } = self {
            response.extensions_mut().insert(BadGrantMarker { provider });
        }

        response
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<SpotifyError> for ApiError {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::BadGrant => ApiError::BadOAuthGrant {
                provider: "spotify".to_string(),
            },
            SpotifyError::ExpiredToken | SpotifyError::NoToken => ApiError::Unauthorized(
                "No usable spotify token; reconnect the account".to_string(),
            ),
            SpotifyError::Api { status, message } => ApiError::ExternalApiError {
                service: "Spotify".to_string(),
                message: format!("{status} {message}"),
            },
            SpotifyError::Transport(e) => ApiError::ExternalApiError {
                service: "Spotify".to_string(),
                message: e.to_string(),
            },
        }
    }
}

impl ApiError {
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        ApiError::NotFound(format!("{} {} not found", resource, id))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::InternalError(msg.into())
    }
}
