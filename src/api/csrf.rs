//! Session-bound CSRF tokens for state-changing actions.
//!
//! A token is issued at login and rotated after every guarded action; the
//! fresh value is returned in the `X-CSRF-Token` response header so clients
//! can chain actions without a page reload.

use rand::RngCore;
use tower_sessions::Session;

use super::ApiError;
use crate::services::verification::constant_time_eq;

const CSRF_KEY: &str = "_csrf";

pub const CSRF_HEADER: &str = "x-csrf-token";

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Store a fresh token in the session, replacing any previous one.
pub async fn rotate(session: &Session) -> Result<String, ApiError> {
    let token = generate_token();
    session
        .insert(CSRF_KEY, &token)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;
    Ok(token)
}

/// The current token, issuing one if the session has none yet.
pub async fn current(session: &Session) -> Result<String, ApiError> {
    match session
        .get::<String>(CSRF_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
    {
        Some(token) => Ok(token),
        None => rotate(session).await,
    }
}

pub async fn validate(session: &Session, presented: &str) -> Result<bool, ApiError> {
    let stored = session
        .get::<String>(CSRF_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    Ok(stored.is_some_and(|token| !presented.is_empty() && constant_time_eq(&token, presented)))
}
