//! One-shot notices carried in the session across a redirect.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use super::ApiError;

const FLASH_KEY: &str = "_flash";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashMessage {
    pub kind: String,
    pub message: String,
}

pub async fn push(session: &Session, kind: &str, message: impl Into<String>) -> Result<(), ApiError> {
    let mut flashes: Vec<FlashMessage> = session
        .get(FLASH_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
        .unwrap_or_default();

    flashes.push(FlashMessage {
        kind: kind.to_string(),
        message: message.into(),
    });

    session
        .insert(FLASH_KEY, &flashes)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    Ok(())
}

/// Drain pending notices; reading consumes them.
pub async fn take(session: &Session) -> Result<Vec<FlashMessage>, ApiError> {
    Ok(session
        .remove::<Vec<FlashMessage>>(FLASH_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
        .unwrap_or_default())
}
