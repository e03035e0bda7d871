//! Turns a revoked provider grant into a clean disconnect.
//!
//! When a handler fails with a bad-grant error the response carries a
//! [`BadGrantMarker`]. This layer removes the dead connection, leaves a flash
//! explaining what happened and sends the browser back home so the user can
//! reconnect, instead of surfacing a bare gateway error.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::{AppState, auth, error::BadGrantMarker, flash};

pub async fn recover_bad_grant(
    State(state): State<Arc<AppState>>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    let Some(marker) = response.extensions().get::<BadGrantMarker>().cloned() else {
        return response;
    };

    let Ok(Some(user)) = auth::current_user(&state, &session).await else {
        return response;
    };

    match state
        .store()
        .delete_connection(user.id, &marker.provider)
        .await
    {
        Ok(removed) => {
            tracing::warn!(
                user_id = user.id,
                provider = marker.provider,
                removed,
                "Removed connection after revoked grant"
            );
        }
        Err(e) => {
            tracing::error!("Failed to remove revoked connection: {e}");
            return response;
        }
    }

    let _ = flash::push(
        &session,
        "error",
        format!(
            "Your {} connection is no longer valid and was removed. Please reconnect.",
            marker.provider
        ),
    )
    .await;

    Redirect::to("/").into_response()
}
