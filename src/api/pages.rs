use axum::{
    Json,
    extract::{Path, State},
};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tower_sessions::Session;

use super::{
    ApiError, ApiResponse, AppState, HomeDto, PostDto, ProfileDto, SpotifyProfileDto, UserDto,
    auth, csrf, flash,
};
use crate::clients::spotify::PROVIDER;

/// GET /
/// Landing view, reachable with or without a session. Logged-in visitors get
/// the CSRF token for follow-up actions and the state of their Spotify link;
/// a dead grant here bubbles up so the recovery layer can disconnect and
/// retry. Anonymous visitors get the bare payload with any pending flashes.
pub async fn home(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<HomeDto>>, ApiError> {
    let flashes = flash::take(&session).await?;

    let Some(user) = auth::current_user(&state, &session).await? else {
        return Ok(Json(ApiResponse::success(HomeDto {
            user: None,
            roles: None,
            csrf_token: None,
            flashes,
            spotify_connected: false,
            spotify_profile: None,
        })));
    };

    let csrf_token = csrf::current(&session).await?;

    let connection = state
        .store()
        .get_connection(user.id, PROVIDER)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load connection: {e}")))?;

    let spotify_profile = match &connection {
        Some(conn) => {
            let client = state
                .shared
                .spotify
                .client_for_tokens(&conn.access_token, &conn.refresh_token)
                .await;
            let me = client.me().await?;
            Some(SpotifyProfileDto {
                provider_user_id: me.id,
                display_name: me.display_name,
            })
        }
        None => None,
    };

    let roles = user.roles();

    Ok(Json(ApiResponse::success(HomeDto {
        user: Some(UserDto {
            id: user.id,
            username: user.username,
            is_verified: user.is_verified,
        }),
        roles: Some(roles),
        csrf_token: Some(csrf_token),
        flashes,
        spotify_connected: connection.is_some(),
        spotify_profile,
    })))
}

/// GET /{username}
/// Public profile: counts, posts and, when the owner has a Spotify link,
/// their long-term top artists. Provider failures degrade to an empty list
/// rather than breaking someone else's profile view.
pub async fn profile(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<ProfileDto>>, ApiError> {
    if !is_valid_username(&username) {
        return Err(ApiError::not_found("User", &username));
    }

    let target = state
        .store()
        .get_user_by_username(&username)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))?
        .ok_or_else(|| ApiError::not_found("User", &username))?;

    let viewer = auth::current_user(&state, &session).await?;

    let followers = state
        .store()
        .count_followers(target.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to count followers: {e}")))?;
    let following = state
        .store()
        .count_following(target.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to count following: {e}")))?;

    let followed_by_viewer = match &viewer {
        Some(v) if v.id != target.id => state
            .store()
            .is_following(v.id, target.id)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to check follow: {e}")))?,
        _ => false,
    };

    let posts = state
        .store()
        .list_posts_for_user(target.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list posts: {e}")))?
        .into_iter()
        .map(|p| PostDto {
            id: p.id,
            resource_uri: p.resource_uri,
            content: p.content,
            created_at: p.created_at,
        })
        .collect();

    let connection = state
        .store()
        .get_connection(target.id, PROVIDER)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load connection: {e}")))?;

    let top_artists = match connection {
        Some(conn) => {
            let client = state
                .shared
                .spotify
                .client_for_tokens(&conn.access_token, &conn.refresh_token)
                .await;
            match client.top_artists("long_term", 10).await {
                Ok(artists) => artists,
                Err(e) => {
                    tracing::warn!(
                        user_id = target.id,
                        "Failed to load top artists for profile: {e}"
                    );
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    Ok(Json(ApiResponse::success(ProfileDto {
        user: UserDto {
            id: target.id,
            username: target.username,
            is_verified: target.is_verified,
        },
        followers,
        following,
        followed_by_viewer,
        posts,
        top_artists,
    })))
}

/// Profile slugs are alphanumeric and at least four characters; anything else
/// falls through to not-found so reserved paths stay routable.
fn is_valid_username(username: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9]{4,}$").expect("Invalid regex"));
    re.is_match(username)
}
