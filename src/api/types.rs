use serde::{Deserialize, Serialize};

use crate::clients::spotify::Artist;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub is_verified: bool,
}

/// Home payload. The user-bound fields are only present for an
/// authenticated session; flashes are delivered either way.
#[derive(Debug, Serialize)]
pub struct HomeDto {
    pub user: Option<UserDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    pub flashes: Vec<crate::api::flash::FlashMessage>,
    pub spotify_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_profile: Option<SpotifyProfileDto>,
}

#[derive(Debug, Serialize)]
pub struct SpotifyProfileDto {
    pub provider_user_id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileDto {
    pub user: UserDto,
    pub followers: u64,
    pub following: u64,
    pub followed_by_viewer: bool,
    pub posts: Vec<PostDto>,
    pub top_artists: Vec<Artist>,
}

#[derive(Debug, Serialize)]
pub struct PostDto {
    pub id: i32,
    pub resource_uri: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserDto,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub id: i32,
    pub expires: i64,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
