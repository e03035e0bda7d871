use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use super::session::{SpotifySession, TokenRefreshListener};
use crate::config::SpotifyConfig;

pub const PROVIDER: &str = "spotify";

/// Failure classes for provider calls. Expired tokens and revoked grants need
/// different recoveries (silent refresh vs disconnect-and-notify), so they are
/// kept distinguishable from generic API failures.
#[derive(Debug, thiserror::Error)]
pub enum SpotifyError {
    #[error("spotify access token expired")]
    ExpiredToken,

    #[error("spotify rejected the oauth grant")]
    BadGrant,

    #[error("no spotify token available")]
    NoToken,

    #[error("spotify api error: {status} {message}")]
    Api { status: u16, message: String },

    #[error("spotify transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateUser {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub popularity: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
}

/// Wrapper over the Spotify Web API bound to a session. A 401 triggers one
/// refresh-and-retry through the session; a 403 means the grant itself was
/// revoked and surfaces as `BadGrant`.
pub struct SpotifyClient {
    http: reqwest::Client,
    session: Arc<SpotifySession>,
    api_base_url: String,
}

impl SpotifyClient {
    #[must_use]
    pub fn new(session: Arc<SpotifySession>, http: reqwest::Client, api_base_url: &str) -> Self {
        Self {
            http,
            session,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// True iff an access token is currently set.
    pub async fn is_usable(&self) -> bool {
        self.session.access_token().await.is_some()
    }

    /// Mirrors into the session so automatic refreshes see the same state.
    pub async fn set_access_token(&self, token: impl Into<String>) {
        self.session.set_access_token(token).await;
    }

    pub async fn set_refresh_token(&self, token: impl Into<String>) {
        self.session.set_refresh_token(token).await;
    }

    pub async fn me(&self) -> Result<PrivateUser, SpotifyError> {
        self.get_json("/v1/me").await
    }

    /// The provider-side identifier of the account behind the current token.
    pub async fn provider_user_id(&self) -> Result<String, SpotifyError> {
        Ok(self.me().await?.id)
    }

    pub async fn top_artists(
        &self,
        time_range: &str,
        limit: u32,
    ) -> Result<Vec<Artist>, SpotifyError> {
        let paging: Paging<Artist> = self
            .get_json(&format!(
                "/v1/me/top/artists?time_range={time_range}&limit={limit}"
            ))
            .await?;

        Ok(paging.items)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SpotifyError> {
        match self.attempt(path).await {
            Err(SpotifyError::ExpiredToken) => {
                // One refresh, one retry. A dead refresh token surfaces the
                // BadGrant from the token endpoint instead.
                self.session.refresh_access_token(None).await?;
                self.attempt(path).await
            }
            other => other,
        }
    }

    async fn attempt<T: DeserializeOwned>(&self, path: &str) -> Result<T, SpotifyError> {
        let token = self
            .session
            .access_token()
            .await
            .ok_or(SpotifyError::NoToken)?;

        let url = format!("{}{}", self.api_base_url, path);
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let status = response.status();

        match status {
            reqwest::StatusCode::UNAUTHORIZED => Err(SpotifyError::ExpiredToken),
            reqwest::StatusCode::FORBIDDEN => Err(SpotifyError::BadGrant),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(SpotifyError::Api {
                    status: s.as_u16(),
                    message: body,
                })
            }
            _ => Ok(response.json().await?),
        }
    }
}

/// Bare who-am-I for callers that already hold an access token and must not
/// trigger the auto-refresh path (the refresh observer would recurse).
pub async fn fetch_provider_user_id(
    http: &reqwest::Client,
    api_base_url: &str,
    access_token: &str,
) -> Result<String, SpotifyError> {
    let url = format!("{}/v1/me", api_base_url.trim_end_matches('/'));
    let response = http.get(&url).bearer_auth(access_token).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SpotifyError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    let user: PrivateUser = response.json().await?;
    Ok(user.id)
}

/// Builds sessions and clients with the configured credentials, attaching the
/// token-refresh listener so refreshed pairs reach the connection store.
#[derive(Clone)]
pub struct SpotifyFactory {
    config: SpotifyConfig,
    http: reqwest::Client,
    refresh_listener: Option<Arc<dyn TokenRefreshListener>>,
}

impl SpotifyFactory {
    #[must_use]
    pub const fn new(config: SpotifyConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            refresh_listener: None,
        }
    }

    #[must_use]
    pub fn with_refresh_listener(mut self, listener: Arc<dyn TokenRefreshListener>) -> Self {
        self.refresh_listener = Some(listener);
        self
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.config.client_id.is_empty()
    }

    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.config.scopes
    }

    #[must_use]
    pub fn session(&self) -> Arc<SpotifySession> {
        Arc::new(SpotifySession::new(&self.config, self.http.clone()))
    }

    /// A session with the refresh observer attached, so any refresh it
    /// performs is persisted.
    pub async fn observed_session(&self) -> Arc<SpotifySession> {
        let session = self.session();
        if let Some(listener) = &self.refresh_listener {
            session.attach(listener.clone()).await;
        }
        session
    }

    /// A ready-to-use API client seeded with a stored token pair.
    pub async fn client_for_tokens(&self, access_token: &str, refresh_token: &str) -> SpotifyClient {
        let session = self.observed_session().await;
        session.set_access_token(access_token).await;
        session.set_refresh_token(refresh_token).await;
        SpotifyClient::new(session, self.http.clone(), &self.config.api_base_url)
    }
}
