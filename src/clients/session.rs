use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::spotify::SpotifyError;
use crate::config::SpotifyConfig;

/// Notified after every successful token refresh. The listener receives the
/// session so it can read the new access/refresh pair.
#[async_trait]
pub trait TokenRefreshListener: Send + Sync {
    async fn token_refreshed(&self, session: &SpotifySession);
}

#[derive(Debug, Clone, Default)]
struct TokenPair {
    access: Option<String>,
    refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    // Spotify omits this on refresh when the old refresh token stays valid
    refresh_token: Option<String>,
}

/// Holds the token pair used to authenticate outbound Spotify calls and owns
/// the OAuth token-endpoint exchanges. Listeners attached to the session are
/// told about refreshed tokens; a failed refresh never notifies.
pub struct SpotifySession {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    accounts_base_url: String,
    tokens: RwLock<TokenPair>,
    listeners: Mutex<Vec<Arc<dyn TokenRefreshListener>>>,
}

impl SpotifySession {
    #[must_use]
    pub fn new(config: &SpotifyConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            accounts_base_url: config.accounts_base_url.trim_end_matches('/').to_string(),
            tokens: RwLock::new(TokenPair::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub async fn attach(&self, listener: Arc<dyn TokenRefreshListener>) {
        self.listeners.lock().await.push(listener);
    }

    /// Removes a previously attached listener; no-op if it is not present.
    pub async fn detach(&self, listener: &Arc<dyn TokenRefreshListener>) {
        self.listeners
            .lock()
            .await
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub async fn access_token(&self) -> Option<String> {
        self.tokens.read().await.access.clone()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens.read().await.refresh.clone()
    }

    pub async fn set_access_token(&self, token: impl Into<String>) {
        self.tokens.write().await.access = Some(token.into());
    }

    pub async fn set_refresh_token(&self, token: impl Into<String>) {
        self.tokens.write().await.refresh = Some(token.into());
    }

    /// Authorization-code redirect target for `/connect/spotify`.
    #[must_use]
    pub fn authorize_url(&self, scopes: &[String], state: &str) -> String {
        format!(
            "{}/authorize?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.accounts_base_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for a token pair and store it.
    pub async fn request_access_token(&self, code: &str) -> Result<(), SpotifyError> {
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;

        let mut tokens = self.tokens.write().await;
        tokens.access = Some(response.access_token);
        if let Some(refresh) = response.refresh_token {
            tokens.refresh = Some(refresh);
        }

        Ok(())
    }

    /// Refresh the access token through the provider. On success the stored
    /// pair is replaced first, then every attached listener is notified in
    /// attach order. Refresh failures return before any notification.
    pub async fn refresh_access_token(
        &self,
        refresh_token: Option<String>,
    ) -> Result<bool, SpotifyError> {
        let refresh = match refresh_token {
            Some(token) => token,
            None => self.refresh_token().await.ok_or(SpotifyError::NoToken)?,
        };

        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh.as_str()),
            ])
            .await?;

        {
            let mut tokens = self.tokens.write().await;
            tokens.access = Some(response.access_token);
            tokens.refresh = Some(response.refresh_token.unwrap_or(refresh));
        }

        debug!("Spotify access token refreshed");

        let listeners = self.listeners.lock().await.clone();
        for listener in listeners {
            listener.token_refreshed(self).await;
        }

        Ok(true)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, SpotifyError> {
        let url = format!("{}/api/token", self.accounts_base_url);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(params)
            .send()
            .await?;

        let status = response.status();

        // Revoked or otherwise dead grants come back as 400 invalid_grant
        // (or 403); both mean the credential is permanently unusable.
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Spotify rejected the grant: {body}");
            return Err(SpotifyError::BadGrant);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.json().await?)
    }
}
