//! Persists refreshed Spotify token pairs back to the connection store.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::session::{SpotifySession, TokenRefreshListener};
use crate::clients::spotify::{self, PROVIDER};
use crate::db::Store;

/// Listens for refresh notifications and overwrites the matching connection
/// row with the new pair, immediately and without batching.
///
/// The owning connection is resolved by provider user id via a fresh who-am-I
/// call: unlike a lookup by the previous refresh-token value, this stays
/// correct when two requests refresh the same connection concurrently.
pub struct TokenRefreshObserver {
    store: Store,
    http: reqwest::Client,
    api_base_url: String,
}

impl TokenRefreshObserver {
    #[must_use]
    pub fn new(store: Store, http: reqwest::Client, api_base_url: &str) -> Self {
        Self {
            store,
            http,
            api_base_url: api_base_url.to_string(),
        }
    }

    async fn persist(&self, session: &SpotifySession) -> Result<()> {
        let Some(access_token) = session.access_token().await else {
            bail!("refresh notification without an access token");
        };
        let Some(refresh_token) = session.refresh_token().await else {
            bail!("refresh notification without a refresh token");
        };

        let provider_user_id =
            spotify::fetch_provider_user_id(&self.http, &self.api_base_url, &access_token)
                .await
                .context("Failed to resolve the refreshed spotify identity")?;

        match self
            .store
            .find_connection_by_provider_account(PROVIDER, &provider_user_id)
            .await?
        {
            Some(connection) => {
                self.store
                    .update_connection_tokens(connection.id, &access_token, &refresh_token)
                    .await?;
                debug!(
                    connection_id = connection.id,
                    "Persisted refreshed spotify tokens"
                );
                Ok(())
            }
            None => {
                // Data-integrity surprise; a best-effort refresh must not
                // fail the in-flight request.
                warn!(
                    provider_user_id,
                    "No connection found for refreshed spotify identity"
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl TokenRefreshListener for TokenRefreshObserver {
    async fn token_refreshed(&self, session: &SpotifySession) {
        if let Err(e) = self.persist(session).await {
            warn!("Failed to persist refreshed spotify tokens: {e:#}");
        }
    }
}
