use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clients::spotify::SpotifyFactory;
use crate::config::Config;
use crate::db::Store;
use crate::services::{EmailVerifier, LogMailer, TokenRefreshObserver};

/// Build a shared HTTP client with reasonable defaults for API calls.
/// This client should be reused across all HTTP-based services to enable
/// connection pooling and avoid socket exhaustion.
fn build_shared_http_client(timeout_seconds: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .user_agent("Musik/1.0")
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub spotify: SpotifyFactory,

    pub email_verifier: Arc<EmailVerifier>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        // Shared between the provider clients and the refresh observer so
        // both pool connections against the same hosts.
        let http_client =
            build_shared_http_client(config.spotify.request_timeout_seconds.into())?;

        let refresh_observer = Arc::new(TokenRefreshObserver::new(
            store.clone(),
            http_client.clone(),
            &config.spotify.api_base_url,
        ));
        let spotify = SpotifyFactory::new(config.spotify.clone(), http_client)
            .with_refresh_listener(refresh_observer);

        let email_verifier = Arc::new(EmailVerifier::new(
            store.clone(),
            Arc::new(LogMailer),
            &config.verification,
        ));

        let config_arc = Arc::new(RwLock::new(config));

        Ok(Self {
            config: config_arc,
            store,
            spotify,
            email_verifier,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
