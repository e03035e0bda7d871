use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub spotify: SpotifyConfig,

    pub verification: VerificationConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/musik.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Default: true for production safety. Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Session inactivity expiry in minutes.
    pub session_expiry_minutes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
            secure_cookies: true,
            session_expiry_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: String,

    pub client_secret: String,

    /// Where Spotify sends the user back after authorization.
    pub redirect_uri: String,

    pub scopes: Vec<String>,

    /// Token/authorize endpoint base. Overridable for tests.
    pub accounts_base_url: String,

    /// Web API base. Overridable for tests.
    pub api_base_url: String,

    /// Request timeout in seconds (default: 30)
    pub request_timeout_seconds: u32,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:8000/connect/spotify/check".to_string(),
            scopes: vec![
                "user-read-email".to_string(),
                "user-read-private".to_string(),
                "playlist-read-private".to_string(),
                "playlist-read-collaborative".to_string(),
                "playlist-modify-private".to_string(),
                "playlist-modify-public".to_string(),
                "user-top-read".to_string(),
            ],
            accounts_base_url: "https://accounts.spotify.com".to_string(),
            api_base_url: "https://api.spotify.com".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Public base URL used to build signed verification links.
    pub base_url: String,

    /// Secret for the keyed hash in verification links.
    pub secret: String,

    /// Minimum seconds between two verification emails for the same user.
    pub resend_cooldown_seconds: u64,

    /// Seconds a signed link stays valid.
    pub link_ttl_seconds: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            secret: String::new(),
            resend_cooldown_seconds: 5 * 60,
            link_ttl_seconds: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "musik".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            spotify: SpotifyConfig::default(),
            verification: VerificationConfig::default(),
            observability: ObservabilityConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secrets are taken from the environment when present so they can stay
    /// out of the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("MUSIK_SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = id;
        }
        if let Ok(secret) = std::env::var("MUSIK_SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = secret;
        }
        if let Ok(secret) = std::env::var("MUSIK_VERIFICATION_SECRET") {
            self.verification.secret = secret;
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("musik").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".musik").join("config.toml"));
        }

        paths
    }

    pub fn validate(&self) -> Result<()> {
        if self.spotify.client_id.is_empty() != self.spotify.client_secret.is_empty() {
            anyhow::bail!("Spotify client id and secret must be configured together");
        }

        if self.server.session_expiry_minutes <= 0 {
            anyhow::bail!("Session expiry must be positive");
        }

        if self.verification.resend_cooldown_seconds == 0 {
            anyhow::bail!("Verification resend cooldown must be > 0");
        }

        Ok(())
    }
}
