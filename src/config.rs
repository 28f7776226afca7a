//! Application configuration
//!
//! Centralized, environment-aware configuration with validation, following
//! the same from_env()/ConfigError pattern used throughout this codebase.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub redis: RedisSettings,
    pub providers: ProviderCredentials,
    pub worker: WorkerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();
        Ok(Self {
            environment,
            server: ServerConfig::from_env()?,
            redis: RedisSettings::from_env(environment)?,
            providers: ProviderCredentials::from_env(),
            worker: WorkerConfig::from_env(),
        })
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
pub struct RedisSettings {
    pub url: String,
    pub pool_size: usize,
}

impl RedisSettings {
    pub fn from_env(env: Environment) -> Result<Self, ConfigError> {
        let default_url = if env.is_production() {
            return Err(ConfigError::MissingRequired("REDIS_URL".to_string()));
        } else {
            "redis://localhost:6379".to_string()
        };

        Ok(Self {
            url: std::env::var("REDIS_URL").unwrap_or(default_url),
            pool_size: std::env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16),
        })
    }
}

/// Per-provider API credentials. All are optional — `PlaylistTransferHandler`
/// resolves the concrete `ProviderPort` for a given `service_name` at call
/// time and fails with `UnsupportedFeature` if the credentials are absent.
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub spotify: Option<SpotifyCredentials>,
    pub youtube_music: Option<YouTubeMusicCredentials>,
    pub deezer_arl: Option<String>,
    pub subsonic: Option<SubsonicSettings>,
}

impl ProviderCredentials {
    pub fn from_env() -> Self {
        Self {
            spotify: SpotifyCredentials::from_env().ok(),
            youtube_music: YouTubeMusicCredentials::from_env().ok(),
            deezer_arl: std::env::var("DEEZER_ARL").ok(),
            subsonic: SubsonicSettings::from_env().ok(),
        }
    }
}

/// Server endpoint + username for a Subsonic-compatible server. Not
/// OAuth2-style credentials (there is no token to refresh), so this lives
/// as plain config rather than behind `CredentialStore`; the per-user
/// password still comes from `CredentialStore::get_access_token`.
#[derive(Clone)]
pub struct SubsonicSettings {
    pub server_url: String,
    pub username: String,
}

impl SubsonicSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_url: std::env::var("SUBSONIC_SERVER_URL")
                .map_err(|_| ConfigError::MissingRequired("SUBSONIC_SERVER_URL".to_string()))?,
            username: std::env::var("SUBSONIC_USERNAME")
                .map_err(|_| ConfigError::MissingRequired("SUBSONIC_USERNAME".to_string()))?,
        })
    }
}

#[derive(Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl SpotifyCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: std::env::var("SPOTIFY_CLIENT_ID")
                .map_err(|_| ConfigError::MissingRequired("SPOTIFY_CLIENT_ID".to_string()))?,
            client_secret: std::env::var("SPOTIFY_CLIENT_SECRET")
                .map_err(|_| ConfigError::MissingRequired("SPOTIFY_CLIENT_SECRET".to_string()))?,
        })
    }
}

#[derive(Clone)]
pub struct YouTubeMusicCredentials {
    pub api_key: String,
}

impl YouTubeMusicCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: std::env::var("YOUTUBE_API_KEY")
                .map_err(|_| ConfigError::MissingRequired("YOUTUBE_API_KEY".to_string()))?,
        })
    }
}

/// `WorkerPool` tuning knobs (§5 of the transfer spec).
#[derive(Clone)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub poll_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub stale_threshold: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            worker_count: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            poll_timeout: Duration::from_secs(
                std::env::var("WORKER_POLL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            stale_threshold: Duration::from_secs(
                std::env::var("WORKER_STALE_THRESHOLD_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection_defaults_to_development() {
        assert_eq!(Environment::from_env(), Environment::Development);
    }

    #[test]
    fn test_worker_config_defaults() {
        let cfg = WorkerConfig::from_env();
        assert_eq!(cfg.worker_count, 3);
    }
}
