use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Secrets shipped in sample env files. Starting with one of these is refused.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ROSTRUM_JWT_SECRET is unset or still a placeholder")]
    WeakSecret,

    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub google_client_id: Option<String>,
    pub apple_client_ids: Vec<String>,
    pub provider_timeout: Duration,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |var: &str| get(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("ROSTRUM_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::WeakSecret);
        }

        let port = match non_empty("ROSTRUM_PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                var: "ROSTRUM_PORT",
                value: v,
            })?,
            None => 8080,
        };
        let timeout_secs: u64 = match non_empty("ROSTRUM_PROVIDER_TIMEOUT_SECS") {
            Some(v) => match v.parse() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "ROSTRUM_PROVIDER_TIMEOUT_SECS",
                        value: v,
                    });
                }
            },
            None => 5,
        };

        let apple_client_ids = non_empty("ROSTRUM_APPLE_CLIENT_IDS")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            jwt_secret,
            db_path: non_empty("ROSTRUM_DB_PATH")
                .unwrap_or_else(|| "rostrum.db".into())
                .into(),
            host: non_empty("ROSTRUM_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            google_client_id: non_empty("ROSTRUM_GOOGLE_CLIENT_ID"),
            apple_client_ids,
            provider_timeout: Duration::from_secs(timeout_secs),
            cors_origin: non_empty("ROSTRUM_CORS_ORIGIN"),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::Invalid {
            var: "ROSTRUM_HOST",
            value: self.host.clone(),
        })
    }
}
