//! Service configuration.
//!
//! Loaded once at start-up from `marine.toml` (or the file named by
//! `MARINE_CONFIG`) and overlaid with environment variables. Every table is
//! optional; missing keys take their defaults.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! request_timeout_secs = 30
//!
//! [repository]
//! type = "postgres"
//!
//! [postgres]
//! database_url = "postgres://marine@localhost/marine"
//!
//! [health]
//! chart_buckets = 15
//!
//! [auth]
//! max_failed_attempts = 3
//! lockout_minutes = 60
//! bcrypt_cost = 10
//!
//! [mail]
//! sender_email = "alerts@example.org"
//! sender_name = "Marine Monitor"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::db::RepositoryConfig;
use crate::services::{LoginPolicy, Sender};

/// File searched when `MARINE_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "marine.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Buckets in `fetchDataHealthChart`.
    pub chart_buckets: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self { chart_buckets: 15 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub max_failed_attempts: i32,
    pub lockout_minutes: i64,
    pub bcrypt_cost: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            max_failed_attempts: 3,
            lockout_minutes: 60,
            bcrypt_cost: 10,
        }
    }
}

impl AuthSettings {
    pub fn login_policy(&self) -> LoginPolicy {
        LoginPolicy {
            max_failed_attempts: self.max_failed_attempts,
            lockout: Duration::minutes(self.lockout_minutes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub sender_email: String,
    pub sender_name: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            sender_email: "noreply@localhost".to_string(),
            sender_name: "Marine Monitor".to_string(),
        }
    }
}

impl MailSettings {
    pub fn sender(&self) -> Sender {
        Sender {
            email: self.sender_email.clone(),
            name: self.sender_name.clone(),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    #[serde(flatten)]
    pub store: RepositoryConfig,
    pub health: HealthSettings,
    pub auth: AuthSettings,
    pub mail: MailSettings,
}

fn env_value<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Load from `MARINE_CONFIG`, else `marine.toml` when present, else
    /// defaults; then apply the environment overlay and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("MARINE_CONFIG") {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings from environment variables.
    ///
    /// `lookup` is injected so the overlay can be tested without touching
    /// the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_value(&lookup, "PORT")? {
            self.server.port = port;
        }
        if let Some(secs) = env_value(&lookup, "REQUEST_TIMEOUT_SECS")? {
            self.server.request_timeout_secs = secs;
        }
        if let Some(repo_type) = lookup("REPOSITORY_TYPE") {
            self.store.repository.repo_type = repo_type;
        }
        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("PG_DATABASE_URL")) {
            self.store.postgres.database_url = url;
        }
        if let Some(n) = env_value(&lookup, "PG_POOL_MAX")? {
            self.store.postgres.max_connections = n;
        }
        if let Some(n) = env_value(&lookup, "PG_POOL_MIN")? {
            self.store.postgres.min_connections = n;
        }
        if let Some(secs) = env_value(&lookup, "PG_CONN_TIMEOUT_SEC")? {
            self.store.postgres.connect_timeout = secs;
        }
        if let Some(secs) = env_value(&lookup, "PG_IDLE_TIMEOUT_SEC")? {
            self.store.postgres.idle_timeout = secs;
        }
        if let Some(email) = lookup("MAIL_SENDER_EMAIL") {
            self.mail.sender_email = email;
        }
        if let Some(name) = lookup("MAIL_SENDER_NAME") {
            self.mail.sender_name = name;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health.chart_buckets == 0 {
            return Err(ConfigError::Invalid(
                "health.chart_buckets must be at least 1".to_string(),
            ));
        }
        if self.auth.max_failed_attempts < 1 {
            return Err(ConfigError::Invalid(
                "auth.max_failed_attempts must be at least 1".to_string(),
            ));
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(ConfigError::Invalid(format!(
                "auth.bcrypt_cost must be within 4..=31, got {}",
                self.auth.bcrypt_cost
            )));
        }
        Ok(())
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
