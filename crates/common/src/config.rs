use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::platform;

/// Default refresh attempt budget.
pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend origin every request path is appended to
    pub base_url: String,
    /// Per-request timeout enforced by the HTTP client, if any
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Navigation path of the login entry point
    pub login_path: String,
    /// How many times the refresh endpoint is tried before giving up
    pub max_refresh_attempts: u32,
    /// IANA zone name sent with refresh requests; host zone when unset
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Overrides the platform default credentials location
    pub credentials_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            max_refresh_attempts: DEFAULT_MAX_REFRESH_ATTEMPTS,
            time_zone: None,
        }
    }
}

impl Config {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Loads the explicit path if given, else the platform config file when
    /// it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match platform::get_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
        }
        if self.auth.max_refresh_attempts == 0 {
            return Err(ConfigError::Invalid(
                "auth.max_refresh_attempts must be at least 1".into(),
            ));
        }
        if !self.auth.login_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "auth.login_path must start with '/': {}",
                self.auth.login_path
            )));
        }
        Ok(())
    }

    /// Resolved credentials location, `None` when no platform directory exists.
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.storage
            .credentials_file
            .clone()
            .or_else(platform::get_credentials_path)
    }
}
