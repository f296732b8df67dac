use std::env;
use std::fmt;
use std::str::FromStr;

use config::Config as ConfigBuilder;
use config::ConfigError;
use config::Environment;
use config::File;
use config::Map;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::oauth::OAuthSettings;

/// Fatal start-up error: the process must not start with it.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Unsupported storage backend: {0}")]
    UnsupportedBackend(String),

    #[error("Missing configuration parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid configuration parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub oauth: OAuthSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub mysql: MySqlConfig,
    #[serde(default)]
    pub mongo: MongoConfig,
}

/// Connection parameters are optional here so that a missing one surfaces
/// as `MissingParameter` naming it, only for the selected backend.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PostgresConfig {
    pub url: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MySqlConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MongoConfig {
    pub uri: Option<String>,
    pub database: Option<String>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

fn default_ttl_seconds() -> i64 {
    3600
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

/// Storage backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    MySql,
    Mongo,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "mysql" => Ok(StorageBackend::MySql),
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "memory" => Ok(StorageBackend::Memory),
            "" => Err(ConfigurationError::MissingParameter("storage.backend")),
            _ => Err(ConfigurationError::UnsupportedBackend(s.to_string())),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageBackend::Postgres => "postgresql",
            StorageBackend::MySql => "mysql",
            StorageBackend::Mongo => "mongodb",
            StorageBackend::Memory => "memory",
        };
        f.write_str(name)
    }
}

impl StorageConfig {
    /// # Errors
    /// * `MissingParameter` - No backend configured
    /// * `UnsupportedBackend` - Unknown backend name
    pub fn backend(&self) -> Result<StorageBackend, ConfigurationError> {
        self.backend.parse()
    }
}

/// Return a configured value, treating a blank string as missing.
pub fn required<'a>(
    value: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, ConfigurationError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigurationError::MissingParameter(name))
}

/// Run mode used when `RUN_MODE` is unset. It has no file of its own, so
/// the secret and connection parameters must come from the environment.
pub const DEFAULT_RUN_MODE: &str = "production";

/// Top-level sections that environment variables may override.
const ENV_SECTIONS: [&str; 4] = ["SERVER__", "JWT__", "STORAGE__", "OAUTH__"];

impl Config {
    /// Load configuration from files with environment variable overrides
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (STORAGE__BACKEND, JWT__SECRET, etc.)
    /// 2. Environment-specific config file (config/{RUN_MODE}.toml)
    /// 3. Default config file (config/default.toml)
    ///
    /// # Errors
    /// * `Load` - A source could not be read or deserialized
    /// * `MissingParameter` - Signing secret or backend not set
    /// * `UnsupportedBackend` - Unknown backend name
    /// * `InvalidParameter` - Token lifetime not positive
    pub fn load() -> Result<Self, ConfigurationError> {
        let run_mode = env::var("RUN_MODE").ok();
        Self::load_from(run_mode.as_deref(), env::vars())
    }

    /// Load configuration for a run mode from the given environment variables.
    ///
    /// # Arguments
    /// * `run_mode` - Name of the layered file; `DEFAULT_RUN_MODE` when None
    /// * `vars` - Environment variables; only the known sections are read
    ///
    /// # Errors
    /// Same as [`Config::load`]
    pub fn load_from<I>(run_mode: Option<&str>, vars: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let run_mode = run_mode
            .filter(|mode| !mode.trim().is_empty())
            .unwrap_or(DEFAULT_RUN_MODE);

        let overrides: Map<String, String> = vars
            .into_iter()
            .filter(|(key, _)| {
                let upper = key.to_uppercase();
                ENV_SECTIONS.iter().any(|section| upper.starts_with(section))
            })
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();

        let configuration = ConfigBuilder::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Layer on environment-specific configuration
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Layer on environment variables (with __ as separator)
            // Example: STORAGE__POSTGRES__URL=postgres://... overrides storage.postgres.url
            .add_source(
                Environment::default()
                    .separator("__")
                    .source(Some(overrides)),
            )
            .build()?;

        let config: Config = configuration.try_deserialize()?;
        config.validate()?;

        tracing::debug!(run_mode, "Configuration sources merged");

        Ok(config)
    }

    /// Check the values every deployment needs regardless of backend.
    ///
    /// # Errors
    /// * `MissingParameter` - Signing secret or backend not set
    /// * `UnsupportedBackend` - Unknown backend name
    /// * `InvalidParameter` - Token lifetime not positive
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.jwt.secret.is_empty() {
            return Err(ConfigurationError::MissingParameter("jwt.secret"));
        }
        if self.jwt.ttl_seconds <= 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "jwt.ttl_seconds",
                reason: format!("must be positive, got {}", self.jwt.ttl_seconds),
            });
        }
        self.storage.backend()?;

        Ok(())
    }
}
