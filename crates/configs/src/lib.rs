//! inkwell/crates/configs/src/lib.rs
//!
//! Layered application configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults (the `Default` impls below)
//! 2. `config/default.toml` (optional)
//! 3. `config/local.toml` (optional, not committed)
//! 4. `INKWELL__SECTION__KEY` environment variables, after `.env` is loaded

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

const ENV_PREFIX: &str = "INKWELL";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    pub captcha: CaptchaConfig,
    pub content: ContentConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Take the client address from `X-Forwarded-For`. Only enable behind a
    /// proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            trust_forwarded_for: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://inkwell.db".into(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub root: PathBuf,
    pub url_prefix: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/media"),
            url_prefix: "/media".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    pub enabled: bool,
    #[serde(deserialize_with = "secret_string")]
    pub secret: SecretString,
    pub verify_url: String,
    pub timeout_ms: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: SecretString::from(String::new()),
            verify_url: "https://www.google.com/recaptcha/api/siteverify".into(),
            timeout_ms: 3000,
        }
    }
}

impl CaptchaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn secret_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Numbered slug candidates tried before random suffixes.
    pub slug_attempts: u32,
    pub page_size: u32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            slug_attempts: 20,
            page_size: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".into(),
        }
    }
}

impl AppConfig {
    /// Loads `.env`, then every source relative to the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::load_from(Path::new("."), Environment::with_prefix(ENV_PREFIX))
    }

    /// Loads the TOML files under `<dir>/config/` and the given environment
    /// source, then validates the result.
    pub fn load_from(dir: &Path, env: Environment) -> Result<Self, ConfigError> {
        let config_dir = dir.join("config");
        let settings = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                env.prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.captcha.enabled && self.captcha.secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::invalid(
                "captcha.secret",
                "must be set when captcha is enabled",
            ));
        }
        if self.captcha.timeout_ms == 0 {
            return Err(ConfigError::invalid("captcha.timeout_ms", "must be positive"));
        }
        if self.content.page_size == 0 {
            return Err(ConfigError::invalid("content.page_size", "must be positive"));
        }
        if self.content.slug_attempts == 0 {
            return Err(ConfigError::invalid("content.slug_attempts", "must be positive"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid("database.max_connections", "must be positive"));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::invalid("database.url", "must not be empty"));
        }
        Ok(())
    }
}
