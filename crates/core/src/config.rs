//! Layered runtime settings: built-in defaults, then `edara.toml`, then
//! `EDARA_*` environment variables, then programmatic overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const MIN_SIGNING_SECRET_LEN: usize = 16;

const CONFIG_FILE_CANDIDATES: [&str; 2] = ["edara.toml", "config/edara.toml"];

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub action_links: ActionLinkConfig,
    pub notifications: NotificationConfig,
    pub shifts: ShiftConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://edara.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Origin embedded in emailed approve/reject links.
    pub public_base_url: String,
    pub graceful_shutdown_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            public_base_url: "http://127.0.0.1:8080".to_string(),
            graceful_shutdown_secs: 15,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ActionLinkConfig {
    #[serde(deserialize_with = "deserialize_secret")]
    pub signing_secret: SecretString,
}

impl Default for ActionLinkConfig {
    fn default() -> Self {
        Self { signing_secret: SecretString::from(String::new()) }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: false, webhook_url: None, timeout_secs: 10 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ShiftConfig {
    /// Local wall clock used to place shift windows; KSA (+03:00) unless set.
    pub utc_offset_minutes: i32,
    pub overdue_grace_minutes: u32,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self { utc_offset_minutes: 180, overdue_grace_minutes: 15 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "logging.format `{other}` is not one of compact, pretty or json"
            ))),
        }
    }
}

/// Values applied after the environment; tests and embedders use these.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub signing_secret: Option<String>,
    pub public_base_url: Option<String>,
    pub notifications_enabled: Option<bool>,
    pub notifications_webhook_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("`${{{var}}}` referenced in config file is not set in the environment")]
    MissingEnvInterpolation { var: String },
    #[error("`${{` in config file is never closed")]
    UnterminatedInterpolation,
    #[error("`{key}` has unusable value `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = match locate_file(options.config_path.as_deref()) {
            Some(path) => Self::from_file(&path)?,
            None if options.require_file => {
                let expected = options
                    .config_path
                    .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => Self::default(),
        };

        config.merge_env()?;
        config.merge_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        let expanded = expand_env_refs(&raw)?;
        toml::from_str(&expanded)
            .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
    }

    fn merge_env(&mut self) -> Result<(), ConfigError> {
        parse_env(&["EDARA_DATABASE_URL"], &mut self.database.url)?;
        parse_env(&["EDARA_DATABASE_MAX_CONNECTIONS"], &mut self.database.max_connections)?;
        parse_env(&["EDARA_DATABASE_TIMEOUT_SECS"], &mut self.database.timeout_secs)?;

        parse_env(&["EDARA_SERVER_BIND_ADDRESS"], &mut self.server.bind_address)?;
        parse_env(&["EDARA_SERVER_PORT"], &mut self.server.port)?;
        parse_env(&["EDARA_SERVER_PUBLIC_BASE_URL"], &mut self.server.public_base_url)?;
        parse_env(
            &["EDARA_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            &mut self.server.graceful_shutdown_secs,
        )?;

        if let Some((_, secret)) = env_value(&["EDARA_ACTION_LINKS_SIGNING_SECRET"]) {
            self.action_links.signing_secret = SecretString::from(secret);
        }

        parse_env(&["EDARA_NOTIFICATIONS_ENABLED"], &mut self.notifications.enabled)?;
        if let Some((_, url)) = env_value(&["EDARA_NOTIFICATIONS_WEBHOOK_URL"]) {
            self.notifications.webhook_url = Some(url);
        }
        parse_env(&["EDARA_NOTIFICATIONS_TIMEOUT_SECS"], &mut self.notifications.timeout_secs)?;

        parse_env(&["EDARA_SHIFTS_UTC_OFFSET_MINUTES"], &mut self.shifts.utc_offset_minutes)?;
        parse_env(
            &["EDARA_SHIFTS_OVERDUE_GRACE_MINUTES"],
            &mut self.shifts.overdue_grace_minutes,
        )?;

        parse_env(&["EDARA_LOGGING_LEVEL", "EDARA_LOG_LEVEL"], &mut self.logging.level)?;
        parse_env(&["EDARA_LOGGING_FORMAT", "EDARA_LOG_FORMAT"], &mut self.logging.format)?;
        Ok(())
    }

    fn merge_overrides(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            database_url,
            log_level,
            signing_secret,
            public_base_url,
            notifications_enabled,
            notifications_webhook_url,
        } = overrides;

        if let Some(url) = database_url {
            self.database.url = url;
        }
        if let Some(level) = log_level {
            self.logging.level = level;
        }
        if let Some(secret) = signing_secret {
            self.action_links.signing_secret = SecretString::from(secret);
        }
        if let Some(base_url) = public_base_url {
            self.server.public_base_url = base_url;
        }
        if let Some(enabled) = notifications_enabled {
            self.notifications.enabled = enabled;
        }
        if notifications_webhook_url.is_some() {
            self.notifications.webhook_url = notifications_webhook_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        require(
            url.starts_with("sqlite:") || url == ":memory:",
            "database.url must point at SQLite (`sqlite://path`, `sqlite::memory:` or `:memory:`)",
        )?;
        require(self.database.max_connections > 0, "database.max_connections must be at least 1")?;
        require(
            (1..=300).contains(&self.database.timeout_secs),
            "database.timeout_secs must be between 1 and 300",
        )?;

        require(self.server.port > 0, "server.port must be at least 1")?;
        require(
            self.server.graceful_shutdown_secs > 0,
            "server.graceful_shutdown_secs must be at least 1",
        )?;
        require(
            is_http_url(&self.server.public_base_url),
            "server.public_base_url must be an http(s) origin",
        )?;

        let secret = self.action_links.signing_secret.expose_secret();
        require(
            !secret.trim().is_empty(),
            "action_links.signing_secret is required to sign approval links \
             (set EDARA_ACTION_LINKS_SIGNING_SECRET)",
        )?;
        require(
            secret.len() >= MIN_SIGNING_SECRET_LEN,
            format!("action_links.signing_secret needs {MIN_SIGNING_SECRET_LEN}+ characters"),
        )?;

        require(
            (1..=120).contains(&self.notifications.timeout_secs),
            "notifications.timeout_secs must be between 1 and 120",
        )?;
        match &self.notifications.webhook_url {
            Some(url) => require(is_http_url(url), "notifications.webhook_url must be http(s)")?,
            None => require(
                !self.notifications.enabled,
                "notifications.enabled needs notifications.webhook_url",
            )?,
        }

        require(
            (-840..=840).contains(&self.shifts.utc_offset_minutes),
            "shifts.utc_offset_minutes must be between -840 and 840",
        )?;

        require(
            matches!(
                self.logging.level.trim().to_ascii_lowercase().as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ),
            "logging.level must be trace, debug, info, warn or error",
        )
    }
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.into()))
    }
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn locate_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

/// Replaces every `${NAME}` in the raw file with the variable's value.
fn expand_env_refs(raw: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_string() })?;
        expanded.push_str(&value);
        rest = &after[end + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

/// First non-blank variable among `keys`, with the key it came from.
fn env_value(keys: &[&str]) -> Option<(String, String)> {
    keys.iter().find_map(|key| {
        env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| (key.to_string(), value))
    })
}

fn parse_env<T: FromStr>(keys: &[&str], slot: &mut T) -> Result<(), ConfigError> {
    if let Some((key, value)) = env_value(keys) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnvOverride { key, value })?;
    }
    Ok(())
}
