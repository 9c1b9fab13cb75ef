use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use edara_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One line per effective setting: `(key, env var, rendered value)`.
type Field = (&'static str, &'static str, String);

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: Vec<Field> = vec![
        ("database.url", "EDARA_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "EDARA_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "EDARA_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ("server.bind_address", "EDARA_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        ("server.port", "EDARA_SERVER_PORT", config.server.port.to_string()),
        (
            "server.public_base_url",
            "EDARA_SERVER_PUBLIC_BASE_URL",
            config.server.public_base_url.clone(),
        ),
        (
            "server.graceful_shutdown_secs",
            "EDARA_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "action_links.signing_secret",
            "EDARA_ACTION_LINKS_SIGNING_SECRET",
            redact_secret(config.action_links.signing_secret.expose_secret()),
        ),
        (
            "notifications.enabled",
            "EDARA_NOTIFICATIONS_ENABLED",
            config.notifications.enabled.to_string(),
        ),
        (
            "notifications.webhook_url",
            "EDARA_NOTIFICATIONS_WEBHOOK_URL",
            config.notifications.webhook_url.as_deref().map(redact_url).unwrap_or_else(unset),
        ),
        (
            "notifications.timeout_secs",
            "EDARA_NOTIFICATIONS_TIMEOUT_SECS",
            config.notifications.timeout_secs.to_string(),
        ),
        (
            "shifts.utc_offset_minutes",
            "EDARA_SHIFTS_UTC_OFFSET_MINUTES",
            config.shifts.utc_offset_minutes.to_string(),
        ),
        (
            "shifts.overdue_grace_minutes",
            "EDARA_SHIFTS_OVERDUE_GRACE_MINUTES",
            config.shifts.overdue_grace_minutes.to_string(),
        ),
        ("logging.level", "EDARA_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "EDARA_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key, value) in fields {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["edara.toml", "config/edara.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }
    if let Some(alias) = legacy_alias(env_key) {
        if env::var_os(alias).is_some() {
            return format!("env ({alias})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn legacy_alias(env_key: &str) -> Option<&'static str> {
    match env_key {
        "EDARA_LOGGING_LEVEL" => Some("EDARA_LOG_LEVEL"),
        "EDARA_LOGGING_FORMAT" => Some("EDARA_LOG_FORMAT"),
        _ => None,
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn unset() -> String {
    "<unset>".to_string()
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        return "<empty>".to_string();
    }
    format!("<redacted, {} chars>", secret.chars().count())
}

/// Gateway urls often carry an api key in the query string.
fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?<redacted>"),
        None => url.to_string(),
    }
}
