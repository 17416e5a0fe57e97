use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use kodbook_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One printed config entry: dotted key, env override name, rendered value.
struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let field = |key, env_key, value: String| Field { key, env_key, value };

    vec![
        field("database.url", "KODBOOK_DATABASE_URL", config.database.url.clone()),
        field(
            "database.max_connections",
            "KODBOOK_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "KODBOOK_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field(
            "telegram.bot_token",
            "KODBOOK_TELEGRAM_BOT_TOKEN",
            redact_token(config.telegram.bot_token.expose_secret()),
        ),
        field(
            "telegram.api_base_url",
            "KODBOOK_TELEGRAM_API_BASE_URL",
            config.telegram.api_base_url.clone(),
        ),
        field(
            "telegram.poll_timeout_secs",
            "KODBOOK_TELEGRAM_POLL_TIMEOUT_SECS",
            config.telegram.poll_timeout_secs.to_string(),
        ),
        field(
            "conversation.utc_offset_minutes",
            "KODBOOK_CONVERSATION_UTC_OFFSET_MINUTES",
            config.conversation.utc_offset_minutes.to_string(),
        ),
        field(
            "conversation.session_idle_secs",
            "KODBOOK_CONVERSATION_SESSION_IDLE_SECS",
            config.conversation.session_idle_secs.to_string(),
        ),
        field(
            "conversation.sweep_interval_secs",
            "KODBOOK_CONVERSATION_SWEEP_INTERVAL_SECS",
            config.conversation.sweep_interval_secs.to_string(),
        ),
        field(
            "server.bind_address",
            "KODBOOK_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        field(
            "server.health_check_port",
            "KODBOOK_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port.to_string(),
        ),
        field(
            "server.graceful_shutdown_secs",
            "KODBOOK_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field("logging.level", "KODBOOK_LOGGING_LEVEL", config.logging.level.clone()),
        field("logging.format", "KODBOOK_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["kodbook.toml", "config/kodbook.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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

/// Keeps the public bot id and hides the secret half.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once(':') {
        Some((bot_id, _)) if !bot_id.is_empty() => format!("{bot_id}:***"),
        _ => "<redacted>".to_string(),
    }
}
