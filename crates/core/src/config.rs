use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    /// Offset of the clock that "yesterday/today/tomorrow" are read from.
    pub utc_offset_minutes: i32,
    pub session_idle_secs: u64,
    pub sweep_interval_secs: u64,
}

impl ConversationConfig {
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_api_base_url: Option<String>,
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://kodbook.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                poll_timeout_secs: 30,
            },
            conversation: ConversationConfig {
                utc_offset_minutes: 300,
                session_idle_secs: 6 * 60 * 60,
                sweep_interval_secs: 5 * 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("kodbook.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(telegram) = patch.telegram {
            if let Some(bot_token) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(utc_offset_minutes) = conversation.utc_offset_minutes {
                self.conversation.utc_offset_minutes = utc_offset_minutes;
            }
            if let Some(session_idle_secs) = conversation.session_idle_secs {
                self.conversation.session_idle_secs = session_idle_secs;
            }
            if let Some(sweep_interval_secs) = conversation.sweep_interval_secs {
                self.conversation.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("KODBOOK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("KODBOOK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("KODBOOK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("KODBOOK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("KODBOOK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KODBOOK_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("KODBOOK_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("KODBOOK_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("KODBOOK_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KODBOOK_CONVERSATION_UTC_OFFSET_MINUTES") {
            self.conversation.utc_offset_minutes =
                parse_i32("KODBOOK_CONVERSATION_UTC_OFFSET_MINUTES", &value)?;
        }
        if let Some(value) = read_env("KODBOOK_CONVERSATION_SESSION_IDLE_SECS") {
            self.conversation.session_idle_secs =
                parse_u64("KODBOOK_CONVERSATION_SESSION_IDLE_SECS", &value)?;
        }
        if let Some(value) = read_env("KODBOOK_CONVERSATION_SWEEP_INTERVAL_SECS") {
            self.conversation.sweep_interval_secs =
                parse_u64("KODBOOK_CONVERSATION_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("KODBOOK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("KODBOOK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("KODBOOK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("KODBOOK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("KODBOOK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("KODBOOK_LOGGING_LEVEL").or_else(|| read_env("KODBOOK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("KODBOOK_LOGGING_FORMAT").or_else(|| read_env("KODBOOK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.telegram_bot_token {
            self.telegram.bot_token = secret_value(bot_token);
        }
        if let Some(api_base_url) = overrides.telegram_api_base_url {
            self.telegram.api_base_url = api_base_url;
        }
        if let Some(utc_offset_minutes) = overrides.utc_offset_minutes {
            self.conversation.utc_offset_minutes = utc_offset_minutes;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_telegram(&self.telegram)?;
        validate_conversation(&self.conversation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("kodbook.toml"), PathBuf::from("config/kodbook.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

/// Bot tokens look like `123456789:AAH...`: a numeric bot id, a colon, then the secret.
pub fn bot_token_shape_is_valid(token: &str) -> bool {
    match token.split_once(':') {
        Some((bot_id, secret)) => {
            !bot_id.is_empty()
                && bot_id.chars().all(|ch| ch.is_ascii_digit())
                && !secret.trim().is_empty()
        }
        None => false,
    }
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let bot_token = telegram.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Create a bot with @BotFather and copy the token it returns"
                .to_string(),
        ));
    }
    if !bot_token_shape_is_valid(bot_token) {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<bot id>:<secret>` as issued by @BotFather"
                .to_string(),
        ));
    }

    let base_url = telegram.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "telegram.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if telegram.poll_timeout_secs == 0 || telegram.poll_timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 1..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if !(-720..=840).contains(&conversation.utc_offset_minutes) {
        return Err(ConfigError::Validation(
            "conversation.utc_offset_minutes must be in range -720..=840".to_string(),
        ));
    }

    if conversation.session_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.session_idle_secs must be greater than zero".to_string(),
        ));
    }

    if conversation.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i32(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.trim().parse::<i32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    telegram: Option<TelegramPatch>,
    conversation: Option<ConversationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    utc_offset_minutes: Option<i32>,
    session_idle_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        bot_token_shape_is_valid, AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const VALID_TOKEN: &str = "123456789:AAH-test-secret";

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_KODBOOK_BOT_TOKEN", "42:from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("kodbook.toml");
            fs::write(
                &path,
                r#"
[telegram]
bot_token = "${TEST_KODBOOK_BOT_TOKEN}"

[conversation]
utc_offset_minutes = 180
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telegram.bot_token.expose_secret() == "42:from-env",
                "bot token should be loaded from environment",
            )?;
            ensure(
                config.conversation.utc_offset_minutes == 180,
                "utc offset should be read from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_KODBOOK_BOT_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KODBOOK_TELEGRAM_BOT_TOKEN", VALID_TOKEN);
        env::set_var("KODBOOK_LOG_LEVEL", "warn");
        env::set_var("KODBOOK_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["KODBOOK_TELEGRAM_BOT_TOKEN", "KODBOOK_LOG_LEVEL", "KODBOOK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KODBOOK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("KODBOOK_TELEGRAM_BOT_TOKEN", "7:from-env");
        env::set_var("KODBOOK_CONVERSATION_SESSION_IDLE_SECS", "900");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("kodbook.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[telegram]
bot_token = "7:from-file"

[conversation]
session_idle_secs = 60
sweep_interval_secs = 30

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.telegram.bot_token.expose_secret() == "7:from-env",
                "env bot token should win over file and defaults",
            )?;
            ensure(
                config.conversation.session_idle_secs == 900,
                "env idle timeout should win over file",
            )?;
            ensure(
                config.conversation.sweep_interval_secs == 30,
                "file sweep interval should win over default",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "KODBOOK_DATABASE_URL",
            "KODBOOK_TELEGRAM_BOT_TOKEN",
            "KODBOOK_CONVERSATION_SESSION_IDLE_SECS",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KODBOOK_TELEGRAM_BOT_TOKEN", "not-a-token");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("telegram.bot_token")
            );
            ensure(has_message, "validation failure should mention telegram.bot_token")
        })();

        clear_vars(&["KODBOOK_TELEGRAM_BOT_TOKEN"]);
        result
    }

    #[test]
    fn out_of_range_offset_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KODBOOK_TELEGRAM_BOT_TOKEN", VALID_TOKEN);
        env::set_var("KODBOOK_CONVERSATION_UTC_OFFSET_MINUTES", "900");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "offset outside -720..=840 should fail".to_string())?;
            ensure(
                error.to_string().contains("conversation.utc_offset_minutes"),
                "validation failure should mention the offset key",
            )
        })();

        clear_vars(&["KODBOOK_TELEGRAM_BOT_TOKEN", "KODBOOK_CONVERSATION_UTC_OFFSET_MINUTES"]);
        result
    }

    #[test]
    fn malformed_numeric_env_override_names_the_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KODBOOK_TELEGRAM_BOT_TOKEN", VALID_TOKEN);
        env::set_var("KODBOOK_TELEGRAM_POLL_TIMEOUT_SECS", "soon");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "non-numeric timeout should fail".to_string())?;
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "KODBOOK_TELEGRAM_POLL_TIMEOUT_SECS"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["KODBOOK_TELEGRAM_BOT_TOKEN", "KODBOOK_TELEGRAM_POLL_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KODBOOK_TELEGRAM_BOT_TOKEN", "987654:super-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("super-secret-value"),
                "debug output should not contain bot token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(
                config.conversation.utc_offset_minutes == 300,
                "default offset should be Tashkent",
            )?;
            Ok(())
        })();

        clear_vars(&["KODBOOK_TELEGRAM_BOT_TOKEN"]);
        result
    }

    #[test]
    fn bot_token_shape() {
        assert!(bot_token_shape_is_valid(VALID_TOKEN));
        assert!(!bot_token_shape_is_valid("AAH:secret"));
        assert!(!bot_token_shape_is_valid("123456:"));
        assert!(!bot_token_shape_is_valid("123456"));
    }
}
