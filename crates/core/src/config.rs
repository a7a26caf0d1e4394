use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use toml::{Table, Value};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub rewards: RewardsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    #[serde(deserialize_with = "secret")]
    pub app_token: SecretString,
    #[serde(deserialize_with = "secret")]
    pub bot_token: SecretString,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Emoji shortcode name without colons, e.g. `egg`.
    pub marker_emoji: String,
    /// Chickens hatched for a newly seen user; also the daily giving allowance.
    pub chickens_per_user: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
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

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://henhouse.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self { app_token: String::new().into(), bot_token: String::new().into() }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self { marker_emoji: "egg".to_string(), chickens_per_user: 5 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            health_check_port: 8080,
            graceful_shutdown_secs: 15,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub reward_marker_emoji: Option<String>,
    pub chickens_per_user: Option<u32>,
}

impl ConfigOverrides {
    fn entries(self) -> impl Iterator<Item = (&'static str, Value)> {
        [
            ("database.url", self.database_url.map(Value::String)),
            ("logging.level", self.log_level.map(Value::String)),
            ("slack.app_token", self.slack_app_token.map(Value::String)),
            ("slack.bot_token", self.slack_bot_token.map(Value::String)),
            ("rewards.marker_emoji", self.reward_marker_emoji.map(Value::String)),
            (
                "rewards.chickens_per_user",
                self.chickens_per_user.map(|count| Value::Integer(i64::from(count))),
            ),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration has an invalid value: {0}")]
    Invalid(#[source] toml::de::Error),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["henhouse.toml", "config/henhouse.toml"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EnvKind {
    Text,
    Number,
    /// Matched case-insensitively against an enum of names.
    Keyword,
}

/// A setting that can be overridden from the environment.
#[derive(Clone, Copy, Debug)]
pub struct EnvSetting {
    /// Dotted `section.field` path in the config file.
    pub key: &'static str,
    pub env_key: &'static str,
    kind: EnvKind,
}

const fn setting(key: &'static str, env_key: &'static str, kind: EnvKind) -> EnvSetting {
    EnvSetting { key, env_key, kind }
}

pub const ENV_SETTINGS: [EnvSetting; 12] = [
    setting("database.url", "HENHOUSE_DATABASE_URL", EnvKind::Text),
    setting("database.max_connections", "HENHOUSE_DATABASE_MAX_CONNECTIONS", EnvKind::Number),
    setting("database.timeout_secs", "HENHOUSE_DATABASE_TIMEOUT_SECS", EnvKind::Number),
    setting("slack.app_token", "HENHOUSE_SLACK_APP_TOKEN", EnvKind::Text),
    setting("slack.bot_token", "HENHOUSE_SLACK_BOT_TOKEN", EnvKind::Text),
    setting("rewards.marker_emoji", "HENHOUSE_REWARDS_MARKER_EMOJI", EnvKind::Text),
    setting("rewards.chickens_per_user", "HENHOUSE_REWARDS_CHICKENS_PER_USER", EnvKind::Number),
    setting("server.bind_address", "HENHOUSE_SERVER_BIND_ADDRESS", EnvKind::Text),
    setting("server.health_check_port", "HENHOUSE_SERVER_HEALTH_CHECK_PORT", EnvKind::Number),
    setting(
        "server.graceful_shutdown_secs",
        "HENHOUSE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        EnvKind::Number,
    ),
    setting("logging.level", "HENHOUSE_LOGGING_LEVEL", EnvKind::Text),
    setting("logging.format", "HENHOUSE_LOGGING_FORMAT", EnvKind::Keyword),
];

/// Env var that overrides the dotted config key, if it has one.
pub fn env_key_for(key: &str) -> Option<&'static str> {
    ENV_SETTINGS.iter().find(|setting| setting.key == key).map(|setting| setting.env_key)
}

impl EnvSetting {
    fn read(&self) -> Result<Option<Value>, ConfigError> {
        let Some(raw) = read_env(self.env_key) else {
            return Ok(None);
        };
        let value = match self.kind {
            EnvKind::Text => Value::String(raw),
            EnvKind::Keyword => Value::String(raw.trim().to_ascii_lowercase()),
            EnvKind::Number => {
                let number = raw.trim().parse::<i64>().map_err(|_| {
                    ConfigError::InvalidEnvOverride { key: self.env_key.to_string(), value: raw }
                })?;
                Value::Integer(number)
            }
        };
        Ok(Some(value))
    }
}

impl AppConfig {
    /// Layers defaults, the config file, `HENHOUSE_*` env vars and overrides, then validates.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut document = match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => read_document(&path)?,
            None => Table::new(),
        };

        for setting in &ENV_SETTINGS {
            if let Some(value) = setting.read()? {
                set_key(&mut document, setting.key, value);
            }
        }
        for (key, value) in options.overrides.entries() {
            set_key(&mut document, key, value);
        }

        let config: Self = Value::Table(document).try_into().map_err(ConfigError::Invalid)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_rewards(&self.rewards)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)
    }
}

/// Returns the config file that `AppConfig::load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_document(path: &Path) -> Result<Table, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    interpolate_env_vars(&raw)?
        .parse::<Table>()
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn set_key(document: &mut Table, key: &str, value: Value) {
    let Some((section, field)) = key.split_once('.') else {
        document.insert(key.to_owned(), value);
        return;
    };
    let slot = document.entry(section).or_insert(Value::Table(Table::new()));
    if !slot.is_table() {
        *slot = Value::Table(Table::new());
    }
    if let Value::Table(table) = slot {
        table.insert(field.to_owned(), value);
    }
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_owned() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

fn check(valid: bool, message: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Validation(message()))
    }
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    check(url.starts_with("sqlite:") || url == ":memory:", || {
        "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
            .to_string()
    })?;
    check(database.max_connections > 0, || {
        "database.max_connections must be greater than zero".to_string()
    })?;
    check((1..=300).contains(&database.timeout_secs), || {
        "database.timeout_secs must be in range 1..=300".to_string()
    })
}

/// Socket Mode needs the app-level token; posting DMs needs the bot token.
fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    validate_token("slack.app_token", slack.app_token.expose_secret(), "xapp-", "xoxb-")?;
    validate_token("slack.bot_token", slack.bot_token.expose_secret(), "xoxb-", "xapp-")
}

fn validate_token(key: &str, token: &str, prefix: &str, swapped: &str) -> Result<(), ConfigError> {
    check(!token.is_empty(), || {
        format!("{key} is required; copy it from your Slack app at https://api.slack.com/apps")
    })?;
    check(token.starts_with(prefix), || {
        let hint = if token.starts_with(swapped) {
            " (the app and bot tokens look swapped)"
        } else {
            ""
        };
        format!("{key} must start with `{prefix}`{hint}")
    })
}

fn validate_rewards(rewards: &RewardsConfig) -> Result<(), ConfigError> {
    let marker = rewards.marker_emoji.trim().trim_matches(':');
    let valid_marker = !marker.is_empty()
        && marker.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '+'));
    check(valid_marker, || {
        "rewards.marker_emoji must be an emoji shortcode name such as `egg`".to_string()
    })?;
    check((1..=100).contains(&rewards.chickens_per_user), || {
        "rewards.chickens_per_user must be in range 1..=100".to_string()
    })
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    check(server.health_check_port > 0, || {
        "server.health_check_port must be greater than zero".to_string()
    })?;
    check(server.graceful_shutdown_secs > 0, || {
        "server.graceful_shutdown_secs must be greater than zero".to_string()
    })
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    check(matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error"), || {
        "logging.level must be one of trace|debug|info|warn|error".to_string()
    })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
