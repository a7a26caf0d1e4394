use std::env;
use std::fs;
use std::path::Path;

use henhouse_core::config::{env_key_for, resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct ConfigField {
    key: &'static str,
    env_key: Option<&'static str>,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    let field = |key: &'static str, value: String| ConfigField {
        key,
        env_key: env_key_for(key),
        value,
    };

    vec![
        field("database.url", config.database.url.clone()),
        field("database.max_connections", config.database.max_connections.to_string()),
        field("database.timeout_secs", config.database.timeout_secs.to_string()),
        field("slack.app_token", redact_token(config.slack.app_token.expose_secret())),
        field("slack.bot_token", redact_token(config.slack.bot_token.expose_secret())),
        field("rewards.marker_emoji", config.rewards.marker_emoji.clone()),
        field("rewards.chickens_per_user", config.rewards.chickens_per_user.to_string()),
        field("server.bind_address", config.server.bind_address.clone()),
        field("server.health_check_port", config.server.health_check_port.to_string()),
        field("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        field("logging.level", config.logging.level.clone()),
        field("logging.format", format!("{:?}", config.logging.format)),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key.filter(|key| env::var_os(key).is_some()) {
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
