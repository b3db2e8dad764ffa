use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value as JsonValue};
use toml::Value;

use crate::commands::CommandResult;
use wagewiz_core::config::{AppConfig, LoadOptions};

/// Every reported key with the environment variable that can override it.
const FIELDS: &[(&str, &str)] = &[
    ("database.url", "WAGEWIZ_DATABASE_URL"),
    ("database.max_connections", "WAGEWIZ_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "WAGEWIZ_DATABASE_TIMEOUT_SECS"),
    ("llm.provider", "WAGEWIZ_LLM_PROVIDER"),
    ("llm.api_key", "WAGEWIZ_LLM_API_KEY"),
    ("llm.base_url", "WAGEWIZ_LLM_BASE_URL"),
    ("llm.model", "WAGEWIZ_LLM_MODEL"),
    ("llm.timeout_secs", "WAGEWIZ_LLM_TIMEOUT_SECS"),
    ("llm.temperature", "WAGEWIZ_LLM_TEMPERATURE"),
    ("server.bind_address", "WAGEWIZ_SERVER_BIND_ADDRESS"),
    ("server.port", "WAGEWIZ_SERVER_PORT"),
    ("server.graceful_shutdown_secs", "WAGEWIZ_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("events.channel_name", "WAGEWIZ_EVENTS_CHANNEL_NAME"),
    ("events.capacity", "WAGEWIZ_EVENTS_CAPACITY"),
    ("logging.level", "WAGEWIZ_LOGGING_LEVEL"),
    ("logging.format", "WAGEWIZ_LOGGING_FORMAT"),
];

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let sources = FIELDS
        .iter()
        .map(|(key_path, env_key)| {
            let source =
                field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
            (key_path.to_string(), JsonValue::String(source))
        })
        .collect::<Map<_, _>>();

    CommandResult::success_with_details(
        "config",
        "effective config (source precedence: env > file > default)",
        Some(serde_json::json!({
            "values": config.redacted_summary(),
            "sources": sources,
        })),
    )
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("wagewiz.toml"), PathBuf::from("config/wagewiz.toml")]
        .into_iter()
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
