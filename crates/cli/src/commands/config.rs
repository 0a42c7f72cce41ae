use std::env;
use std::fs;
use std::path::Path;

use rigquote_core::config::{resolve_config_path, AppConfig, LoadOptions};
use rigquote_core::errors::ApplicationError;
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            let failure = ApplicationError::Configuration(error.to_string());
            return CommandResult {
                exit_code: failure.exit_code(),
                output: format!("config validation failed: {error}"),
            };
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: [(&str, String, &[&str]); 7] = [
        ("catalog.path", config.catalog.path.display().to_string(), &["RIGQUOTE_CATALOG_PATH"]),
        (
            "estimates.default_validity_days",
            config.estimates.default_validity_days.to_string(),
            &["RIGQUOTE_ESTIMATES_DEFAULT_VALIDITY_DAYS"],
        ),
        (
            "estimates.enforce_required_fields",
            config.estimates.enforce_required_fields.to_string(),
            &["RIGQUOTE_ESTIMATES_ENFORCE_REQUIRED_FIELDS"],
        ),
        (
            "estimates.allow_delete_converted",
            config.estimates.allow_delete_converted.to_string(),
            &["RIGQUOTE_ESTIMATES_ALLOW_DELETE_CONVERTED"],
        ),
        (
            "pricing.rounding_scale",
            config.pricing.rounding_scale.to_string(),
            &["RIGQUOTE_PRICING_ROUNDING_SCALE"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["RIGQUOTE_LOGGING_LEVEL", "RIGQUOTE_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["RIGQUOTE_LOGGING_FORMAT", "RIGQUOTE_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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
