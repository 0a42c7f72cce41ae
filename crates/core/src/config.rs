use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["rigquote.toml", "config/rigquote.toml"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub estimates: EstimatesConfig,
    pub pricing: PricingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Catalog snapshot JSON read by the CLI.
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EstimatesConfig {
    pub default_validity_days: u32,
    pub enforce_required_fields: bool,
    pub allow_delete_converted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingConfig {
    /// Decimal places used when totals are shown. Computation itself never rounds.
    pub rounding_scale: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
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
    pub catalog_path: Option<PathBuf>,
    pub default_validity_days: Option<u32>,
    pub enforce_required_fields: Option<bool>,
    pub allow_delete_converted: Option<bool>,
    pub rounding_scale: Option<u32>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
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
            catalog: CatalogConfig { path: PathBuf::from("catalog.json") },
            estimates: EstimatesConfig {
                default_validity_days: 7,
                enforce_required_fields: true,
                allow_delete_converted: false,
            },
            pricing: PricingConfig { rounding_scale: 2 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(catalog) = patch.catalog {
            if let Some(path) = catalog.path {
                self.catalog.path = path;
            }
        }

        if let Some(estimates) = patch.estimates {
            if let Some(days) = estimates.default_validity_days {
                self.estimates.default_validity_days = days;
            }
            if let Some(enforce) = estimates.enforce_required_fields {
                self.estimates.enforce_required_fields = enforce;
            }
            if let Some(allow) = estimates.allow_delete_converted {
                self.estimates.allow_delete_converted = allow;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(scale) = pricing.rounding_scale {
                self.pricing.rounding_scale = scale;
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
        if let Some(value) = read_env("RIGQUOTE_CATALOG_PATH") {
            self.catalog.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("RIGQUOTE_ESTIMATES_DEFAULT_VALIDITY_DAYS") {
            self.estimates.default_validity_days =
                parse_u32("RIGQUOTE_ESTIMATES_DEFAULT_VALIDITY_DAYS", &value)?;
        }
        if let Some(value) = read_env("RIGQUOTE_ESTIMATES_ENFORCE_REQUIRED_FIELDS") {
            self.estimates.enforce_required_fields =
                parse_bool("RIGQUOTE_ESTIMATES_ENFORCE_REQUIRED_FIELDS", &value)?;
        }
        if let Some(value) = read_env("RIGQUOTE_ESTIMATES_ALLOW_DELETE_CONVERTED") {
            self.estimates.allow_delete_converted =
                parse_bool("RIGQUOTE_ESTIMATES_ALLOW_DELETE_CONVERTED", &value)?;
        }

        if let Some(value) = read_env("RIGQUOTE_PRICING_ROUNDING_SCALE") {
            self.pricing.rounding_scale = parse_u32("RIGQUOTE_PRICING_ROUNDING_SCALE", &value)?;
        }

        let log_level =
            read_env("RIGQUOTE_LOGGING_LEVEL").or_else(|| read_env("RIGQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RIGQUOTE_LOGGING_FORMAT").or_else(|| read_env("RIGQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(path) = overrides.catalog_path {
            self.catalog.path = path;
        }
        if let Some(days) = overrides.default_validity_days {
            self.estimates.default_validity_days = days;
        }
        if let Some(enforce) = overrides.enforce_required_fields {
            self.estimates.enforce_required_fields = enforce;
        }
        if let Some(allow) = overrides.allow_delete_converted {
            self.estimates.allow_delete_converted = allow;
        }
        if let Some(scale) = overrides.rounding_scale {
            self.pricing.rounding_scale = scale;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_catalog(&self.catalog)?;
        validate_estimates(&self.estimates)?;
        validate_pricing(&self.pricing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    if catalog.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("catalog.path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_estimates(estimates: &EstimatesConfig) -> Result<(), ConfigError> {
    if !(1..=365).contains(&estimates.default_validity_days) {
        return Err(ConfigError::Validation(
            "estimates.default_validity_days must be in range 1..=365".to_string(),
        ));
    }
    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.rounding_scale > 4 {
        return Err(ConfigError::Validation(
            "pricing.rounding_scale must be in range 0..=4".to_string(),
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

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    catalog: Option<CatalogPatch>,
    estimates: Option<EstimatesPatch>,
    pricing: Option<PricingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct EstimatesPatch {
    default_validity_days: Option<u32>,
    enforce_required_fields: Option<bool>,
    allow_delete_converted: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    rounding_scale: Option<u32>,
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
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

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
    fn defaults_are_valid_without_any_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.estimates.default_validity_days == 7, "default validity is seven days")?;
        ensure(config.estimates.enforce_required_fields, "required fields are enforced")?;
        ensure(!config.estimates.allow_delete_converted, "converted deletion is refused")?;
        ensure(config.pricing.rounding_scale == 2, "totals round to two places")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_RIGQUOTE_CATALOG_DIR", "/srv/shop");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rigquote.toml");
            fs::write(
                &path,
                r#"
[catalog]
path = "${TEST_RIGQUOTE_CATALOG_DIR}/catalog.json"

[estimates]
default_validity_days = 14
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.catalog.path == PathBuf::from("/srv/shop/catalog.json"),
                "catalog path should be interpolated from environment",
            )?;
            ensure(config.estimates.default_validity_days == 14, "file validity should apply")
        })();

        clear_vars(&["TEST_RIGQUOTE_CATALOG_DIR"]);
        result
    }

    #[test]
    fn missing_interpolation_variables_fail_the_load() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("rigquote.toml");
        fs::write(&path, "[catalog]\npath = \"${RIGQUOTE_TEST_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("expected interpolation failure".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(
                error,
                ConfigError::MissingEnvInterpolation { ref var } if var == "RIGQUOTE_TEST_UNSET_VAR"
            ),
            "missing variable should be named",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIGQUOTE_LOG_LEVEL", "warn");
        env::set_var("RIGQUOTE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["RIGQUOTE_LOG_LEVEL", "RIGQUOTE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIGQUOTE_ESTIMATES_DEFAULT_VALIDITY_DAYS", "21");
        env::set_var("RIGQUOTE_ESTIMATES_ALLOW_DELETE_CONVERTED", "true");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rigquote.toml");
            fs::write(
                &path,
                r#"
[estimates]
default_validity_days = 10
enforce_required_fields = false

[pricing]
rounding_scale = 3

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    rounding_scale: Some(0),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.pricing.rounding_scale == 0, "override rounding scale should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.estimates.default_validity_days == 21,
                "env validity should win over file and defaults",
            )?;
            ensure(config.estimates.allow_delete_converted, "env flag should apply")?;
            ensure(!config.estimates.enforce_required_fields, "file flag should apply")
        })();

        clear_vars(&[
            "RIGQUOTE_ESTIMATES_DEFAULT_VALIDITY_DAYS",
            "RIGQUOTE_ESTIMATES_ALLOW_DELETE_CONVERTED",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIGQUOTE_ESTIMATES_DEFAULT_VALIDITY_DAYS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("estimates.default_validity_days")
            );
            ensure(has_message, "validation failure should name the offending key")
        })();

        clear_vars(&["RIGQUOTE_ESTIMATES_DEFAULT_VALIDITY_DAYS"]);
        result
    }

    #[test]
    fn malformed_env_overrides_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIGQUOTE_PRICING_ROUNDING_SCALE", "two");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override".to_string()),
            Err(error) => ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "RIGQUOTE_PRICING_ROUNDING_SCALE"
                ),
                "invalid override should name the variable",
            ),
        };

        clear_vars(&["RIGQUOTE_PRICING_ROUNDING_SCALE"]);
        result
    }

    #[test]
    fn require_file_reports_the_expected_path() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let expected = dir.path().join("absent.toml");
        let error = match AppConfig::load(LoadOptions {
            config_path: Some(expected.clone()),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected missing file failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingConfigFile(ref path) if path == &expected),
            "missing file error should carry the requested path",
        )
    }
}
