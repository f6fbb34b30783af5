use domain::models::LocationAccuracy;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub membership: MembershipConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
    /// Single-line output; the default for the interactive shell.
    #[default]
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// Accuracy tier requested from the positioning sensor
    #[serde(default)]
    pub accuracy: LocationAccuracy,

    /// Minimum time between accepted samples, in milliseconds
    #[serde(default = "default_time_interval_ms")]
    pub time_interval_ms: u64,

    /// Minimum distance between accepted samples, in meters
    #[serde(default = "default_distance_interval_m")]
    pub distance_interval_m: f64,

    /// Whether to ask for background location access after foreground access is granted
    #[serde(default = "default_request_background")]
    pub request_background: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipConfig {
    /// Member name used when the identity has no display name
    #[serde(default = "default_display_name")]
    pub default_display_name: String,

    /// Scan existing circles for a colliding code before creating a circle
    #[serde(default)]
    pub ensure_unique_codes: bool,

    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,
}

/// How presence updates are written into the circle document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Patch only the caller's member entry with the store's keyed merge.
    #[default]
    KeyedMerge,
    /// Re-read the member list and write the whole list back.
    FullRewrite,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::KeyedMerge => "keyed_merge",
            WriteMode::FullRewrite => "full_rewrite",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresenceConfig {
    #[serde(default)]
    pub write_mode: WriteMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// File the signed-in identity is persisted to
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}
fn default_time_interval_ms() -> u64 {
    5000
}
fn default_distance_interval_m() -> f64 {
    10.0
}
fn default_request_background() -> bool {
    true
}
fn default_display_name() -> String {
    "Anonymous".to_string()
}
fn default_max_code_attempts() -> u32 {
    100
}
fn default_storage_path() -> PathBuf {
    PathBuf::from(".circlelink/session.json")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            accuracy: LocationAccuracy::default(),
            time_interval_ms: default_time_interval_ms(),
            distance_interval_m: default_distance_interval_m(),
            request_background: default_request_background(),
        }
    }
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            default_display_name: default_display_name(),
            ensure_unique_codes: false,
            max_code_attempts: default_max_code_attempts(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
        }
    }
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with CIRCLELINK__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("CIRCLELINK").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds the config from embedded defaults and overrides only, without
    /// touching config files.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [logging]
            level = "info"
            format = "compact"

            [location]
            accuracy = "high"
            time_interval_ms = 5000
            distance_interval_m = 10.0
            request_background = true

            [membership]
            default_display_name = "Anonymous"
            ensure_unique_codes = false
            max_code_attempts = 100

            [presence]
            write_mode = "keyed_merge"

            [session]
            storage_path = ".circlelink/session.json"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.location.time_interval_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "location.time_interval_ms cannot be 0".to_string(),
            ));
        }

        if !self.location.distance_interval_m.is_finite() || self.location.distance_interval_m < 0.0
        {
            return Err(ConfigValidationError::InvalidValue(
                "location.distance_interval_m must be a non-negative number".to_string(),
            ));
        }

        if self.membership.max_code_attempts == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "membership.max_code_attempts cannot be 0".to_string(),
            ));
        }

        if self.membership.default_display_name.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "membership.default_display_name must not be blank".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load_with_defaults() {
        let config = Config::load_for_test(&[]).expect("Failed to load config");

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.location.accuracy, LocationAccuracy::High);
        assert_eq!(config.location.time_interval_ms, 5000);
        assert_eq!(config.location.distance_interval_m, 10.0);
        assert!(config.location.request_background);
        assert_eq!(config.membership.default_display_name, "Anonymous");
        assert!(!config.membership.ensure_unique_codes);
        assert_eq!(config.presence.write_mode, WriteMode::KeyedMerge);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_env_override() {
        let config = Config::load_for_test(&[
            ("logging.level", "debug"),
            ("location.accuracy", "balanced"),
            ("presence.write_mode", "full_rewrite"),
            ("membership.ensure_unique_codes", "true"),
        ])
        .expect("Failed to load config");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.location.accuracy, LocationAccuracy::Balanced);
        assert_eq!(config.presence.write_mode, WriteMode::FullRewrite);
        assert!(config.membership.ensure_unique_codes);
    }

    #[test]
    fn test_log_format_override() {
        let config = Config::load_for_test(&[("logging.format", "json")])
            .expect("Failed to load config");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(Config::load_for_test(&[("logging.format", "xml")]).is_err());
    }

    #[test]
    fn test_defaults_match_embedded_file() {
        let loaded = Config::load_for_test(&[]).expect("Failed to load config");
        let built = Config::default();

        assert_eq!(loaded.location.time_interval_ms, built.location.time_interval_ms);
        assert_eq!(loaded.membership.max_code_attempts, built.membership.max_code_attempts);
        assert_eq!(loaded.session.storage_path, built.session.storage_path);
        assert_eq!(loaded.logging.format, built.logging.format);
    }

    #[test]
    fn test_config_validation_zero_time_interval() {
        let config = Config::load_for_test(&[("location.time_interval_ms", "0")])
            .expect("Failed to load config");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("time_interval_ms"));
    }

    #[test]
    fn test_config_validation_zero_code_attempts() {
        let config = Config::load_for_test(&[("membership.max_code_attempts", "0")])
            .expect("Failed to load config");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_code_attempts"));
    }

    #[test]
    fn test_config_validation_blank_display_name() {
        let config = Config::load_for_test(&[("membership.default_display_name", "  ")])
            .expect("Failed to load config");
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingRequired(_))
        ));
    }
}
