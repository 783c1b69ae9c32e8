//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching console.toml structure.
//! Firebase credentials and the super-admin address can be overridden from
//! the environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::firebase::FirebaseOptions;
use crate::domain::SUPER_ADMIN_EMAIL;

/// Main configuration structure matching console.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub firebase: FirebaseSection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub console: ConsoleSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Which provider family backs the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// File-backed identity and document store under `data_dir`
    #[default]
    Local,
    /// Firebase Auth + Firestore over REST
    Firebase,
}

/// Provider selection section
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    #[serde(default)]
    pub backend: Backend,
    /// Data directory of the local backend (`~` is expanded)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl ProviderSection {
    /// Get the data directory with environment variable override
    /// Checks NEXUS_DATA_DIR env var first, falls back to config value
    pub fn get_data_dir(&self) -> PathBuf {
        let raw = std::env::var("NEXUS_DATA_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.data_dir.clone());
        PathBuf::from(shellexpand::tilde(&raw).into_owned())
    }
}

fn default_data_dir() -> String {
    "~/.nexus-terminal".to_string()
}

/// Firebase project credentials
#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseSection {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub auth_domain: String,
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub storage_bucket: String,
    #[serde(default)]
    pub messaging_sender_id: String,
    #[serde(default)]
    pub app_id: String,
    /// Interval between reads of watched collections
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FirebaseSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            auth_domain: String::new(),
            database_url: String::new(),
            project_id: String::new(),
            storage_bucket: String::new(),
            messaging_sender_id: String::new(),
            app_id: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    30
}

/// Presence of one credential field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldStatus {
    pub field: &'static str,
    pub env_var: &'static str,
    pub present: bool,
    /// Needed by the REST clients
    pub required: bool,
}

impl FirebaseSection {
    fn fields(&self) -> [(&'static str, &'static str, &String, bool); 7] {
        [
            ("api_key", "FIREBASE_API_KEY", &self.api_key, true),
            ("auth_domain", "FIREBASE_AUTH_DOMAIN", &self.auth_domain, false),
            ("database_url", "FIREBASE_DATABASE_URL", &self.database_url, false),
            ("project_id", "FIREBASE_PROJECT_ID", &self.project_id, true),
            ("storage_bucket", "FIREBASE_STORAGE_BUCKET", &self.storage_bucket, false),
            ("messaging_sender_id", "FIREBASE_MESSAGING_SENDER_ID", &self.messaging_sender_id, false),
            ("app_id", "FIREBASE_APP_ID", &self.app_id, false),
        ]
    }

    /// Apply environment overrides; non-empty variables win
    pub fn resolved(&self) -> Self {
        self.resolved_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`
    pub fn resolved_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |current: &String, key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| current.clone())
        };

        Self {
            api_key: pick(&self.api_key, "FIREBASE_API_KEY"),
            auth_domain: pick(&self.auth_domain, "FIREBASE_AUTH_DOMAIN"),
            database_url: pick(&self.database_url, "FIREBASE_DATABASE_URL"),
            project_id: pick(&self.project_id, "FIREBASE_PROJECT_ID"),
            storage_bucket: pick(&self.storage_bucket, "FIREBASE_STORAGE_BUCKET"),
            messaging_sender_id: pick(&self.messaging_sender_id, "FIREBASE_MESSAGING_SENDER_ID"),
            app_id: pick(&self.app_id, "FIREBASE_APP_ID"),
            poll_interval_ms: self.poll_interval_ms,
            timeout_secs: self.timeout_secs,
        }
    }

    /// Per-field presence report
    pub fn diagnostics(&self) -> Vec<FieldStatus> {
        self.fields()
            .into_iter()
            .map(|(field, env_var, value, required)| FieldStatus {
                field,
                env_var,
                present: !value.trim().is_empty(),
                required,
            })
            .collect()
    }

    /// Names of missing fields the REST clients cannot work without
    pub fn missing_required(&self) -> Vec<&'static str> {
        self.diagnostics()
            .into_iter()
            .filter(|s| s.required && !s.present)
            .map(|s| s.field)
            .collect()
    }

    pub fn options(&self) -> FirebaseOptions {
        let mut options = FirebaseOptions::new(self.api_key.trim(), self.project_id.trim());
        options.timeout = Duration::from_secs(self.timeout_secs);
        options.poll_interval = Duration::from_millis(self.poll_interval_ms);
        options
    }
}

/// Access policy section
#[derive(Debug, Clone, Deserialize)]
pub struct AccessSection {
    /// The only address allowed to hold a console session
    #[serde(default = "default_super_admin_email")]
    pub super_admin_email: String,
}

impl Default for AccessSection {
    fn default() -> Self {
        Self {
            super_admin_email: default_super_admin_email(),
        }
    }
}

impl AccessSection {
    /// Get the super-admin address with environment variable override
    /// Checks NEXUS_SUPER_ADMIN_EMAIL env var first, falls back to config value
    pub fn get_super_admin_email(&self) -> String {
        self.get_super_admin_email_with(|key| std::env::var(key).ok())
    }

    /// Same as [`get_super_admin_email`](Self::get_super_admin_email), reading overrides from `lookup`.
    /// A blank override is ignored.
    pub fn get_super_admin_email_with(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        lookup("NEXUS_SUPER_ADMIN_EMAIL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.super_admin_email.clone())
    }
}

fn default_super_admin_email() -> String {
    SUPER_ADMIN_EMAIL.to_string()
}

/// Console behaviour section
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleSection {
    /// How long the CLI waits for the first access decision
    #[serde(default = "default_auth_wait_secs")]
    pub auth_wait_secs: u64,
}

impl Default for ConsoleSection {
    fn default() -> Self {
        Self {
            auth_wait_secs: default_auth_wait_secs(),
        }
    }
}

fn default_auth_wait_secs() -> u64 {
    15
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters, environment overrides applied
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with(|key| std::env::var(key).ok())
    }

    /// Validate with overrides read from `lookup`
    pub fn validate_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.provider.backend == Backend::Firebase {
            let missing = self.firebase.resolved_with(&lookup).missing_required();
            if !missing.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "firebase backend requires {}",
                    missing.join(", ")
                )));
            }
        }

        if self.provider.backend == Backend::Local && self.provider.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "data_dir cannot be empty".to_string(),
            ));
        }

        if self.firebase.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.firebase.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        let super_admin_email = self.access.get_super_admin_email_with(&lookup);
        if !super_admin_email.contains('@') {
            return Err(ConfigError::ValidationError(format!(
                "super_admin_email must be an email address, got {:?}",
                super_admin_email
            )));
        }

        if self.console.auth_wait_secs == 0 {
            return Err(ConfigError::ValidationError(
                "auth_wait_secs must be > 0".to_string(),
            ));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown log level {:?}",
                self.logging.level
            )));
        }

        Ok(())
    }
}
