// crates/tracehub-config/src/lib.rs
// ============================================================================
// Module: TraceHub Config
// Description: The `TraceHubConfig` record: defaults, TOML file, env overrides.
// Purpose: Replace a process-wide settings singleton with an explicit record
//          constructed once at service startup and threaded through by
//          reference, per the design document's "no global settings" note.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration loads in three layers, each overriding the last: built-in
//! defaults, an optional TOML file, then environment variables. The
//! environment variable names match the original service's settings
//! (`DATABASE_URL`, `INTERNAL_API_KEY_SEED`, `WEBHOOK_URL`, `ENVIRONMENT`)
//! so operators migrating from it do not need to relearn the surface.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Resolved runtime configuration for the TraceHub engine.
///
/// # Invariants
/// - `internal_api_key_seed` is never empty; the default `"dev-seed"` is
///   intentionally weak and must be overridden outside development.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraceHubConfig {
    /// Application name, surfaced in logs only.
    pub app_name: String,
    /// Deployment environment; `"dev"` enables the `dev-key` admin
    /// shortcut in the auth resolver.
    pub environment: String,
    /// SQLite connection string or file path consumed by
    /// `tracehub-store-sqlite`.
    pub database_url: String,
    /// Shared secret compared against the inbound `x-api-key` header to
    /// recognize an admin caller.
    pub internal_api_key_seed: String,
    /// Outbound webhook target for case notifications. `None` disables
    /// webhook delivery entirely (cases are still created).
    pub webhook_url: Option<String>,
    /// Timeout for LLM judge HTTP calls, in seconds.
    pub judge_timeout_secs: u64,
    /// Timeout for webhook delivery HTTP calls, in seconds.
    pub webhook_timeout_secs: u64,
}

impl Default for TraceHubConfig {
    fn default() -> Self {
        Self {
            app_name: "TraceHub".to_string(),
            environment: "dev".to_string(),
            database_url: "tracehub.sqlite3".to_string(),
            internal_api_key_seed: "dev-seed".to_string(),
            webhook_url: None,
            judge_timeout_secs: 10,
            webhook_timeout_secs: 5,
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML file could not be parsed.
    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        /// Path that failed to parse.
        path: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// An environment variable held a value of the wrong type.
    #[error("environment variable {name} has an invalid value: {value}")]
    InvalidEnvValue {
        /// Variable name.
        name: &'static str,
        /// The value that failed to parse.
        value: String,
    },
    /// The fully resolved configuration failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl TraceHubConfig {
    /// Loads configuration from defaults, then `path` if it exists, then
    /// environment variables, validating the result.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed, if an environment variable has the wrong type, or if the
    /// final configuration fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_toml_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        tracing::info!(
            environment = %config.environment,
            path_used = path.exists(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from defaults and environment variables only,
    /// skipping any file lookup. Intended for tests and for environments
    /// that configure purely through the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] under the same conditions as [`Self::load`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ParseFile {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("DATABASE_URL") {
            self.database_url = value;
        }
        if let Ok(value) = env::var("INTERNAL_API_KEY_SEED") {
            self.internal_api_key_seed = value;
        }
        if let Ok(value) = env::var("WEBHOOK_URL") {
            self.webhook_url = Some(value);
        }
        if let Ok(value) = env::var("ENVIRONMENT") {
            self.environment = value;
        }
        if let Ok(value) = env::var("JUDGE_TIMEOUT_SECS") {
            self.judge_timeout_secs = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    name: "JUDGE_TIMEOUT_SECS",
                    value,
                })?;
        }
        if let Ok(value) = env::var("WEBHOOK_TIMEOUT_SECS") {
            self.webhook_timeout_secs = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    name: "WEBHOOK_TIMEOUT_SECS",
                    value,
                })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.internal_api_key_seed.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "internal_api_key_seed must not be empty".to_string(),
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "database_url must not be empty".to_string(),
            ));
        }
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "webhook_url must be an http(s) URL, got {url}"
                )));
            }
        }
        Ok(())
    }

    /// Whether `key` should be treated as an admin credential: either it
    /// matches the configured seed, or it is the well-known `dev-key`
    /// shortcut in a `dev` environment.
    #[must_use]
    pub fn is_admin_key(&self, key: &str) -> bool {
        key == self.internal_api_key_seed || (self.environment == "dev" && key == "dev-key")
    }
}

#[cfg(test)]
mod tests {
    use super::TraceHubConfig;

    #[test]
    fn defaults_are_valid() {
        let config = TraceHubConfig::default();
        assert_eq!(config.environment, "dev");
        assert!(config.is_admin_key("dev-key"));
    }

    #[test]
    fn dev_key_shortcut_requires_dev_environment() {
        let mut config = TraceHubConfig::default();
        config.environment = "production".to_string();
        assert!(!config.is_admin_key("dev-key"));
        assert!(config.is_admin_key(&config.internal_api_key_seed.clone()));
    }

    #[test]
    fn rejects_non_http_webhook_url() {
        let mut config = TraceHubConfig::default();
        config.webhook_url = Some("ftp://example.com".to_string());
        assert!(config.validate().is_err());
    }
}
