//! Runtime settings loaded from environment variables.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "CORS_DB_MAX_CONNECTIONS";
pub const LOG_FORMAT_VAR: &str = "CORS_LOG_FORMAT";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://cors-management.db?mode=rwc";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format of the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected text or json, got {}", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsSettings {
    /// sqlx connection string
    pub database_url: String,
    pub max_connections: u32,
    pub log_format: LogFormat,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            log_format: LogFormat::default(),
        }
    }
}

impl CorsSettings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup. Unset or blank keys use defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut settings = Self::default();

        if let Some(url) = get(DATABASE_URL_VAR) {
            settings.database_url = url.trim().to_string();
        }

        if let Some(value) = get(MAX_CONNECTIONS_VAR) {
            settings.max_connections = match value.trim().parse::<u32>() {
                Ok(0) => {
                    return Err(SettingsError::InvalidValue {
                        key: MAX_CONNECTIONS_VAR,
                        value,
                        reason: "must be at least 1".to_string(),
                    });
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(SettingsError::InvalidValue {
                        key: MAX_CONNECTIONS_VAR,
                        value,
                        reason: e.to_string(),
                    });
                }
            };
        }

        if let Some(value) = get(LOG_FORMAT_VAR) {
            settings.log_format = match value.parse() {
                Ok(format) => format,
                Err(reason) => {
                    return Err(SettingsError::InvalidValue {
                        key: LOG_FORMAT_VAR,
                        value,
                        reason,
                    });
                }
            };
        }

        Ok(settings)
    }
}
