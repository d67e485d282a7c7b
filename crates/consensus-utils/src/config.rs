//! Configuration management utilities
//!
//! Settings are read from the process environment after an optional `.env`
//! file has been merged in with [`load_dotenv`]. Variables already present in
//! the environment take precedence over the file.

use crate::logging::LogFormat;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("{0} environment variable not set")]
    Missing(String),

    /// A variable is set but cannot be parsed
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Merge a `.env` file from the current directory (or a parent) into the environment
///
/// Returns the path that was loaded, or `None` when no file was found.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Read a variable, treating blank values as unset
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a variable that must be present
pub fn require_env(key: &str) -> Result<String, ConfigError> {
    env_var(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

/// Parse a variable into `T`, falling back to `default` when unset
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env_var(key) {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Parse a boolean flag (`1/0`, `true/false`, `yes/no`, `on/off`)
pub fn env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env_var(key) {
        None => Ok(default),
        Some(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                value,
                reason: "expected a boolean".to_string(),
            }),
        },
    }
}

/// Read a comma separated list, dropping empty items
pub fn env_list(key: &str) -> Option<Vec<String>> {
    env_var(key).map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    })
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// Directory for run reports and the local database
    pub data_dir: PathBuf,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "futures-consensus".to_string(),
            environment: "development".to_string(),
            data_dir: PathBuf::from("data"),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Build from `FC_ENV`, `FC_DATA_DIR` and `FC_LOG_FORMAT`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            app_name: defaults.app_name,
            environment: env_var("FC_ENV").unwrap_or(defaults.environment),
            data_dir: env_var("FC_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            log_format: env_parse("FC_LOG_FORMAT", defaults.log_format)?,
        })
    }

    /// Whether this is a production deployment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
            || self.environment.eq_ignore_ascii_case("prod")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_blank_is_unset() {
        unsafe {
            std::env::set_var("FC_TEST_BLANK", "   ");
        }
        assert_eq!(env_var("FC_TEST_BLANK"), None);
        assert!(matches!(
            require_env("FC_TEST_BLANK"),
            Err(ConfigError::Missing(_))
        ));
        unsafe {
            std::env::remove_var("FC_TEST_BLANK");
        }
    }

    #[test]
    fn test_env_parse() {
        unsafe {
            std::env::set_var("FC_TEST_NUMBER", "42");
            std::env::set_var("FC_TEST_BAD_NUMBER", "forty");
        }
        assert_eq!(env_parse::<u32>("FC_TEST_NUMBER", 1), Ok(42));
        assert_eq!(env_parse::<u32>("FC_TEST_UNSET_NUMBER", 7), Ok(7));
        assert!(matches!(
            env_parse::<u32>("FC_TEST_BAD_NUMBER", 1),
            Err(ConfigError::Invalid { .. })
        ));
        unsafe {
            std::env::remove_var("FC_TEST_NUMBER");
            std::env::remove_var("FC_TEST_BAD_NUMBER");
        }
    }

    #[test]
    fn test_env_bool() {
        unsafe {
            std::env::set_var("FC_TEST_FLAG_ON", "Yes");
            std::env::set_var("FC_TEST_FLAG_OFF", "0");
            std::env::set_var("FC_TEST_FLAG_BAD", "maybe");
        }
        assert_eq!(env_bool("FC_TEST_FLAG_ON", false), Ok(true));
        assert_eq!(env_bool("FC_TEST_FLAG_OFF", true), Ok(false));
        assert_eq!(env_bool("FC_TEST_FLAG_UNSET", true), Ok(true));
        assert!(env_bool("FC_TEST_FLAG_BAD", false).is_err());
        unsafe {
            std::env::remove_var("FC_TEST_FLAG_ON");
            std::env::remove_var("FC_TEST_FLAG_OFF");
            std::env::remove_var("FC_TEST_FLAG_BAD");
        }
    }

    #[test]
    fn test_env_list() {
        unsafe {
            std::env::set_var("FC_TEST_LIST", "deepseek, gemini,,groq ");
        }
        assert_eq!(
            env_list("FC_TEST_LIST"),
            Some(vec![
                "deepseek".to_string(),
                "gemini".to_string(),
                "groq".to_string()
            ])
        );
        unsafe {
            std::env::remove_var("FC_TEST_LIST");
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.app_name, "futures-consensus");
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(!config.is_production());
    }
}
