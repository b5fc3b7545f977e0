// src/config.rs

use std::{env, fmt, str::FromStr};

use dotenvy::dotenv;
use url::Url;

/// Fraction of the maximum score (in percent) needed to pass a quiz.
pub const PASSING_PERCENTAGE: f64 = 60.0;

/// Upper bound for questions requested from the generator in one call.
pub const MAX_GENERATED_QUESTIONS: usize = 50;

pub const DEFAULT_GENERATED_QUESTIONS: usize = 10;

/// Maximum accepted size of an uploaded document, in bytes.
pub const MAX_DOCUMENT_BYTES: usize = 200_000;

/// Error raised when the environment does not describe a usable configuration.
#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "{} has an invalid value: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub server_port: u16,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub ai: AiConfig,
    /// Seconds between two runs of the scheduled publishing job.
    pub publisher_interval_secs: u64,
    /// Seconds after a quiz deadline during which answers are still accepted.
    pub submission_grace_secs: i64,
}

/// Settings of the remote, OpenAI-compatible completion endpoint.
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// When absent, quiz generation and insights run locally.
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let api_base = optional("AI_API_BASE")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        if Url::parse(&api_base).is_err() {
            return Err(ConfigError::Invalid {
                key: "AI_API_BASE",
                value: api_base,
            });
        }

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration: parsed("JWT_EXPIRATION", 86_400)?,
            rust_log,
            server_port: parsed("SERVER_PORT", 3000)?,
            admin_username: optional("ADMIN_USERNAME"),
            admin_password: optional("ADMIN_PASSWORD"),
            ai: AiConfig {
                api_key: optional("AI_API_KEY"),
                api_base: api_base.trim_end_matches('/').to_string(),
                model: optional("AI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            },
            publisher_interval_secs: parsed("PUBLISHER_INTERVAL_SECS", 30)?,
            submission_grace_secs: parsed("SUBMISSION_GRACE_SECS", 30)?,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

/// Reads a variable, treating empty values as unset.
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::Missing("JWT_SECRET").to_string(),
            "JWT_SECRET must be set"
        );
        let err = ConfigError::Invalid {
            key: "SERVER_PORT",
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "SERVER_PORT has an invalid value: 'abc'");
    }

    #[test]
    fn test_parsed_uses_default_when_unset() {
        let value: u64 = parsed("INTELLIQUIZ_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
