use crate::error::{Result, TranslatorError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SOURCE_LANGUAGE: &str = "Japanese";
pub const DEFAULT_TARGET_LANGUAGE: &str = "Simplified Chinese";

/// How the API key is presented to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiType {
    /// `Authorization: Bearer <key>` header
    #[default]
    OpenAi,
    /// `?key=<key>` query parameter, for Google's OpenAI-compatible endpoint
    Google,
}

impl FromStr for ApiType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ApiType::OpenAi),
            "google" => Ok(ApiType::Google),
            other => Err(format!("unknown API type '{}'", other)),
        }
    }
}

/// Immutable run configuration, built once at startup and threaded through
/// the pipeline. Lower layers never read the environment themselves.
#[derive(Debug, Clone)]
pub struct Config {
    // Chat completion endpoint
    pub api_url: String,
    pub api_key: String,
    pub api_type: ApiType,
    pub model: String,
    pub request_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    /// `Some(false)` asks hybrid reasoning models to skip their thinking
    /// trace; `None` leaves the flag out of the request.
    pub enable_thinking: Option<bool>,

    // Prompt
    pub source_language: String,
    pub target_language: String,
    pub prompt_template_file: Option<PathBuf>,

    // Batching and checkpoints
    pub batch_size: usize,
    pub save_interval: usize,
    pub max_attempts_per_key: u32,

    // Transient API failures
    pub retry_max_attempts: u32,
    pub retry_delay: Duration,
    pub request_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source (environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            api_url: required(&lookup, "TRANSLATOR_API_URL")?,
            api_key: required(&lookup, "TRANSLATOR_API_KEY")?,
            api_type: parse_or(&lookup, "TRANSLATOR_API_TYPE", ApiType::OpenAi)?,
            model: lookup("TRANSLATOR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 60)?),
            max_tokens: parse_or(&lookup, "MAX_TOKENS", 4000)?,
            temperature: parse_or(&lookup, "TEMPERATURE", 0.3)?,
            enable_thinking: lookup("ENABLE_THINKING")
                .map(|v| parse_bool("ENABLE_THINKING", &v))
                .transpose()?,

            source_language: lookup("SOURCE_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_SOURCE_LANGUAGE.to_string()),
            target_language: lookup("TARGET_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_string()),
            prompt_template_file: lookup("PROMPT_TEMPLATE_FILE").map(PathBuf::from),

            batch_size: parse_or(&lookup, "BATCH_SIZE", 50)?,
            save_interval: parse_or(&lookup, "SAVE_INTERVAL", 100)?,
            max_attempts_per_key: parse_or(&lookup, "MAX_ATTEMPTS_PER_KEY", 3)?,

            retry_max_attempts: parse_or(&lookup, "RETRY_MAX_ATTEMPTS", 3)?,
            retry_delay: Duration::from_secs(parse_or(&lookup, "RETRY_DELAY_SECS", 5)?),
            request_interval: Duration::from_millis(parse_or(&lookup, "REQUEST_INTERVAL_MS", 1000)?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the run meaningless or non-terminating.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TranslatorError::Config(
                "batch_size must be a positive integer".to_string(),
            ));
        }
        if self.save_interval == 0 {
            return Err(TranslatorError::Config(
                "save_interval must be a positive integer".to_string(),
            ));
        }
        if self.max_attempts_per_key == 0 {
            return Err(TranslatorError::Config(
                "max_attempts_per_key must be at least 1".to_string(),
            ));
        }
        if self.retry_max_attempts == 0 {
            return Err(TranslatorError::Config(
                "retry_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(TranslatorError::Config("API key is empty".to_string()));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(TranslatorError::Config(format!(
                "API URL must be http(s), got '{}'",
                self.api_url
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TranslatorError::Config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| TranslatorError::Config(format!("{} not set", name)))
}

/// Unset falls back to the default; set but unparsable is an error.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            TranslatorError::Config(format!("{} has an invalid value '{}'", name, raw))
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TranslatorError::Config(format!(
            "{} must be a boolean, got '{}'",
            name, raw
        ))),
    }
}
