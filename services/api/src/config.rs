//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use axum::http::HeaderValue;
use photo_poet_core::PollPolicy;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Upper bound for every polling duration setting: one day.
pub const MAX_POLL_SECS: u64 = 24 * 60 * 60;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Connection settings for the Gemini generation service.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// Missing keys are allowed at startup; requests then fail as misconfiguration.
    pub api_key: Option<String>,
    pub base_url: String,
    pub api_version: String,
    pub text_model: String,
    pub image_model: String,
    pub speech_model: String,
    pub video_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: "v1beta".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            video_model: "veo-2.0-generate-001".to_string(),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub gemini: GeminiConfig,
    pub poll_policy: PollPolicy,
    /// Front-end origin allowed by CORS. `None` allows any origin.
    pub allowed_origin: Option<HeaderValue>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDRESS", e.to_string()))?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            invalid(
                "RUST_LOG",
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin = var("ALLOWED_ORIGIN")
            .map(|origin| {
                HeaderValue::from_str(origin.trim())
                    .map_err(|e| invalid("ALLOWED_ORIGIN", e.to_string()))
            })
            .transpose()?;

        // --- Gemini Settings ---
        let defaults = GeminiConfig::default();
        let gemini = GeminiConfig {
            api_key: var("GEMINI_API_KEY"),
            base_url: var("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_version: var("GEMINI_API_VERSION").unwrap_or(defaults.api_version),
            text_model: var("TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: var("IMAGE_MODEL").unwrap_or(defaults.image_model),
            speech_model: var("SPEECH_MODEL").unwrap_or(defaults.speech_model),
            video_model: var("VIDEO_MODEL").unwrap_or(defaults.video_model),
        };

        // --- Video Polling Settings ---
        let policy = PollPolicy::default();
        let poll_policy = PollPolicy {
            interval: seconds(&var, "POLL_INTERVAL_SECS", policy.interval)?,
            backoff_factor: match var("POLL_BACKOFF_FACTOR") {
                Some(raw) => match raw.trim().parse::<f64>() {
                    Ok(factor) if factor.is_finite() && factor >= 1.0 => factor,
                    _ => {
                        return Err(invalid(
                            "POLL_BACKOFF_FACTOR",
                            format!("'{raw}' must be a number of at least 1.0"),
                        ))
                    }
                },
                None => policy.backoff_factor,
            },
            max_interval: seconds(&var, "POLL_MAX_INTERVAL_SECS", policy.max_interval)?,
            max_wait: seconds(&var, "POLL_MAX_WAIT_SECS", policy.max_wait)?,
        };

        Ok(Self {
            bind_address,
            log_level,
            gemini,
            poll_policy,
            allowed_origin,
        })
    }
}

fn invalid(key: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue(key.to_string(), reason)
}

fn seconds<F>(var: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if (1..=MAX_POLL_SECS).contains(&secs) => Ok(Duration::from_secs(secs)),
            _ => Err(invalid(
                key,
                format!("'{raw}' must be between 1 and {MAX_POLL_SECS} seconds"),
            )),
        },
        None => Ok(default),
    }
}
