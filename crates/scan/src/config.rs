//! Pipeline configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CARTWHEEL_STORE_URL` - Base URL of the remote store's REST surface
//! - `CARTWHEEL_STORE_API_KEY` - Scoped API key for the store
//! - `CARTWHEEL_REALTIME_URL` - Websocket URL of the change feed
//!
//! ## Optional
//! - `CARTWHEEL_SCAN_COOLDOWN_MS` - Debounce cooldown window (default: 2000)
//! - `CARTWHEEL_SCAN_ACCEPT_THRESHOLD` - Decode error acceptance threshold
//!   (default: 0.22)
//! - `CARTWHEEL_DECODE_WORKERS` - Decode worker count (default: 0 = hardware
//!   concurrency)

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::debounce::DebounceConfig;
use crate::decoder::{CameraProfile, DecoderOptions};

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Remote store endpoints and credentials.
    pub store: StoreConfig,
    /// Debouncer tuning.
    pub debounce: DebounceConfig,
    /// Decoder stream tuning.
    pub decoder: DecoderConfig,
}

/// Remote store configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct StoreConfig {
    /// Base URL of the REST surface (e.g. `https://store.example.com/rest/v1`)
    pub rest_url: Url,
    /// Websocket URL of the change feed (e.g. `wss://store.example.com/feed`)
    pub realtime_url: Url,
    /// Scoped API key, sent on every request
    pub api_key: SecretString,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("rest_url", &self.rest_url.as_str())
            .field("realtime_url", &self.realtime_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Decoder stream configuration.
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// Camera constraint profile.
    pub profile: CameraProfile,
    /// Worker-pool and queue tuning.
    pub options: DecoderOptions,
}

impl ScanConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// or if the API key fails placeholder validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let store = StoreConfig::from_env()?;

        let cooldown_ms = get_env_or_default("CARTWHEEL_SCAN_COOLDOWN_MS", "2000")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CARTWHEEL_SCAN_COOLDOWN_MS".to_string(), e.to_string())
            })?;
        let accept_threshold = get_env_or_default("CARTWHEEL_SCAN_ACCEPT_THRESHOLD", "0.22")
            .parse::<f32>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar(
                    "CARTWHEEL_SCAN_ACCEPT_THRESHOLD".to_string(),
                    e.to_string(),
                )
            })?;
        let workers = get_env_or_default("CARTWHEEL_DECODE_WORKERS", "0")
            .parse::<usize>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CARTWHEEL_DECODE_WORKERS".to_string(), e.to_string())
            })?;

        let debounce = DebounceConfig {
            accept_threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        };

        let decoder = DecoderConfig {
            profile: CameraProfile::default(),
            options: DecoderOptions {
                workers,
                ..DecoderOptions::default()
            },
        };

        Ok(Self {
            store,
            debounce,
            decoder,
        })
    }
}

impl StoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            rest_url: get_url("CARTWHEEL_STORE_URL")?,
            realtime_url: get_url("CARTWHEEL_REALTIME_URL")?,
            api_key: get_validated_secret("CARTWHEEL_STORE_API_KEY")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a required environment variable parsed as a URL.
fn get_url(key: &str) -> Result<Url, ConfigError> {
    let raw = get_required_env(key)?;
    Url::parse(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a secret is not an obvious placeholder.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
