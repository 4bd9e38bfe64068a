//! Configuration loading
//!
//! Layered: TOML file, then `DASH_`-prefixed environment variables
//! (`DASH_FYERS__ACCESS_TOKEN=...`). Credentials are opaque to the core;
//! acquiring or refreshing them is an external concern.

use crate::error::Result;
use serde::Deserialize;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fyers: Option<FyersConfig>,
    #[serde(default)]
    pub definedge: Option<DefinedgeConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Fyers API credentials and endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct FyersConfig {
    pub client_id: String,
    pub access_token: String,
    #[serde(default = "default_fyers_url")]
    pub base_url: String,
}

/// Definedge Integrate session keys and endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DefinedgeConfig {
    pub api_session_key: String,
    pub api_secret: String,
    #[serde(default = "default_definedge_url")]
    pub base_url: String,
}

/// Tunables for the quote/close engine
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How many calendar days to scan back for a previous trading close
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Per-call HTTP timeout
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Pause before the single same-day retry in the close resolver
    #[serde(default = "default_retry_delay_ms")]
    pub history_retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            http_timeout_secs: default_http_timeout_secs(),
            history_retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_fyers_url() -> String {
    "https://api-t1.fyers.in/api/v3".to_string()
}

fn default_definedge_url() -> String {
    "https://integrate.definedgesecurities.com/dart/v1".to_string()
}

fn default_lookback_days() -> u32 {
    9
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Config {
    /// Load configuration from a TOML file plus environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let path = shellexpand::tilde(path).to_string();
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("DASH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
