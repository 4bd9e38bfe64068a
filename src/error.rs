//! Error types for the dashboard core

use thiserror::Error;

/// Errors that can occur across the dashboard
#[derive(Error, Debug)]
pub enum DashError {
    /// Session expired or credential rejected; prompt for re-authentication
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Application-level rejection from the broker, message verbatim
    #[error("Broker error: {0}")]
    Broker(String),

    /// Local validation failure, never sent to the network
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Local quantity validation failure, never sent to the network
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// The broker has no counterpart for the requested capability
    #[error("Unsupported by this broker: {0}")]
    Unsupported(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Malformed broker payload
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DashError {
    /// Whether a single bounded retry is reasonable (close-resolver only)
    pub fn is_transient(&self) -> bool {
        matches!(self, DashError::Network(_) | DashError::Broker(_))
    }
}

/// Result type alias for the dashboard
pub type Result<T> = std::result::Result<T, DashError>;
