//! # Core Error Types
//!
//! Typed errors for configuration, destination lists and endpoint access.
//! All errors implement `std::error::Error` and `std::fmt::Display`.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid RPC URL format: '{url}'")]
    InvalidRpcUrl { url: String },

    #[error("No RPC endpoints configured")]
    NoEndpoints,

    #[error("Missing required configuration field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration rejected:\n  - {}", .0.join("\n  - "))]
    Rejected(Vec<String>),
}

/// Wallet roster and destination list errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("No destination address lists available")]
    NoDestinations,

    #[error("Not enough addresses in destination lists ({found}), {required} required")]
    NotEnoughDestinations { found: String, required: usize },

    #[error("Could not resolve address for key '{name}': {reason}")]
    KeyLookupFailed { name: String, reason: String },
}

/// Network and RPC-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("RPC request timeout after {timeout_ms}ms to {endpoint}")]
    Timeout { timeout_ms: u64, endpoint: String },

    #[error("Rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("Connection refused to {endpoint}: {reason}")]
    ConnectionRefused { endpoint: String, reason: String },

    #[error("HTTP error {status_code} from {endpoint}")]
    HttpError { status_code: u16, endpoint: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_lists_every_problem() {
        let err = ConfigError::Rejected(vec![
            "gas_price must be in (0, 1]".to_string(),
            "no endpoints".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("gas_price must be in (0, 1]"));
        assert!(msg.contains("no endpoints"));
    }
}
