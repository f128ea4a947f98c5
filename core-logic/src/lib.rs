//! # Core Logic - Shared Utilities for the Sweeper
//!
//! Chain-independent building blocks used by the chain crates: endpoint
//! selection, destination lists, retries, logging and run metrics.
//!
//! ## Modules
//!
//! - [`config`] - Shared configuration structures
//! - [`error`] - Typed error handling with thiserror
//! - [`metrics`] - Run metrics collection
//! - [`traits`] - Event sink and wallet loader traits
//! - [`utils`] - Utility modules (endpoints, destinations, retry, logging)

// Module declarations - internal modules marked pub(crate)
pub mod config;
pub mod error;
pub mod metrics;
pub mod traits;
pub(crate) mod utils;

// Selective exports - only public API types
pub use config::{ChainConfig, DestinationSource, EndpointConfig};
pub use error::{ConfigError, NetworkError, WalletError};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use traits::{EventSink, TxEvent, TxEventOutcome, WalletEvent, WalletLoader};

// Utils are pub(crate) - only export specific public utilities
pub use utils::{
    setup_logger, Destination, DestinationBook, RpcEndpoint, RpcHealthStatus, RpcManager,
    TracingSink, FAILURE_THRESHOLD, TX_RESULT_TARGET,
};

// Export retry utilities for testing
pub use utils::retry::{is_transient_error, with_retry, with_retry_if, RetryConfig};
