//! Routing error types
//!
//! Only router construction can fail. Once a router is running, faults
//! are reported through [`DropReason`](crate::DropReason) on the
//! returned outcome instead.

use annulus_core::{AddressClass, AddressError, ConfigError};
use thiserror::Error;

/// Errors raised while building a router
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The local address does not fit the configured space
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    /// The local address has the wrong class for this router
    #[error("Local address {local} is not a {expected} address")]
    ClassMismatch {
        local: String,
        expected: AddressClass,
    },
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
