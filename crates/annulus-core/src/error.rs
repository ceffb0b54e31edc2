//! Error types for Annulus

use thiserror::Error;

/// Top-level error type for Annulus
#[derive(Debug, Error)]
pub enum AnnulusError {
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to addresses and the identifier space
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Invalid address length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Address space width must be between 1 and {max} bits, got {bits}")]
    InvalidWidth { bits: u32, max: u32 },

    #[error("Address {0} lies outside the configured address space")]
    OutOfSpace(String),

    #[error("Invalid address format: {0}")]
    InvalidFormat(String),
}

/// Errors related to packet headers and protocol invariants
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Truncated header: need {needed} bytes, got {actual}")]
    TruncatedHeader { needed: usize, actual: usize },

    #[error("Hop count {hops} exceeds ttl {ttl}")]
    HopsExceedTtl { hops: u16, ttl: u16 },

    #[error("Destination {0} lies outside the address space")]
    DestinationOutOfSpace(String),

    #[error("No router for address class {0}")]
    UnroutableClass(String),

    #[error("Next hop is the link the packet arrived on: {0}")]
    SelfReferentialForward(String),
}

/// Errors raised by a link when sending
///
/// The split matters to the router: transient failures drop the packet,
/// permanent failures close the link and force a re-route.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// Congestion or a full buffer; the link may recover
    #[error("Transient send failure: {0}")]
    Transient(String),

    /// The link is dead and must be closed
    #[error("Permanent send failure: {0}")]
    Permanent(String),
}

impl LinkError {
    /// Whether the link may recover from this failure
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors related to configuration validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Result type alias for Annulus operations
pub type AnnulusResult<T> = Result<T, AnnulusError>;
