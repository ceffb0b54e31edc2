//! Error types for logging setup

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid filter directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("cannot open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("global subscriber already set: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

pub type LoggingResult<T> = Result<T, LoggingError>;
