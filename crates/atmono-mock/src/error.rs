//! Error types for the simulated controller.

use thiserror::Error;

/// Errors that can occur when configuring or running the mock controller.
#[derive(Debug, Error)]
pub enum MockError {
    /// I/O error (binding the listener, reading a config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML configuration could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// The configuration parsed but is not usable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias for mock controller operations.
pub type MockResult<T> = Result<T, MockError>;
