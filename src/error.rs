//! Error types for the hmdriver library

use thiserror::Error;

/// Result type alias for hmdriver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Error types for hmdriver operations
#[derive(Error, Debug)]
pub enum DriverError {
    /// No agent connection could be established within the connect window
    #[error("socket client init timeout after {0} seconds")]
    TransportTimeout(u64),

    /// A send or receive on the agent socket failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response with the request's correlation id arrived in time
    #[error("wait for {0} seconds")]
    ResponseTimeout(f64),

    /// The agent reported that no element matched
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The agent reported any other error
    #[error("Agent error: {0}")]
    Agent(String),

    /// A bridge invocation was built with malformed arguments
    #[error("Invalid bridge invocation: {0}")]
    BridgeInvocation(String),

    /// The bridge process could not be run
    #[error("Bridge error: {0}")]
    Bridge(String),

    /// The agent replied with something we could not interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Screenshot capture or transfer failed
    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    /// Bad input from the command line
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A handle was used after its session was stopped
    #[error("Session closed")]
    SessionClosed,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Image error
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
}

impl DriverError {
    /// Transport faults are the only class the request engine recovers from.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriverError::Transport(_))
    }

    /// Outcomes a convenience caller treats as "nothing there" rather than a failure.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            DriverError::ElementNotFound(_) | DriverError::ResponseTimeout(_)
        )
    }
}
