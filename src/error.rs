//! Error types and handling for tally

/// Result type alias for tally operations
pub type Result<T> = std::result::Result<T, TallyError>;

/// Error types for the connector memory and scoreboard core
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    /// I/O related errors (file operations, mmap, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Memory allocation failures (arena backing buffer, overflow blocks, map growth)
    #[error("Memory error: {message}")]
    Memory { message: String },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Insufficient space for an allocation or payload
    #[error("Insufficient space: requested {requested}, available {available}")]
    InsufficientSpace { requested: usize, available: usize },

    /// Scoreboard header failed sanity checks; recovery is an explicit reset
    #[error("Scoreboard corrupted: {message}")]
    Corrupted { message: String },

    /// Malformed remote-dispatch message
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Slot operation issued against a service with no attached scoreboard
    #[error("Scoreboard not attached")]
    Detached,
}

impl TallyError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an insufficient space error
    pub fn insufficient_space(requested: usize, available: usize) -> Self {
        Self::InsufficientSpace {
            requested,
            available,
        }
    }

    /// Create a corruption error
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for TallyError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<std::collections::TryReserveError> for TallyError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::memory(format!("Container growth failed: {}", err))
    }
}
