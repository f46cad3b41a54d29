use std::time::Duration;

use thiserror::Error;

/// Result type alias for commissioner operations
pub type Result<T> = std::result::Result<T, ChipError>;

/// Errors that can occur while bootstrapping commissioners and running commands
#[derive(Error, Debug)]
pub enum ChipError {
    /// Identity name is neither well-known nor numeric
    #[error(
        "unknown commissioner name: {name}. Supported names are [alpha, beta, gamma, null-fabric-commissioner, 4, 5...]"
    )]
    UnknownIdentity {
        /// Name as given by the operator
        name: String,
    },

    /// Numeric identity falls inside the reserved fabric id range
    #[error("invalid identity {name}: fabric id {fabric_id} is reserved, numeric identities must be >= 4")]
    InvalidFabricId {
        /// Name as given by the operator
        name: String,
        /// Parsed fabric id
        fabric_id: u64,
    },

    /// Argument rejected before reaching the stack
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command did not signal completion before its deadline
    #[error("command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Stack or factory is not in a state that allows the operation
    #[error("internal error: {0}")]
    Internal(String),

    /// Persistent storage read/write failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Attestation trust store could not be loaded
    #[error("trust store error: {0}")]
    TrustStore(String),

    /// Operational credential generation failed
    #[error("credentials error: {0}")]
    Credentials(String),

    /// Commissioner setup failed
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Encoded object does not fit its bounded buffer
    #[error("{what} is {len} bytes, exceeds maximum of {max}")]
    BufferTooSmall {
        /// Object that was being encoded
        what: &'static str,
        /// Encoded length
        len: usize,
        /// Buffer bound
        max: usize,
    },

    /// Failure reported by a command body
    #[error("{0}")]
    Command(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization error
    #[error("toml error: {0}")]
    Toml(String),
}

/// Coarse classification used for exit codes and log rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operator misuse, fatal by contract
    Configuration,
    /// Bad argument that is not an identity problem
    InvalidArgument,
    /// Storage or trust store failure
    Io,
    /// Credential or commissioner setup failure
    Protocol,
    /// Deadline elapsed
    Timeout,
    /// Stack not ready or inconsistent
    Internal,
    /// Command body failure
    Command,
}

impl ChipError {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownIdentity { .. } | Self::InvalidFabricId { .. } => ErrorKind::Configuration,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Storage(_) | Self::TrustStore(_) | Self::Io(_) | Self::Json(_) | Self::Toml(_) => {
                ErrorKind::Io
            }
            Self::Credentials(_) | Self::Protocol(_) | Self::BufferTooSmall { .. } => {
                ErrorKind::Protocol
            }
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Command(_) => ErrorKind::Command,
        }
    }

    /// Returns true if the error must terminate the process
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration)
    }

    /// Returns true if the command exceeded its deadline
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Process exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Configuration | ErrorKind::InvalidArgument => 2,
            ErrorKind::Timeout => 124,
            _ => 1,
        }
    }
}

impl From<toml::de::Error> for ChipError {
    fn from(err: toml::de::Error) -> Self {
        Self::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for ChipError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Toml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_fatal() {
        let err = ChipError::UnknownIdentity {
            name: "delta".into(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("alpha, beta, gamma"));

        let err = ChipError::InvalidFabricId {
            name: "2".into(),
            fabric_id: 2,
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_timeout_classification() {
        let err = ChipError::Timeout(Duration::from_secs(10));
        assert!(err.is_timeout());
        assert!(!err.is_fatal());
        assert_eq!(err.exit_code(), 124);
        assert_eq!(err.to_string(), "command timed out after 10s");
    }

    #[test]
    fn test_protocol_errors_are_not_fatal() {
        let err = ChipError::BufferTooSmall {
            what: "NOC",
            len: 700,
            max: 600,
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.exit_code(), 1);
    }
}
