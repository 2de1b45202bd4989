//! Error types for datatool
//!
//! Every backend surfaces its failures through [`Error`]. The transfer
//! engine logs and returns these unchanged, so callers always see the
//! variant produced by the backend that failed.

use thiserror::Error;

use crate::path::BackendFamily;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by path handles, sessions and transfers
#[derive(Debug, Error)]
pub enum Error {
    /// SSH session establishment or authentication failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Target of a stat/read/delete does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// No transfer strategy is registered for the backend pair
    #[error("Unsupported transfer combination: {from} -> {to}")]
    UnsupportedCombination {
        from: BackendFamily,
        to: BackendFamily,
    },

    /// Object storage or other network transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// SFTP protocol failure other than a missing file
    #[error("SFTP error: {0}")]
    Sftp(String),

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Text could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether this error means "the target does not exist".
    ///
    /// Local filesystem errors keep their `io::Error`, so a missing local
    /// file shows up as `Io` with kind `NotFound` rather than `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Exit code used by the CLI for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Connection(msg) if msg.to_lowercase().contains("auth") => 4,
            Error::Connection(_) | Error::Network(_) | Error::Sftp(_) => 3,
            Error::NotFound(_) => 5,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => 5,
                std::io::ErrorKind::AlreadyExists => 6,
                std::io::ErrorKind::PermissionDenied => 4,
                _ => 1,
            },
            Error::InvalidPath(_) => 2,
            Error::UnsupportedCombination { .. } => 7,
            Error::Config(_) | Error::Encoding(_) | Error::General(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("x".to_string()).is_not_found());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_not_found());
        assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)).is_not_found());
        assert!(!Error::Network("timeout".to_string()).is_not_found());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::NotFound("a".to_string()).exit_code(), 5);
        assert_eq!(Error::Connection("refused".to_string()).exit_code(), 3);
        assert_eq!(
            Error::Connection("authentication rejected".to_string()).exit_code(),
            4
        );
        assert_eq!(Error::InvalidPath("".to_string()).exit_code(), 2);
        assert_eq!(
            Error::UnsupportedCombination {
                from: BackendFamily::Local,
                to: BackendFamily::Cloud,
            }
            .exit_code(),
            7
        );
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::UnsupportedCombination {
            from: BackendFamily::Remote,
            to: BackendFamily::Cloud,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported transfer combination: remote -> cloud"
        );
    }
}
